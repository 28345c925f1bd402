//! RPC method handlers.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use pingmux_core::{JobId, StartRequest};
use pingmux_engine::JobLauncher;

use crate::client::{ClientId, ClientRegistry};
use crate::rpc::{self, RpcEvent, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub launcher: Arc<JobLauncher>,
    pub clients: Arc<ClientRegistry>,
    /// Owns the per-subscription forwarding tasks.
    pub watchers: TaskTracker,
}

impl HandlerState {
    pub fn new(launcher: Arc<JobLauncher>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            launcher,
            clients,
            watchers: TaskTracker::new(),
        }
    }
}

/// Dispatch an RPC method to the appropriate handler.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "job.start" => job_start(state, params, id).await,
        "job.stop" => job_stop(state, params, id).await,
        "job.list" => job_list(state, id),
        "job.info" => job_info(state, params, id).await,
        "job.watchResults" => watch_results(state, client_id, params, id).await,
        "job.watchStatistics" => watch_statistics(state, client_id, params, id).await,

        "system.ping" | "health" => health(state, id),
        "system.getInfo" => system_get_info(id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

async fn job_start(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let request: StartRequest = match serde_json::from_value(params.clone()) {
        Ok(request) => request,
        Err(error) => return RpcResponse::invalid_params(id, error.to_string()),
    };

    // A refused request answers with the zero id, never an error.
    let job_id = state.launcher.submit(request).await;
    RpcResponse::success(id, serde_json::json!({ "jobId": job_id }))
}

async fn job_stop(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let job_id = match rpc::require_job_id(params) {
        Ok(job_id) => job_id,
        Err(error) => return RpcResponse::invalid_params(id, error),
    };
    let stopped = state.launcher.stop(job_id).await;
    RpcResponse::success(id, serde_json::json!({ "jobId": job_id, "stopped": stopped }))
}

fn job_list(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let jobs = state.launcher.list();
    match serde_json::to_value(jobs) {
        Ok(jobs) => RpcResponse::success(id, serde_json::json!({ "jobs": jobs })),
        Err(error) => RpcResponse::internal_error(id, error.to_string()),
    }
}

async fn job_info(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let job_id = match rpc::require_job_id(params) {
        Ok(job_id) => job_id,
        Err(error) => return RpcResponse::invalid_params(id, error),
    };
    let info = state.launcher.info(job_id).await;
    match serde_json::to_value(info) {
        Ok(mut info) => {
            info["jobId"] = serde_json::json!(job_id);
            RpcResponse::success(id, info)
        }
        Err(error) => RpcResponse::internal_error(id, error.to_string()),
    }
}

async fn watch_results(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let job_id = match rpc::require_job_id(params) {
        Ok(job_id) => job_id,
        Err(error) => return RpcResponse::invalid_params(id, error),
    };

    let Some(mut rx) = state.launcher.subscribe_results(job_id).await else {
        return subscription_refused(id, job_id);
    };

    let clients = Arc::clone(&state.clients);
    let client_id = client_id.clone();
    state.watchers.spawn(async move {
        while let Some(result) = rx.recv().await {
            let data = match serde_json::to_value(&result) {
                Ok(data) => data,
                Err(_) => continue,
            };
            if !clients.send_event(&client_id, &RpcEvent::new("job.result", job_id, data)) {
                return;
            }
        }
        clients.send_event(&client_id, &RpcEvent::stream_end(job_id, "results"));
    });

    RpcResponse::success(id, serde_json::json!({ "jobId": job_id, "subscribed": true }))
}

async fn watch_statistics(
    state: &Arc<HandlerState>,
    client_id: &ClientId,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let job_id = match rpc::require_job_id(params) {
        Ok(job_id) => job_id,
        Err(error) => return RpcResponse::invalid_params(id, error),
    };

    let Some(mut rx) = state.launcher.subscribe_statistics(job_id).await else {
        return subscription_refused(id, job_id);
    };

    let clients = Arc::clone(&state.clients);
    let client_id = client_id.clone();
    state.watchers.spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let data = match serde_json::to_value(&snapshot) {
                Ok(data) => data,
                Err(_) => continue,
            };
            if !clients.send_event(&client_id, &RpcEvent::new("job.statistics", job_id, data)) {
                return;
            }
        }
        clients.send_event(&client_id, &RpcEvent::stream_end(job_id, "statistics"));
    });

    RpcResponse::success(id, serde_json::json!({ "jobId": job_id, "subscribed": true }))
}

fn subscription_refused(id: Option<serde_json::Value>, job_id: JobId) -> RpcResponse {
    // Unknown or already-gone job: the subscription simply never opens.
    RpcResponse::success(id, serde_json::json!({ "jobId": job_id, "subscribed": false }))
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(
        id,
        serde_json::json!({
            "status": "healthy",
            "jobs": state.launcher.registry().len(),
            "clients": state.clients.count(),
        }),
    )
}

fn system_get_info(id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(
        id,
        serde_json::json!({
            "name": "pingmux",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}
