//! WebSocket listener, request routing, and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use pingmux_engine::JobLauncher;
use pingmux_settings::Settings;

use crate::client::{self, ClientId, ClientRegistry};
use crate::handlers::HandlerState;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::tls::{self, TlsError};

/// Inbound request frames awaiting dispatch, across all clients.
const MESSAGE_QUEUE: usize = 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle that keeps the
/// background tasks alive and can shut the listener down.
pub async fn start(
    settings: &Settings,
    launcher: Arc<JobLauncher>,
) -> Result<ServerHandle, ServerError> {
    let addr: SocketAddr =
        settings
            .listen_addr
            .parse()
            .map_err(|source| ServerError::InvalidAddr {
                addr: settings.listen_addr.clone(),
                source,
            })?;

    // Per-client outbound queues share the stream-buffer sizing: every hop a
    // stream event takes is bounded by the same knob.
    let client_registry = Arc::new(ClientRegistry::new(settings.stream_buffer));
    let cleanup = client::start_cleanup_task(Arc::clone(&client_registry), Duration::from_secs(60));

    let (message_tx, message_rx) = mpsc::channel::<(ClientId, String)>(MESSAGE_QUEUE);
    let handler_state = Arc::new(HandlerState::new(launcher, Arc::clone(&client_registry)));

    let rpc = tokio::spawn(process_rpc_messages(
        message_rx,
        Arc::clone(&handler_state),
        Arc::clone(&client_registry),
    ));

    let router = build_router(AppState {
        handler_state,
        client_registry: Arc::clone(&client_registry),
        message_tx,
    });

    let (local_addr, tls_handle, server) = if settings.tls.enabled {
        let rustls_config = tls::build_rustls_config(&settings.tls).await?;
        let handle = axum_server::Handle::new();
        let server = {
            let handle = handle.clone();
            tokio::spawn(async move {
                axum_server::bind_rustls(addr, rustls_config)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
                    .ok();
            })
        };
        let local_addr = handle.listening().await.unwrap_or(addr);
        tracing::info!(%local_addr, "listener up (mutual TLS)");
        (local_addr, Some(handle), server)
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        tracing::info!(%local_addr, "listener up");
        (local_addr, None, server)
    };

    Ok(ServerHandle {
        local_addr,
        clients: client_registry,
        tls_handle,
        server,
        rpc,
        cleanup,
    })
}

/// Handle returned by [`start`]. Keeps the background tasks alive.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    clients: Arc<ClientRegistry>,
    tls_handle: Option<axum_server::Handle>,
    server: tokio::task::JoinHandle<()>,
    rpc: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections and tear down the background tasks.
    pub fn shutdown(&self) {
        if let Some(handle) = &self.tls_handle {
            handle.shutdown();
        }
        self.server.abort();
        self.rpc.abort();
        self.cleanup.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
    )
    .await;
}

/// Plain-HTTP health probe, for load balancers and scripts.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let client_id = ClientId::new();
    let resp = crate::handlers::dispatch(
        &state.handler_state,
        &client_id,
        "health",
        &serde_json::json!({}),
        None,
    )
    .await;
    axum::Json(resp.result.unwrap_or_default())
}

/// Parse and dispatch request frames from WebSocket clients.
///
/// Each frame is handled on its own task: per-id methods can sit on a ready
/// gate while a job is still constructing, and that must not hold up frames
/// from other clients behind them.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw_frame)) = rx.recv().await {
        let state = Arc::clone(&state);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let request: RpcRequest = match serde_json::from_str(&raw_frame) {
                Ok(request) => request,
                Err(_) => {
                    let resp = RpcResponse::parse_error();
                    if let Ok(json) = serde_json::to_string(&resp) {
                        registry.send_to(&client_id, json);
                    }
                    return;
                }
            };

            let params = request.params.unwrap_or(serde_json::json!({}));
            let response =
                crate::handlers::dispatch(&state, &client_id, &request.method, &params, request.id)
                    .await;

            if let Ok(json) = serde_json::to_string(&response) {
                registry.send_to(&client_id, json);
            }
        });
    }
}
