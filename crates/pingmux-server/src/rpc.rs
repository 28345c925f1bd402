//! Wire types for the JSON-RPC-over-WebSocket surface.

use serde::{Deserialize, Serialize};

use pingmux_core::JobId;

/// One request frame from a client.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// One response frame: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

// Standard JSON-RPC error codes, used internally for routing.
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Map numeric JSON-RPC error codes to wire string codes.
pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        _ => "UNKNOWN_ERROR",
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// One push frame: a stream event delivered outside the request/response
/// cycle.
#[derive(Debug, Serialize)]
pub struct RpcEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<&'static str>,
}

impl RpcEvent {
    pub fn new(event_type: &'static str, job_id: JobId, data: serde_json::Value) -> Self {
        Self {
            event_type,
            job_id,
            data: Some(data),
            stream: None,
        }
    }

    /// End-of-stream notice for one watch subscription.
    pub fn stream_end(job_id: JobId, stream: &'static str) -> Self {
        Self {
            event_type: "job.streamEnd",
            job_id,
            data: None,
            stream: Some(stream),
        }
    }
}

/// Extract the job id parameter, which every per-job method requires.
pub fn require_job_id(params: &serde_json::Value) -> Result<JobId, String> {
    let raw = params
        .get("jobId")
        .or_else(|| params.get("id"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "Missing required parameter: jobId".to_string())?;
    u16::try_from(raw)
        .map(JobId::new)
        .map_err(|_| format!("jobId out of range: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"job.stop","params":{"jobId":7},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "job.stop");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn success_response_shape() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert!(json["result"].is_object());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_response_shape() {
        let resp = RpcResponse::method_not_found(Some(serde_json::json!(2)), "job.frob");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "METHOD_NOT_FOUND");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("job.frob"));
        assert!(json.get("result").is_none());
    }

    #[test]
    fn parse_error_has_no_id() {
        let resp = RpcResponse::parse_error();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.as_ref().unwrap().code, "PARSE_ERROR");
        assert!(!resp.success);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = RpcEvent::new("job.result", JobId::new(3), serde_json::json!({"sequence": 1}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job.result");
        assert_eq!(json["jobId"], 3);
        assert_eq!(json["data"]["sequence"], 1);
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn stream_end_names_the_stream() {
        let event = RpcEvent::stream_end(JobId::new(9), "results");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job.streamEnd");
        assert_eq!(json["stream"], "results");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn require_job_id_accepts_both_keys() {
        assert_eq!(
            require_job_id(&serde_json::json!({"jobId": 41})).unwrap(),
            JobId::new(41)
        );
        assert_eq!(
            require_job_id(&serde_json::json!({"id": 42})).unwrap(),
            JobId::new(42)
        );
    }

    #[test]
    fn require_job_id_rejects_bad_values() {
        assert!(require_job_id(&serde_json::json!({})).is_err());
        assert!(require_job_id(&serde_json::json!({"jobId": "seven"})).is_err());
        assert!(require_job_id(&serde_json::json!({"jobId": 70_000})).is_err());
    }
}
