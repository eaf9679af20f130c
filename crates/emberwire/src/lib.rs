//! `emberwire`: the JSON wire contract between clients and the ember server.
//!
//! Both directions carry one frame per WebSocket text message, tagged by
//! `op`. RPC payloads mirror the web client's camelCase types. The frames
//! are transport-shaped, not transport-bound: anything that can deliver
//! session lifecycle, request/reply and channel publishes can carry them.

pub mod frame;
pub mod rpc;

pub const CODE_BAD_REQUEST: u16 = 400;
pub const CODE_PERMISSION_DENIED: u16 = 403;
pub const CODE_NOT_FOUND: u16 = 404;
pub const CODE_METHOD_NOT_FOUND: u16 = 405;
pub const CODE_INTERNAL: u16 = 500;

/// RPC failure as sent to the client: a small closed code set plus a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: u16,
    pub message: String,
}

impl RpcError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        RpcError {
            code: CODE_BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn permission_denied() -> Self {
        RpcError {
            code: CODE_PERMISSION_DENIED,
            message: "permission denied".to_string(),
        }
    }

    pub fn not_found() -> Self {
        RpcError {
            code: CODE_NOT_FOUND,
            message: "not found".to_string(),
        }
    }

    pub fn method_not_found() -> Self {
        RpcError {
            code: CODE_METHOD_NOT_FOUND,
            message: "method not found".to_string(),
        }
    }

    pub fn internal() -> Self {
        RpcError {
            code: CODE_INTERNAL,
            message: "internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
