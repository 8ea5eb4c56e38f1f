//! Error types and Problem Details implementation.

use crate::status::RpcCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error raised by an RPC channel while performing a call
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC failed with status {code}: {message}")]
    Status { code: RpcCode, message: String },

    #[error("Malformed RPC payload: {0}")]
    Payload(String),

    #[error("Problem details: {0}")]
    ProblemDetails(ProblemDetails),
}

impl RpcError {
    /// Build a status error
    pub fn status(code: RpcCode, message: impl Into<String>) -> Self {
        RpcError::Status {
            code,
            message: message.into(),
        }
    }

    /// HTTP status the gateway should answer with when this error reaches it
    pub fn http_status(&self) -> StatusCode {
        match self {
            RpcError::Transport(_) => StatusCode::BAD_GATEWAY,
            RpcError::Status { code, .. } => code.to_http_status(),
            RpcError::Payload(_) => StatusCode::BAD_GATEWAY,
            RpcError::ProblemDetails(pd) => {
                StatusCode::from_u16(pd.status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

/// Problem Details per RFC 7807
/// Used for structured error responses from the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary
    pub title: String,

    /// HTTP status code
    pub status: u16,

    /// Human-readable explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// URI reference identifying the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Upstream RPC status name, when the problem came from an RPC call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_status: Option<String>,
}

impl ProblemDetails {
    /// Create a new Problem Details with the given status and title
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            type_uri: format!("urn:protogate:error:{}", status.as_u16()),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
            instance: None,
            rpc_status: None,
        }
    }

    /// Set the type URI
    pub fn with_type(mut self, type_uri: impl Into<String>) -> Self {
        self.type_uri = type_uri.into();
        self
    }

    /// Set the detail field
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the instance field
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Record the upstream RPC status
    pub fn with_rpc_status(mut self, code: RpcCode) -> Self {
        self.rpc_status = Some(code.as_str().to_string());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.title)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}
