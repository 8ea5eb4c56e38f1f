//! Error types for the REST gateway

use http::StatusCode;
use protogate_core::{ProblemDetails, RpcError};
use std::path::PathBuf;
use thiserror::Error;

/// REST gateway errors.
///
/// Variants above `InvalidRequestBody` are raised while assembling routes at
/// startup and abort the whole assembly. The rest are raised per request and
/// rendered as Problem Details by the router.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Discovery failed for {}: {reason}", path.display())]
    Discovery { path: PathBuf, reason: String },

    #[error("Service '{service}' is missing required attribute '{attribute}'")]
    MissingServiceAttribute { service: String, attribute: String },

    #[error("Service '{service}' has invalid attribute '{attribute}': {reason}")]
    InvalidServiceAttribute {
        service: String,
        attribute: String,
        reason: String,
    },

    #[error("Method '{method}' is missing required attribute '{attribute}'")]
    MissingMethodAttribute { method: String, attribute: String },

    #[error("Unknown message type '{type_name}' referenced by '{declaration}'")]
    UnknownMessageType {
        declaration: String,
        type_name: String,
    },

    #[error("Parameter '{param}' of '{method}' is not a field of {message}")]
    UnknownParameter {
        method: String,
        param: String,
        message: String,
    },

    #[error("Parameter '{param}' of '{method}' has unknown type '{type_name}'")]
    UnknownParameterType {
        method: String,
        param: String,
        type_name: String,
    },

    #[error("Attribute '{key}={value}' on '{declaration}' was rejected")]
    InvalidAttribute {
        declaration: String,
        key: String,
        value: String,
    },

    #[error("Invalid route path '{path}': {reason}")]
    InvalidRoutePath { path: String, reason: String },

    #[error("Route {method} {path} is declared more than once")]
    DuplicateRoute { method: String, path: String },

    #[error("Route {path} conflicts with already mounted {existing}")]
    ConflictingRoute { path: String, existing: String },

    #[error("Cannot connect service '{service}' to {endpoint}: {reason}")]
    Connect {
        service: String,
        endpoint: String,
        reason: String,
    },

    #[error("protoc failed: {0}")]
    Protoc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Protobuf error: {0}")]
    Protobuf(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Whether this error can only occur while assembling routes
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            GatewayError::Discovery { .. }
                | GatewayError::MissingServiceAttribute { .. }
                | GatewayError::InvalidServiceAttribute { .. }
                | GatewayError::MissingMethodAttribute { .. }
                | GatewayError::UnknownMessageType { .. }
                | GatewayError::UnknownParameter { .. }
                | GatewayError::UnknownParameterType { .. }
                | GatewayError::InvalidAttribute { .. }
                | GatewayError::InvalidRoutePath { .. }
                | GatewayError::DuplicateRoute { .. }
                | GatewayError::ConflictingRoute { .. }
                | GatewayError::Connect { .. }
                | GatewayError::Protoc(_)
                | GatewayError::Config(_)
        )
    }

    /// Convert gateway error to Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        match self {
            GatewayError::InvalidRequestBody(msg) => {
                ProblemDetails::new(StatusCode::BAD_REQUEST, "Invalid Request Body")
                    .with_type("urn:protogate:gateway:invalid-request")
                    .with_detail(msg.clone())
            }
            GatewayError::InvalidParameter { .. } => {
                ProblemDetails::new(StatusCode::BAD_REQUEST, "Invalid Parameter")
                    .with_type("urn:protogate:gateway:invalid-parameter")
                    .with_detail(self.to_string())
            }
            GatewayError::InvalidResponse(msg) => {
                ProblemDetails::new(StatusCode::BAD_GATEWAY, "Invalid Upstream Response")
                    .with_type("urn:protogate:gateway:invalid-response")
                    .with_detail(msg.clone())
            }
            GatewayError::Rpc(RpcError::ProblemDetails(pd)) => pd.clone(),
            GatewayError::Rpc(err @ RpcError::Status { code, message }) => {
                ProblemDetails::new(err.http_status(), "RPC Call Failed")
                    .with_type("urn:protogate:gateway:rpc-error")
                    .with_detail(message.clone())
                    .with_rpc_status(*code)
            }
            GatewayError::Rpc(err) => {
                ProblemDetails::new(err.http_status(), "Upstream Unavailable")
                    .with_type("urn:protogate:gateway:upstream")
                    .with_detail(err.to_string())
            }
            _ => ProblemDetails::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Gateway Error")
                .with_type("urn:protogate:gateway:internal-error")
                .with_detail(self.to_string()),
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.to_problem_details().status
    }
}
