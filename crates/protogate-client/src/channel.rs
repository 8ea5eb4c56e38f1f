//! Channel and connector traits

use bytes::Bytes;
use protogate_core::RpcError;
use std::fmt;
use std::sync::Arc;

pub use futures_util::future::BoxFuture;

/// Upstream address of one RPC service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for plaintext HTTP transports
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A long-lived connection to one upstream service.
///
/// `service` is the fully qualified service name (e.g. `shop.v1.Order`) and
/// `method` the declared RPC name (e.g. `GetOrder`). Requests and responses
/// are encoded protobuf messages.
pub trait RpcChannel: Send + Sync + 'static {
    fn unary(
        &self,
        service: &str,
        method: &str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>>;
}

/// Opens channels for endpoints
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcChannel>, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("localhost", 50051);
        assert_eq!(endpoint.to_string(), "localhost:50051");
        assert_eq!(endpoint.http_url(), "http://localhost:50051");
    }
}
