//! HTTP-based RPC channel implementation

use crate::channel::{BoxFuture, Connector, Endpoint, RpcChannel};
use crate::grpc;
use bytes::Bytes;
use http::{HeaderMap, Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use protogate_core::{ProblemDetails, RpcCode, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument};

/// Wire protocol spoken to upstream services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// gRPC over HTTP/2 with prior knowledge (default)
    #[default]
    Grpc,
    /// Unary calls: raw protobuf POSTed to `/{service}/{method}`
    Unary,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::Unary => "unary",
        }
    }
}

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Wire protocol
    pub protocol: Protocol,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Max idle connections per host
    pub pool_max_idle_per_host: usize,
    /// HTTP/2 keep alive interval
    pub http2_keep_alive_interval: Option<Duration>,
    /// Per-call deadline enforced by the channel (None = no deadline)
    pub request_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Grpc,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            http2_keep_alive_interval: None,
            request_timeout: None,
        }
    }
}

impl ChannelConfig {
    /// Default configuration speaking the unary protocol
    pub fn unary() -> Self {
        Self {
            protocol: Protocol::Unary,
            ..Self::default()
        }
    }

    /// Set the wire protocol
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the per-call deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set HTTP/2 keep alive interval
    pub fn http2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.http2_keep_alive_interval = Some(interval);
        self
    }
}

/// Channel to one upstream endpoint over a pooled hyper client
#[derive(Clone)]
pub struct HttpChannel {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    config: ChannelConfig,
}

impl HttpChannel {
    /// Create a channel; connections are opened lazily on first call
    pub fn new(endpoint: &Endpoint, config: ChannelConfig) -> Self {
        Self {
            base_url: endpoint.http_url(),
            client: Self::build_client(&config),
            config,
        }
    }

    /// Base URL of the upstream endpoint
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_client(config: &ChannelConfig) -> Client<HttpConnector, Full<Bytes>> {
        let mut builder = Client::builder(TokioExecutor::new());

        builder.pool_idle_timeout(config.pool_idle_timeout.unwrap_or(Duration::from_secs(90)));
        builder.pool_max_idle_per_host(config.pool_max_idle_per_host);

        // gRPC requires HTTP/2; plaintext means prior knowledge
        if config.protocol == Protocol::Grpc {
            builder.http2_only(true);
            if let Some(interval) = config.http2_keep_alive_interval {
                builder.timer(TokioTimer::new());
                builder.http2_keep_alive_interval(interval);
            }
        }

        builder.build_http()
    }

    async fn send(
        client: Client<HttpConnector, Full<Bytes>>,
        url: String,
        protocol: Protocol,
        request: Bytes,
    ) -> Result<Bytes, RpcError> {
        let req = match protocol {
            Protocol::Grpc => Request::builder()
                .method(Method::POST)
                .uri(&url)
                .header("content-type", "application/grpc")
                .header("te", "trailers")
                .body(Full::new(grpc::encode_frame(&request))),
            Protocol::Unary => Request::builder()
                .method(Method::POST)
                .uri(&url)
                .header("content-type", "application/proto")
                .header("accept", "application/proto")
                .header("accept-encoding", "zstd")
                .body(Full::new(request)),
        }
        .map_err(|e| RpcError::Transport(format!("Failed to build request: {}", e)))?;

        let resp = client
            .request(req)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to send request: {}", e)))?;

        let status = resp.status();
        let (parts, body) = resp.into_parts();
        let collected = body
            .collect()
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to read response: {}", e)))?;
        let trailers = collected.trailers().cloned();
        let body_bytes = collected.to_bytes();

        debug!(%status, bytes = body_bytes.len(), "Upstream responded");

        match protocol {
            Protocol::Grpc => {
                if !status.is_success() {
                    return Err(RpcError::Transport(format!(
                        "gRPC call failed with HTTP status {}",
                        status
                    )));
                }
                grpc::check_status(&parts.headers, trailers.as_ref())?;
                grpc::decode_frame(body_bytes)
            }
            Protocol::Unary => {
                if !status.is_success() {
                    if let Ok(pd) = serde_json::from_slice::<ProblemDetails>(&body_bytes) {
                        return Err(RpcError::ProblemDetails(pd));
                    }
                    return Err(RpcError::Transport(format!(
                        "RPC failed with status {}: {}",
                        status,
                        String::from_utf8_lossy(&body_bytes)
                    )));
                }
                maybe_decompress(body_bytes, &parts.headers)
            }
        }
    }
}

/// Decompress data using zstd if the upstream compressed it
fn maybe_decompress(data: Bytes, headers: &HeaderMap) -> Result<Bytes, RpcError> {
    match headers.get("content-encoding").and_then(|v| v.to_str().ok()) {
        Some("zstd") => zstd::decode_all(&data[..])
            .map(Bytes::from)
            .map_err(|e| RpcError::Payload(format!("Decompression failed: {}", e))),
        _ => Ok(data),
    }
}

impl RpcChannel for HttpChannel {
    fn unary(
        &self,
        service: &str,
        method: &str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        let url = format!("{}/{}/{}", self.base_url, service, method);
        let client = self.client.clone();
        let protocol = self.config.protocol;
        let timeout = self.config.request_timeout;
        let span = tracing::debug_span!(
            "rpc",
            rpc.service = service,
            rpc.method = method,
            rpc.system = protocol.as_str(),
            otel.kind = "client"
        );

        Box::pin(
            async move {
                let call = Self::send(client, url, protocol, request);
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                        RpcError::status(
                            RpcCode::DeadlineExceeded,
                            format!("no response within {:?}", limit),
                        )
                    })?,
                    None => call.await,
                }
            }
            .instrument(span),
        )
    }
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel")
            .field("base_url", &self.base_url)
            .field("protocol", &self.config.protocol)
            .finish()
    }
}

/// Default connector: one [`HttpChannel`] per endpoint
#[derive(Debug, Clone, Default)]
pub struct HyperConnector {
    config: ChannelConfig,
}

impl HyperConnector {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

impl Connector for HyperConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcChannel>, RpcError> {
        if endpoint.host.is_empty() {
            return Err(RpcError::Transport("endpoint host is empty".to_string()));
        }
        Ok(Arc::new(HttpChannel::new(endpoint, self.config.clone())))
    }
}
