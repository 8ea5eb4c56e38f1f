//! RPC channels for the protogate REST gateway.
//!
//! The gateway talks to upstream services through two narrow seams:
//! - [`Connector`] opens one channel per `host:port` endpoint
//! - [`RpcChannel`] performs unary calls on that channel
//!
//! [`HyperConnector`] is the default implementation, speaking either gRPC
//! framing over HTTP/2 or a plain unary protocol over HTTP.

pub mod channel;
pub mod client;
pub mod grpc;

pub use channel::{BoxFuture, Connector, Endpoint, RpcChannel};
pub use client::{ChannelConfig, HttpChannel, HyperConnector, Protocol};
pub use protogate_core::{RpcCode, RpcError};
