//! Shared types for the protogate REST gateway.
//!
//! This crate provides the types used by both sides of the gateway:
//! - Problem Details error bodies (RFC 7807)
//! - RPC errors raised by channels
//! - RPC status codes and their HTTP mapping

pub mod error;
pub mod status;

pub use error::{ProblemDetails, RpcError};
pub use status::RpcCode;
