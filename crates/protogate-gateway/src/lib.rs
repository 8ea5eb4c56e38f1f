//! Annotation-driven REST gateway for protobuf RPC services.
//!
//! Service and method comments carry route metadata:
//!
//! ```text
//! // [REST] host=localhost port=50051
//! service Order {
//!   // Fetch one order.
//!   // [REST] request=GetOrderRequest response=OrderResponse method=get path=/{id}/
//!   // [REST] id:int
//!   rpc GetOrder(GetOrderRequest) returns (OrderResponse);
//! }
//! ```
//!
//! At startup the gateway:
//! - discovers compiled descriptor sets, one service group per directory ([`discovery`])
//! - parses annotations into validated service descriptors ([`descriptor`])
//! - builds one route per annotated method, bound to an RPC stub ([`route`])
//! - mounts the routes on an axum router with OpenAPI output ([`router`])
//!
//! The example above becomes `GET /api/v1/order/{id}/`.

pub mod annotation;
pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod mapping;
pub mod middleware;
pub mod model;
pub mod openapi;
pub mod protoc;
pub mod route;
pub mod router;
pub mod rules;

#[cfg(test)]
mod testing;

pub use annotation::{AnnotationParser, Annotations};
pub use assembler::Assembler;
pub use config::GatewayConfig;
pub use descriptor::{DescriptorParser, MethodDescriptor, ServiceDescriptor};
pub use discovery::Discovery;
pub use error::{GatewayError, GatewayResult};
pub use mapping::{HttpMethod, UrlTemplate};
pub use middleware::CorsConfig;
pub use model::{MessageModel, ModelInstance, ModelLoader, ModelSchema};
pub use openapi::{OpenApiSpec, OpenApiSpecBuilder};
pub use protoc::ProtoCompiler;
pub use route::{Endpoint, RouteBuilder, RouteDescriptor};
pub use router::{MountedRoute, RestGateway, RestGatewayBuilder};
