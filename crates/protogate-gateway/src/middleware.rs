//! HTTP middleware applied around the synthesized routes

pub mod cors;

pub use cors::{cors, CorsConfig};
