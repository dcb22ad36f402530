//! HTTP surface for the gateway and for participating services

pub mod http;

pub use http::{create_gateway_router, create_service_router, GatewayState, ServiceIdentity};
