//! Transport module - HTTP request/response handling.
//!
//! Provides:
//! - [`RpcTransport`] - matches `POST <api_path><method>`, decodes, dispatches, encodes
//! - [`rpc_middleware`] - axum middleware wrapping an application router
//! - [`RouteTags`] - route labels for outer middleware

mod http;

pub use http::{rpc_middleware, RouteTags, RpcTransport};
