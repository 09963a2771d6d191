//! Handler module - handler registration and request context.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps method names to handlers
//! - [`RequestContext`] - what a handler knows about the call it serves
//!
//! # Example
//!
//! ```
//! use rpcwire::handler::{HandlerRegistry, RequestContext};
//! use serde_json::{json, Value};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! // Arguments and results are any serde types
//! registry.register("getUser", |_args: Value, _ctx: RequestContext| async move {
//!     Ok(json!({ "id": 1 }))
//! });
//!
//! // Handlers can read the request they serve
//! registry.register("whoami", |_: Value, ctx: RequestContext| async move {
//!     Ok(ctx.request_id().to_string())
//! });
//! ```

mod context;
mod registry;

pub use context::{RequestContext, UploadedFile, REQUEST_ID_HEADER};
pub use registry::{BoxFuture, Handler, HandlerRegistry, HandlerResult, TypedHandler};
