//! # rpcwire
//!
//! Method-name-keyed RPC over HTTP.
//!
//! Applications register async handlers by method name; clients call them
//! with `POST /<api_path>/<method>` and always get back a JSON envelope:
//! `{"status": "success", "data": ...}` or
//! `{"status": "failure", "data": {"message", "code", "meta"}}`.
//!
//! ## Architecture
//!
//! - **Transport** ([`transport`]): matches the path prefix, decodes JSON,
//!   form, multipart (and optionally text / MessagePack) bodies, encodes
//!   envelopes
//! - **Dispatcher** ([`dispatch`]): looks up and invokes handlers, for HTTP
//!   calls and server-side calls alike
//! - **Instrumentation** ([`events`]): one `rpc:method` or `rpc:error` event
//!   per call, fanned out to pluggable sinks
//!
//! ## Example
//!
//! ```ignore
//! use rpcwire::{ResponseError, RpcServer};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plugin = RpcServer::builder()
//!         .handle("getUser", |_: Value, _ctx| async move {
//!             Ok(json!({ "id": 1 }))
//!         })
//!         .handle("deleteUser", |_: Value, _ctx| async move {
//!             Err::<Value, _>(ResponseError::new("not allowed").with_code("FORBIDDEN").into())
//!         })
//!         .build()?;
//!
//!     // POST /api/getUser -> {"status":"success","data":{"id":1}}
//!     plugin.serve_addr("127.0.0.1:3000".parse()?, Default::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod events;
pub mod handler;
pub mod transport;

mod server;

pub use config::{BodyParserOptions, BodyType, RpcConfig, ServerConfig};
pub use dispatch::{Dispatcher, ScopedDispatcher};
pub use envelope::Envelope;
pub use error::{FailureData, ResponseError, RpcError};
pub use events::{ChannelSink, EventSink, Origin, RpcEvent, TracingSink};
pub use handler::{RequestContext, UploadedFile};
pub use server::{RpcPlugin, RpcServer, RpcServerBuilder};
pub use transport::RouteTags;
