//! Request context for handlers.
//!
//! Carries what a handler may need to know about the call it serves:
//! - `request_id` - id of the inbound request (from `x-request-id` or generated)
//! - `method` - RPC method name
//! - `headers` - HTTP headers of the inbound request
//! - `path` - request path
//! - `file` - uploaded files of a multipart request
//! - `rpc` - server-side calls to other methods, on behalf of the same request
//!
//! # Example
//!
//! ```ignore
//! async fn whoami(_: serde_json::Value, ctx: RequestContext) -> anyhow::Result<String> {
//!     let agent = ctx.header("user-agent").unwrap_or("unknown");
//!     Ok(format!("{} via {}", ctx.request_id(), agent))
//! }
//!
//! async fn profile(_: serde_json::Value, ctx: RequestContext) -> anyhow::Result<User> {
//!     let user: User = ctx.rpc()?.request("getUser", &json!({ "id": 1 })).await?;
//!     Ok(user)
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use bytes::Bytes;
use uuid::Uuid;

use crate::dispatch::{Dispatcher, ScopedDispatcher};
use crate::error::{Result, RpcError};
use crate::events::Origin;

/// Header used to propagate request ids.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context passed to request handlers.
///
/// `RequestContext` is `Clone` and cheap to copy: headers and files live
/// behind `Arc`s and are shared by all clones.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Id of the inbound request.
    request_id: String,
    /// RPC method name being called.
    method: String,
    /// Request path (empty for calls made without an HTTP request).
    path: String,
    /// Where the call came from.
    origin: Origin,
    /// HTTP headers of the inbound request.
    headers: Arc<HeaderMap>,
    /// Files uploaded with a multipart body, by field name.
    files: Arc<HashMap<String, UploadedFile>>,
    /// Dispatcher running the call; set once the call is dispatched.
    dispatcher: Option<Dispatcher>,
}

impl RequestContext {
    /// Create a context for a call without an HTTP request behind it.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: method.into(),
            path: String::new(),
            origin: Origin::Local,
            headers: Arc::new(HeaderMap::new()),
            files: Arc::new(HashMap::new()),
            dispatcher: None,
        }
    }

    /// Create a context for an HTTP request.
    ///
    /// The request id is taken from the `x-request-id` header when present.
    pub fn from_http(method: impl Into<String>, path: impl Into<String>, headers: HeaderMap) -> Self {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: method.into(),
            path: path.into(),
            origin: Origin::Remote,
            headers: Arc::new(headers),
            files: Arc::new(HashMap::new()),
            dispatcher: None,
        }
    }

    /// Attach uploaded files.
    pub fn with_files(mut self, files: HashMap<String, UploadedFile>) -> Self {
        self.files = Arc::new(files);
        self
    }

    /// Bind the context to the dispatcher running the call.
    pub(crate) fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Same request, different method.
    ///
    /// Used for nested calls made from inside a handler.
    pub fn for_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            origin: Origin::Local,
            ..self.clone()
        }
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the RPC method name.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Get the request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the call origin.
    #[inline]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Get all request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get an uploaded file by field name.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field)
    }

    /// Iterate over all uploaded files.
    pub fn files(&self) -> impl Iterator<Item = &UploadedFile> {
        self.files.values()
    }

    /// Call other methods of the same server on behalf of this request.
    ///
    /// Nested calls share the request id and are reported with origin
    /// [`Origin::Local`].
    ///
    /// # Errors
    ///
    /// [`RpcError::Unbound`] if the context never went through a dispatcher,
    /// e.g. one built with [`RequestContext::new`] in a test.
    pub fn rpc(&self) -> Result<ScopedDispatcher<'_>> {
        self.dispatcher
            .as_ref()
            .map(|dispatcher| dispatcher.from(self))
            .ok_or(RpcError::Unbound)
    }
}

/// A file received in a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Form field name.
    pub field: String,
    /// File name sent by the client.
    pub filename: String,
    /// Content type sent by the client.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Descriptor placed in the argument object in place of the contents.
    pub fn descriptor(&self) -> serde_json::Value {
        serde_json::json!({
            "filename": self.filename,
            "contentType": self.content_type,
            "size": self.size(),
        })
    }
}
