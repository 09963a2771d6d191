//! Error types for rpcwire.
//!
//! [`RpcError`] is the crate-wide error. [`ResponseError`] is the error type
//! handlers return when the client should see a message, a code and
//! metadata; any other handler error is masked before it leaves the server.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Code reported when no handler is registered for a method.
pub const ERR_MISSING_HANDLER: &str = "ERR_MISSING_HANDLER";

/// Code reported when the call arguments do not match the handler's input type.
pub const ERR_INVALID_ARGS: &str = "ERR_INVALID_ARGS";

/// Code reported for body decoding failures without a more specific code.
pub const ERR_BAD_BODY: &str = "ERR_BAD_BODY";

/// Message sent for unknown handler errors in production.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Message sent for unknown handler errors when `expose_unknown_errors` is on.
pub const UNKNOWN_ERROR_MESSAGE: &str = "UnknownError - Return rpcwire::ResponseError from the \
     handler for more detailed error messages";

/// Main error type for all rpcwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No handler registered under the requested method name.
    #[error("Missing RPC handler for {0}")]
    MissingHandler(String),

    /// Application error raised by a handler, visible to the client.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Any other handler error; its details never reach the client.
    #[error("Handler error: {0}")]
    Handler(anyhow::Error),

    /// The argument value could not be deserialized into the handler's input.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(#[source] serde_json::Error),

    /// The request body could not be decoded.
    #[error("{message}")]
    Body {
        /// Human readable reason.
        message: String,
        /// Machine readable code (`entity.parse.failed`, `entity.too.large`, ...).
        code: String,
    },

    /// Server-side call through a context no dispatcher has seen.
    #[error("Request context is not bound to a dispatcher")]
    Unbound,

    /// A handler was registered under a name no request path can reach.
    #[error("Invalid method name: {0:?}")]
    InvalidMethodName(String),

    /// JSON serialization error (handler results, envelopes).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization error.
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// I/O error while binding or serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl RpcError {
    /// Build a body decoding error.
    pub fn body(message: impl Into<String>, code: impl Into<String>) -> Self {
        RpcError::Body {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Classify an error returned by a handler.
    ///
    /// A [`ResponseError`] (or an `RpcError` passed through `anyhow`) keeps its
    /// identity; everything else becomes [`RpcError::Handler`].
    pub fn from_handler(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ResponseError>() {
            Ok(response) => return RpcError::Response(response),
            Err(err) => err,
        };
        match err.downcast::<RpcError>() {
            Ok(rpc) => rpc,
            Err(err) => RpcError::Handler(err),
        }
    }

    /// The machine readable code clients see for this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            RpcError::MissingHandler(_) => Some(ERR_MISSING_HANDLER),
            RpcError::Response(e) => e.code.as_deref(),
            RpcError::InvalidArgs(_) => Some(ERR_INVALID_ARGS),
            RpcError::Body { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Convert into the payload of a failure envelope.
    ///
    /// Errors that are not meant for clients are masked; with
    /// `expose_unknown` set the mask points developers at [`ResponseError`].
    pub fn to_failure(&self, expose_unknown: bool) -> FailureData {
        match self {
            RpcError::Response(e) => FailureData {
                message: e.message.clone(),
                code: e.code.clone(),
                meta: e.meta.clone(),
            },
            RpcError::MissingHandler(_) | RpcError::InvalidArgs(_) | RpcError::Body { .. } => {
                FailureData {
                    message: self.to_string(),
                    code: self.code().map(str::to_string),
                    meta: None,
                }
            }
            _ => FailureData {
                message: if expose_unknown {
                    UNKNOWN_ERROR_MESSAGE.to_string()
                } else {
                    INTERNAL_ERROR_MESSAGE.to_string()
                },
                code: None,
                meta: None,
            },
        }
    }
}

/// Error a handler returns to report a failure to the client.
///
/// # Example
///
/// ```
/// use rpcwire::ResponseError;
/// use serde_json::json;
///
/// let err = ResponseError::new("user not found")
///     .with_code("USER_NOT_FOUND")
///     .with_meta(json!({ "id": 7 }));
/// assert_eq!(err.to_string(), "user not found");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ResponseError {
    /// Message shown to the client.
    pub message: String,
    /// Optional application error code.
    pub code: Option<String>,
    /// Optional structured metadata.
    pub meta: Option<Value>,
}

impl ResponseError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            meta: None,
        }
    }

    /// Attach an application error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach structured metadata.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Payload of a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureData {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
