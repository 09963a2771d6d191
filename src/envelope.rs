//! Response envelope.
//!
//! Every RPC response body has the same shape:
//!
//! ```text
//! {"status": "success", "data": <handler result>}
//! {"status": "failure", "data": {"message": "...", "code": "...", "meta": ...}}
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::{FailureData, RpcError};

/// Normalized success/failure wrapper returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    Success(Value),
    Failure(FailureData),
}

impl Envelope {
    /// Failure envelope for an error.
    pub fn from_error(err: &RpcError, expose_unknown: bool) -> Self {
        Envelope::Failure(err.to_failure(expose_unknown))
    }

    /// Whether this is a success envelope.
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }
}
