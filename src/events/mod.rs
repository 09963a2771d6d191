//! Call instrumentation.
//!
//! Every RPC call produces exactly one event:
//! - `rpc:method` - the handler ran (or the body failed to decode), with status and timing
//! - `rpc:error` - no handler is registered for the method
//!
//! Events are handed to an [`Emitter`], which stamps them with the scope of
//! the request they belong to and fans them out to every configured
//! [`EventSink`].

mod sink;

use std::sync::Arc;

use serde::Serialize;

use crate::handler::RequestContext;

pub use sink::{ChannelSink, EventSink, ScopedEvent, TracingSink};

/// Name of the per-call timing event.
pub const RPC_METHOD_EVENT: &str = "rpc:method";

/// Name of the missing-handler event.
pub const RPC_ERROR_EVENT: &str = "rpc:error";

/// Where a call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Called from server code through the dispatcher.
    Local,
    /// Called over HTTP.
    Remote,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Remote => write!(f, "remote"),
        }
    }
}

/// Outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Failure,
}

/// Instrumentation event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RpcEvent {
    /// A call finished.
    #[serde(rename = "rpc:method")]
    Method {
        method: String,
        status: CallStatus,
        origin: Origin,
        timing_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A call named a method nobody registered.
    #[serde(rename = "rpc:error")]
    Error {
        method: String,
        origin: Origin,
        error: String,
    },
}

impl RpcEvent {
    /// Event name (`rpc:method` or `rpc:error`).
    pub fn name(&self) -> &'static str {
        match self {
            RpcEvent::Method { .. } => RPC_METHOD_EVENT,
            RpcEvent::Error { .. } => RPC_ERROR_EVENT,
        }
    }

    /// Method the event is about.
    pub fn method(&self) -> &str {
        match self {
            RpcEvent::Method { method, .. } | RpcEvent::Error { method, .. } => method,
        }
    }

    /// Status of a finished call; `None` for `rpc:error`.
    pub fn status(&self) -> Option<CallStatus> {
        match self {
            RpcEvent::Method { status, .. } => Some(*status),
            RpcEvent::Error { .. } => None,
        }
    }
}

/// Request an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventScope {
    pub request_id: String,
    pub path: String,
}

/// Fans events out to a set of sinks.
#[derive(Clone)]
pub struct Emitter {
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
}

impl Emitter {
    /// Emitter over the given sinks.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Emitter that drops every event.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// Number of attached sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Emitter scoped to one request.
    pub fn from(&self, ctx: &RequestContext) -> ScopedEmitter<'_> {
        ScopedEmitter {
            emitter: self,
            scope: EventScope {
                request_id: ctx.request_id().to_string(),
                path: ctx.path().to_string(),
            },
        }
    }

    fn emit(&self, scope: &EventScope, event: &RpcEvent) {
        for sink in self.sinks.iter() {
            sink.emit(scope, event);
        }
    }
}

impl Default for Emitter {
    /// A single [`TracingSink`].
    fn default() -> Self {
        Self::new(vec![Arc::new(TracingSink)])
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Emitter bound to one request.
pub struct ScopedEmitter<'a> {
    emitter: &'a Emitter,
    scope: EventScope,
}

impl ScopedEmitter<'_> {
    /// Emit an event in this request's scope.
    pub fn emit(&self, event: RpcEvent) {
        self.emitter.emit(&self.scope, &event);
    }

    /// The scope stamped on every event.
    pub fn scope(&self) -> &EventScope {
        &self.scope
    }
}
