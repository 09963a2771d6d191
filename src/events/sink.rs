//! Event sinks.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{CallStatus, EventScope, RpcEvent};

/// Destination for instrumentation events.
///
/// `emit` is called inline on the request path and must not block.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, scope: &EventScope, event: &RpcEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, scope: &EventScope, event: &RpcEvent) {
        match event {
            RpcEvent::Method {
                method,
                status: CallStatus::Success,
                origin,
                timing_ms,
                ..
            } => info!(
                request_id = %scope.request_id,
                %method,
                %origin,
                timing_ms,
                "rpc call succeeded"
            ),
            RpcEvent::Method {
                method,
                status: CallStatus::Failure,
                origin,
                timing_ms,
                error,
            } => warn!(
                request_id = %scope.request_id,
                %method,
                %origin,
                timing_ms,
                error = error.as_deref().unwrap_or(""),
                "rpc call failed"
            ),
            RpcEvent::Error {
                method,
                origin,
                error,
            } => warn!(
                request_id = %scope.request_id,
                %method,
                %origin,
                %error,
                "rpc call rejected"
            ),
        }
    }
}

/// Event together with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedEvent {
    pub scope: EventScope,
    pub event: RpcEvent,
}

/// Forwards events into an unbounded channel.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ScopedEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScopedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, scope: &EventScope, event: &RpcEvent) {
        let _ = self.tx.send(ScopedEvent {
            scope: scope.clone(),
            event: event.clone(),
        });
    }
}
