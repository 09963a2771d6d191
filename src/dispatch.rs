//! Dispatcher - looks up handlers, invokes them and records the outcome.
//!
//! The HTTP transport and server-side callers share [`Dispatcher::invoke`],
//! so every call is timed and reported the same way no matter where it came
//! from.
//!
//! # Example
//!
//! ```ignore
//! // Inside a handler: call another method of the same server.
//! let user: User = ctx.rpc()?.request("getUser", &json!({ "id": 1 })).await?;
//!
//! // Outside of any request, through the plugin.
//! let ctx = RequestContext::new("startup");
//! let user: User = plugin.dispatcher().from(&ctx).request("getUser", &json!({ "id": 1 })).await?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::events::{CallStatus, Emitter, Origin, RpcEvent};
use crate::handler::{HandlerRegistry, RequestContext};

/// Executes calls against the frozen handler registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    emitter: Emitter,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and an emitter.
    pub fn new(registry: Arc<HandlerRegistry>, emitter: Emitter) -> Self {
        Self { registry, emitter }
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The event emitter.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Whether `method` has a handler.
    pub fn has_handler(&self, method: &str) -> bool {
        self.registry.contains(method)
    }

    /// Bind the dispatcher to one request for server-side calls.
    pub fn from<'a>(&'a self, ctx: &'a RequestContext) -> ScopedDispatcher<'a> {
        ScopedDispatcher {
            dispatcher: self,
            ctx,
        }
    }

    /// Run one call and report it.
    ///
    /// `started` is when the call entered the RPC layer; the reported timing
    /// is measured from it. The handler receives `ctx` bound to this
    /// dispatcher, so it can make nested calls through
    /// [`RequestContext::rpc`].
    pub async fn invoke(
        &self,
        method: &str,
        args: Value,
        ctx: RequestContext,
        origin: Origin,
        started: Instant,
    ) -> Result<Value> {
        let emitter = self.emitter.from(&ctx);

        // a MissingHandler returned by the handler itself is a handler failure
        if !self.registry.contains(method) {
            let err = RpcError::MissingHandler(method.to_string());
            emitter.emit(RpcEvent::Error {
                method: method.to_string(),
                origin,
                error: err.to_string(),
            });
            return Err(err);
        }

        let ctx = ctx.with_dispatcher(self.clone());
        let result = self.registry.dispatch(method, args, ctx).await;
        let timing_ms = elapsed_ms(started);

        match &result {
            Ok(_) => emitter.emit(RpcEvent::Method {
                method: method.to_string(),
                status: CallStatus::Success,
                origin,
                timing_ms,
                error: None,
            }),
            Err(e) => emitter.emit(RpcEvent::Method {
                method: method.to_string(),
                status: CallStatus::Failure,
                origin,
                timing_ms,
                error: Some(e.to_string()),
            }),
        }

        result
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.registry.method_names())
            .field("emitter", &self.emitter)
            .finish()
    }
}

/// Dispatcher bound to one request.
pub struct ScopedDispatcher<'a> {
    dispatcher: &'a Dispatcher,
    ctx: &'a RequestContext,
}

impl ScopedDispatcher<'_> {
    /// Call `method` with typed arguments and decode its result.
    pub async fn request<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args)?;
        let value = self.request_value(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call `method` with a raw argument value.
    pub async fn request_value(&self, method: &str, args: Value) -> Result<Value> {
        self.dispatcher
            .invoke(
                method,
                args,
                self.ctx.for_method(method),
                Origin::Local,
                Instant::now(),
            )
            .await
    }
}

/// Milliseconds since `started`, rounded down.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseError;
    use crate::events::{ChannelSink, ScopedEvent};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn dispatcher() -> (Dispatcher, UnboundedReceiver<ScopedEvent>) {
        let mut registry = HandlerRegistry::new();
        registry.register("getUser", |_: Value, _ctx| async move { Ok(json!({"id": 1})) });
        registry.register("explode", |_: Value, _ctx| async move {
            Err::<Value, _>(anyhow::anyhow!("kaboom"))
        });
        registry.register("forbidden", |_: Value, _ctx| async move {
            Err::<Value, _>(ResponseError::new("no").with_code("E_FORBIDDEN").into())
        });

        let (sink, rx) = ChannelSink::new();
        let emitter = Emitter::new(vec![Arc::new(sink)]);
        (Dispatcher::new(Arc::new(registry), emitter), rx)
    }

    #[tokio::test]
    async fn test_success_emits_success_event() {
        let (dispatcher, mut rx) = dispatcher();
        let ctx = RequestContext::new("getUser");

        let result = dispatcher
            .invoke("getUser", json!({}), ctx.clone(), Origin::Local, Instant::now())
            .await
            .unwrap();
        assert_eq!(result, json!({"id": 1}));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.scope.request_id, ctx.request_id());
        match received.event {
            RpcEvent::Method {
                method,
                status,
                origin,
                error,
                ..
            } => {
                assert_eq!(method, "getUser");
                assert_eq!(status, CallStatus::Success);
                assert_eq!(origin, Origin::Local);
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_handler_emits_error_event() {
        let (dispatcher, mut rx) = dispatcher();

        let err = dispatcher
            .invoke(
                "nope",
                json!({}),
                RequestContext::new("nope"),
                Origin::Remote,
                Instant::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::MissingHandler(_)));

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received.event,
            RpcEvent::Error {
                method: "nope".into(),
                origin: Origin::Remote,
                error: "Missing RPC handler for nope".into(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_failure_is_rethrown_and_reported() {
        let (dispatcher, mut rx) = dispatcher();

        let err = dispatcher
            .invoke(
                "explode",
                json!({}),
                RequestContext::new("explode"),
                Origin::Local,
                Instant::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Handler(_)));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.status(), Some(CallStatus::Failure));
        match received.event {
            RpcEvent::Method { error, .. } => assert!(error.unwrap().contains("kaboom")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scoped_request_typed() {
        #[derive(serde::Deserialize)]
        struct User {
            id: u32,
        }

        let (dispatcher, _rx) = dispatcher();
        let ctx = RequestContext::new("outer");

        let user: User = dispatcher
            .from(&ctx)
            .request("getUser", &json!({}))
            .await
            .unwrap();
        assert_eq!(user.id, 1);
    }

    #[tokio::test]
    async fn test_scoped_request_response_error() {
        let (dispatcher, _rx) = dispatcher();
        let ctx = RequestContext::new("outer");

        let err = dispatcher
            .from(&ctx)
            .request_value("forbidden", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("E_FORBIDDEN"));
    }

    #[tokio::test]
    async fn test_handler_calls_through_context() {
        let mut registry = HandlerRegistry::new();
        registry.register("getUser", |_: Value, _ctx| async move { Ok(json!({"id": 1})) });
        registry.register("profile", |_: Value, ctx: RequestContext| async move {
            let user: Value = ctx.rpc()?.request("getUser", &json!({})).await?;
            Ok(json!({"user": user}))
        });
        registry.register("broken", |_: Value, ctx: RequestContext| async move {
            let missing: Value = ctx.rpc()?.request_value("nope", json!({})).await?;
            Ok(missing)
        });
        let (sink, mut rx) = ChannelSink::new();
        let dispatcher = Dispatcher::new(Arc::new(registry), Emitter::new(vec![Arc::new(sink)]));

        let result = dispatcher
            .invoke(
                "profile",
                json!({}),
                RequestContext::new("profile"),
                Origin::Remote,
                Instant::now(),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"user": {"id": 1}}));

        let inner = rx.recv().await.unwrap().event;
        assert_eq!(inner.method(), "getUser");
        assert!(matches!(inner, RpcEvent::Method { origin: Origin::Local, .. }));
        let outer = rx.recv().await.unwrap().event;
        assert_eq!(outer.method(), "profile");
        assert!(matches!(outer, RpcEvent::Method { origin: Origin::Remote, .. }));

        // a nested miss fails the outer call, it is not a missing outer handler
        let err = dispatcher
            .invoke(
                "broken",
                json!({}),
                RequestContext::new("broken"),
                Origin::Remote,
                Instant::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::MissingHandler(name) if name == "nope"));
        assert_eq!(rx.recv().await.unwrap().event.name(), "rpc:error");
        let outer = rx.recv().await.unwrap().event;
        assert_eq!(outer.method(), "broken");
        assert_eq!(outer.status(), Some(CallStatus::Failure));
    }

    #[test]
    fn test_elapsed_ms() {
        assert!(elapsed_ms(Instant::now()) < 1000);
    }
}
