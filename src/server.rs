//! Server builder and runtime.
//!
//! The [`RpcServerBuilder`] provides a fluent API for registering handlers,
//! configuration and event sinks. [`RpcPlugin`] is what it builds: the frozen
//! registry plus everything needed to serve it.
//! 1. Register handlers
//! 2. Build the plugin
//! 3. Either attach it to an existing axum router or serve it standalone
//!
//! # Example
//!
//! ```ignore
//! use rpcwire::RpcServer;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plugin = RpcServer::builder()
//!         .handle("getUser", |_: Value, _ctx| async move {
//!             Ok(json!({ "id": 1 }))
//!         })
//!         .build()?;
//!
//!     plugin.serve_addr("127.0.0.1:3000".parse()?, Default::default()).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{RpcConfig, ServerConfig};
use crate::dispatch::Dispatcher;
use crate::error::{Result, RpcError};
use crate::events::{Emitter, EventSink, TracingSink};
use crate::handler::{Handler, HandlerRegistry, HandlerResult, RequestContext};
use crate::transport::{rpc_middleware, RpcTransport};

/// Builder for configuring and creating an [`RpcPlugin`].
pub struct RpcServerBuilder {
    registry: HandlerRegistry,
    config: RpcConfig,
    sinks: Vec<Arc<dyn EventSink>>,
    default_sink: bool,
}

impl RpcServerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config: RpcConfig::default(),
            sinks: Vec::new(),
            default_sink: true,
        }
    }

    /// Register a method handler.
    ///
    /// The handler receives the deserialized arguments and the request
    /// context; its result is serialized into the success envelope.
    pub fn handle<F, T, R, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.registry.register(method, handler);
        self
    }

    /// Register a hand-written [`Handler`] implementation.
    pub fn handler<H: Handler>(mut self, method: &str, handler: H) -> Self {
        self.registry.register_handler(method, handler);
        self
    }

    /// Set the RPC configuration.
    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the API path prefix.
    ///
    /// Default: `api`
    pub fn api_path(mut self, api_path: impl Into<String>) -> Self {
        self.config.api_path = api_path.into();
        self
    }

    /// Add an event sink.
    ///
    /// Without any sink, events are logged through a [`TracingSink`].
    pub fn event_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Do not add the default [`TracingSink`] when no sink is configured.
    pub fn without_default_sink(mut self) -> Self {
        self.default_sink = false;
        self
    }

    /// Freeze the registry and build the plugin.
    ///
    /// Fails if a method name is empty or contains `/`, since no request
    /// path could ever address it.
    pub fn build(self) -> Result<RpcPlugin> {
        if let Some(bad) = self
            .registry
            .method_names()
            .into_iter()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(RpcError::InvalidMethodName(bad.to_string()));
        }

        let mut sinks = self.sinks;
        if sinks.is_empty() && self.default_sink {
            sinks.push(Arc::new(TracingSink));
        }

        let dispatcher = Dispatcher::new(Arc::new(self.registry), Emitter::new(sinks));
        Ok(RpcPlugin {
            transport: RpcTransport::new(dispatcher, self.config),
        })
    }
}

impl Default for RpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for building an [`RpcPlugin`].
pub struct RpcServer;

impl RpcServer {
    /// Create a new server builder.
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }
}

/// A built RPC layer, ready to be served.
///
/// Cloning is cheap; all clones share the same registry and sinks.
#[derive(Debug, Clone)]
pub struct RpcPlugin {
    transport: RpcTransport,
}

impl RpcPlugin {
    /// Dispatcher for server-side calls.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.transport.dispatcher()
    }

    /// The HTTP transport.
    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    /// Wrap an application router; RPC calls are answered before they reach it.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.transport.clone(),
            rpc_middleware,
        ))
    }

    /// Standalone router: RPC calls, JSON 404 for everything else.
    pub fn router(&self) -> Router {
        self.attach(Router::new().fallback(not_found))
    }

    /// Serve on a bound listener until Ctrl-C.
    pub async fn serve(&self, listener: TcpListener, config: &ServerConfig) -> Result<()> {
        self.serve_with_shutdown(listener, config, shutdown_signal())
            .await
    }

    /// Serve on a bound listener until `shutdown` completes.
    ///
    /// In-flight requests are drained before returning.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        config: &ServerConfig,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self
            .router()
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http());

        info!(
            "Serving {} RPC methods under {} on {}",
            self.dispatcher().registry().len(),
            self.transport.api_path(),
            listener.local_addr()?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("RPC server stopped");
        Ok(())
    }

    /// Bind `addr` and serve until Ctrl-C.
    pub async fn serve_addr(&self, addr: SocketAddr, config: ServerConfig) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, &config).await
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use serde_json::Value;

    #[test]
    fn test_builder_default() {
        let plugin = RpcServerBuilder::default().build().unwrap();
        assert!(plugin.dispatcher().registry().is_empty());
        assert_eq!(plugin.transport().api_path(), "/api/");
        assert_eq!(plugin.dispatcher().emitter().sink_count(), 1);
    }

    #[test]
    fn test_builder_method_chaining() {
        let plugin = RpcServer::builder()
            .handle("getUser", |_: Value, _ctx| async { Ok(1) })
            .handle("listUsers", |_: Value, _ctx| async { Ok(vec![1, 2]) })
            .api_path("rpc")
            .build()
            .unwrap();

        assert_eq!(
            plugin.dispatcher().registry().method_names(),
            vec!["getUser", "listUsers"]
        );
        assert_eq!(plugin.transport().api_path(), "/rpc/");
    }

    #[test]
    fn test_builder_sinks() {
        let (sink, _rx) = ChannelSink::new();
        let plugin = RpcServer::builder().event_sink(sink).build().unwrap();
        assert_eq!(plugin.dispatcher().emitter().sink_count(), 1);

        let plugin = RpcServer::builder().without_default_sink().build().unwrap();
        assert_eq!(plugin.dispatcher().emitter().sink_count(), 0);
    }

    #[test]
    fn test_builder_rejects_unreachable_names() {
        let err = RpcServer::builder()
            .handle("users/get", |_: Value, _ctx| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidMethodName(name) if name == "users/get"));

        let err = RpcServer::builder()
            .handle("", |_: Value, _ctx| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidMethodName(_)));
    }

    #[test]
    fn test_builder_config() {
        let config = RpcConfig {
            expose_unknown_errors: true,
            ..RpcConfig::default().with_api_path("v1")
        };
        let plugin = RpcServer::builder().config(config).build().unwrap();
        assert_eq!(plugin.transport().api_path(), "/v1/");
    }
}
