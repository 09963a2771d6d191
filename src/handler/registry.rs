//! Handler registry for dispatching calls by method name.
//!
//! The registry maps method names to handlers. It is filled once by
//! [`RpcServerBuilder`](crate::RpcServerBuilder) and then frozen behind an
//! `Arc`; nothing mutates it while requests are served.
//!
//! # Example
//!
//! ```
//! use rpcwire::handler::{HandlerRegistry, RequestContext};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("double", |n: i64, _ctx: RequestContext| async move {
//!     Ok(n * 2)
//! });
//!
//! assert!(registry.contains("double"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::RequestContext;
use crate::error::{Result, RpcError};

/// Result type for handler functions.
pub type HandlerResult<R> = anyhow::Result<R>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call with its argument value.
    fn call(&self, args: Value, ctx: RequestContext) -> BoxFuture<'static, Result<Value>>;
}

/// Wrapper that deserializes arguments and serializes results around a
/// typed handler function.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    fn call(&self, args: Value, ctx: RequestContext) -> BoxFuture<'static, Result<Value>> {
        let parsed: T = match serde_json::from_value(args) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(RpcError::InvalidArgs(e)) }),
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move {
            let output = fut.await.map_err(RpcError::from_handler)?;
            Ok(serde_json::to_value(output)?)
        })
    }
}

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Handlers by method name.
    methods: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler.
    ///
    /// Registering the same name twice replaces the earlier handler.
    pub fn register<F, T, R, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.register_handler(name, TypedHandler::new(handler));
    }

    /// Register any [`Handler`] implementation.
    pub fn register_handler<H: Handler>(&mut self, name: &str, handler: H) {
        if self
            .methods
            .insert(name.to_string(), Box::new(handler))
            .is_some()
        {
            tracing::warn!("RPC handler for {} registered twice, keeping the last one", name);
        }
    }

    /// Whether a handler is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Get a handler by method name.
    pub fn get_handler(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|h| h.as_ref())
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Dispatch a call to the appropriate handler.
    ///
    /// # Arguments
    ///
    /// * `method` - Method name
    /// * `args` - Argument value
    /// * `ctx` - Request context handed to the handler
    pub async fn dispatch(&self, method: &str, args: Value, ctx: RequestContext) -> Result<Value> {
        let handler = self
            .get_handler(method)
            .ok_or_else(|| RpcError::MissingHandler(method.to_string()))?;

        handler.call(args, ctx).await
    }
}
