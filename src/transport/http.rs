//! HTTP transport over axum.
//!
//! [`RpcTransport`] recognises `POST <api_path><method>` requests, decodes
//! their bodies, runs them through the [`Dispatcher`] and encodes the outcome
//! as an [`Envelope`]. It is installed as middleware so requests that are not
//! RPC calls reach the wrapped application untouched.
//!
//! | Outcome                      | Status | Body                         |
//! |------------------------------|--------|------------------------------|
//! | handler returned a value     | 200    | success envelope             |
//! | no handler for the method    | 404    | failure, `ERR_MISSING_HANDLER` |
//! | body failed to decode        | 200    | failure, parser code         |
//! | handler returned an error    | 200    | failure, message/code/meta   |

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use crate::codec::decode_body;
use crate::config::RpcConfig;
use crate::dispatch::{elapsed_ms, Dispatcher};
use crate::envelope::Envelope;
use crate::error::RpcError;
use crate::events::{CallStatus, Origin, RpcEvent};
use crate::handler::RequestContext;

/// Route labels attached to the response extensions of every call that
/// resolved to a registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTags {
    /// RPC method name.
    pub name: String,
}

/// Decodes, dispatches and encodes RPC calls.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    dispatcher: Dispatcher,
    config: Arc<RpcConfig>,
    /// Formatted prefix, `/<api_path>/`.
    api_path: Arc<str>,
}

impl RpcTransport {
    /// Create a transport over a dispatcher.
    pub fn new(dispatcher: Dispatcher, config: RpcConfig) -> Self {
        let api_path = Arc::from(config.formatted_api_path());
        Self {
            dispatcher,
            config: Arc::new(config),
            api_path,
        }
    }

    /// The formatted API path prefix.
    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// The dispatcher calls are run through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// RPC method addressed by a request, if it is an RPC call at all.
    ///
    /// The prefix must match exactly, case included; the method is the path
    /// segment right after it and may be empty.
    pub fn match_method<'p>(&self, method: &Method, path: &'p str) -> Option<&'p str> {
        if method != Method::POST {
            return None;
        }
        let rest = path.strip_prefix(&*self.api_path)?;
        Some(rest.split('/').next().unwrap_or_default())
    }

    /// Serve one RPC call.
    pub async fn handle(&self, method: String, request: Request) -> Response {
        let started = Instant::now();
        let expose = self.config.expose_unknown_errors;
        let (parts, body) = request.into_parts();
        let ctx = RequestContext::from_http(method.clone(), parts.uri.path(), parts.headers);

        if !self.dispatcher.has_handler(&method) {
            let err = RpcError::MissingHandler(method.clone());
            self.dispatcher.emitter().from(&ctx).emit(RpcEvent::Error {
                method,
                origin: Origin::Remote,
                error: err.to_string(),
            });
            return envelope_response(StatusCode::NOT_FOUND, Envelope::from_error(&err, expose), None);
        }

        let tags = RouteTags {
            name: method.clone(),
        };

        let decoded = match decode_body(ctx.headers(), body, &self.config.body_parser).await {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!(%method, error = %err, "rpc body rejected");
                self.dispatcher.emitter().from(&ctx).emit(RpcEvent::Method {
                    method,
                    status: CallStatus::Failure,
                    origin: Origin::Remote,
                    timing_ms: elapsed_ms(started),
                    error: Some(err.to_string()),
                });
                return envelope_response(StatusCode::OK, Envelope::from_error(&err, expose), Some(tags));
            }
        };

        let ctx = ctx.with_files(decoded.files);
        let envelope = match self
            .dispatcher
            .invoke(&method, decoded.args, ctx, Origin::Remote, started)
            .await
        {
            Ok(data) => Envelope::Success(data),
            Err(err) => Envelope::from_error(&err, expose),
        };

        envelope_response(StatusCode::OK, envelope, Some(tags))
    }
}

/// Middleware entry point: serve RPC calls, pass everything else on.
pub async fn rpc_middleware(
    State(transport): State<RpcTransport>,
    request: Request,
    next: Next,
) -> Response {
    let Some(method) = transport
        .match_method(request.method(), request.uri().path())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    debug!(%method, path = request.uri().path(), "rpc request");
    transport.handle(method, request).await
}

fn envelope_response(status: StatusCode, envelope: Envelope, tags: Option<RouteTags>) -> Response {
    let mut response = (status, Json(envelope)).into_response();
    if let Some(tags) = tags {
        response.extensions_mut().insert(tags);
    }
    response
}
