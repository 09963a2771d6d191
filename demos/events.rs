//! Event consumer - example of reading call instrumentation.
//!
//! This example demonstrates:
//! - Attaching a `ChannelSink` next to the default tracing output
//! - Consuming `rpc:method` / `rpc:error` events in a background task
//! - Calling one handler from another through `RequestContext::rpc`
//!
//! # Running
//!
//! ```sh
//! cargo run --example events
//!
//! curl -s -XPOST localhost:3000/api/profile -H 'content-type: application/json' -d '{}'
//! curl -s -XPOST localhost:3000/api/missing
//! ```

use rpcwire::events::CallStatus;
use rpcwire::{ChannelSink, RequestContext, RpcEvent, RpcServer, ServerConfig, TracingSink};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (sink, mut events) = ChannelSink::new();

    let plugin = RpcServer::builder()
        .event_sink(TracingSink)
        .event_sink(sink)
        .handle("getUser", |_: Value, _ctx: RequestContext| async move {
            Ok(json!({ "id": 1, "name": "ada" }))
        })
        .handle("profile", |_: Value, ctx: RequestContext| async move {
            let user: Value = ctx.rpc()?.request("getUser", &json!({})).await?;
            Ok(json!({ "user": user, "requestId": ctx.request_id() }))
        })
        .build()?;

    tokio::spawn(async move {
        let mut failures = 0usize;
        while let Some(scoped) = events.recv().await {
            match &scoped.event {
                RpcEvent::Method {
                    status: CallStatus::Failure,
                    ..
                }
                | RpcEvent::Error { .. } => failures += 1,
                RpcEvent::Method { .. } => {}
            }
            info!(
                request_id = %scoped.scope.request_id,
                event = scoped.event.name(),
                method = scoped.event.method(),
                failures,
                "observed rpc event"
            );
        }
    });

    let config = ServerConfig::default();
    plugin.serve_addr(config.socket_addr()?, config).await?;

    Ok(())
}
