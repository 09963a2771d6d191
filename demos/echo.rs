//! Echo server - simple request/response example.
//!
//! This example demonstrates:
//! - Building an RPC server with the builder pattern
//! - Registering handlers with typed input/output
//! - Returning an application error with `ResponseError`
//! - Loading configuration from a TOML file and `RPCWIRE__*` variables
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo -- [config.toml]
//!
//! curl -s -XPOST localhost:3000/api/echo -H 'content-type: application/json' \
//!     -d '{"message": "hello"}'
//! # {"status":"success","data":{"echo":"hello"}}
//!
//! curl -s -XPOST localhost:3000/api/getUser -H 'content-type: application/json' -d '{"id": 2}'
//! # {"status":"failure","data":{"message":"no user 2","code":"USER_NOT_FOUND","meta":{"id":2}}}
//! ```

use std::path::PathBuf;

use rpcwire::{RequestContext, ResponseError, RpcServer, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Input structure for the echo method.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo method.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[derive(Deserialize, Debug)]
struct GetUser {
    id: u32,
}

#[derive(Serialize, Debug)]
struct User {
    id: u32,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;

    let plugin = RpcServer::builder()
        .config(config.rpc.clone())
        .handle("echo", |data: EchoInput, _ctx: RequestContext| async move {
            Ok(EchoOutput { echo: data.message })
        })
        .handle("getUser", |args: GetUser, _ctx: RequestContext| async move {
            if args.id != 1 {
                return Err(ResponseError::new(format!("no user {}", args.id))
                    .with_code("USER_NOT_FOUND")
                    .with_meta(json!({ "id": args.id }))
                    .into());
            }
            Ok(User {
                id: 1,
                name: "ada".to_string(),
            })
        })
        .build()?;

    plugin.serve_addr(config.socket_addr()?, config).await?;

    Ok(())
}
