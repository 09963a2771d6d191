//! Upload server - example of multipart bodies.
//!
//! Text fields and file descriptors arrive merged in the argument object;
//! file contents are read from the request context.
//!
//! # Running
//!
//! ```sh
//! cargo run --example upload
//!
//! curl -s -XPOST localhost:3000/api/upload -F title=notes -F doc=@Cargo.toml
//! # {"status":"success","data":{"title":"notes","files":[{"field":"doc","filename":"Cargo.toml","bytes":...,"lines":...}]}}
//! ```

use rpcwire::{RequestContext, RpcServer, ServerConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug)]
struct UploadInput {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Serialize, Debug)]
struct FileSummary {
    field: String,
    filename: String,
    bytes: usize,
    lines: usize,
}

#[derive(Serialize, Debug)]
struct UploadOutput {
    title: Option<String>,
    files: Vec<FileSummary>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let plugin = RpcServer::builder()
        .handle("upload", |input: UploadInput, ctx: RequestContext| async move {
            let files = ctx
                .files()
                .map(|f| FileSummary {
                    field: f.field.clone(),
                    filename: f.filename.clone(),
                    bytes: f.size(),
                    lines: f.data.iter().filter(|b| **b == b'\n').count(),
                })
                .collect();
            Ok(UploadOutput {
                title: input.title,
                files,
            })
        })
        .build()?;

    let config = ServerConfig::default();
    plugin.serve_addr(config.socket_addr()?, config).await?;

    Ok(())
}
