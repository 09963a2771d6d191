//! Configuration.
//!
//! [`ServerConfig`] is layered from an optional TOML file and `RPCWIRE__*`
//! environment variables (`__` separates nesting levels, e.g.
//! `RPCWIRE__RPC__API_PATH=rpc`). Every field has a default, so an empty
//! source yields a working configuration.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix of environment variables read by [`ServerConfig::load`].
pub const ENV_PREFIX: &str = "RPCWIRE";

/// Body formats the transport can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    Json,
    Form,
    Text,
    Msgpack,
}

/// Body decoding options.
///
/// Multipart bodies are always accepted; `enable_types` governs the other
/// formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyParserOptions {
    /// Formats decoded from the body; others yield an empty argument object.
    #[serde(default = "default_enable_types")]
    pub enable_types: Vec<BodyType>,

    /// Max JSON (and MessagePack) body size in bytes.
    #[serde(default = "default_json_limit")]
    pub json_limit: usize,

    /// Max urlencoded form body size in bytes.
    #[serde(default = "default_form_limit")]
    pub form_limit: usize,

    /// Max text body size in bytes.
    #[serde(default = "default_text_limit")]
    pub text_limit: usize,

    /// Max multipart body size in bytes.
    #[serde(default = "default_multipart_limit")]
    pub multipart_limit: u64,

    /// Only accept JSON objects and arrays at the top level.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_enable_types() -> Vec<BodyType> {
    vec![BodyType::Json, BodyType::Form]
}
fn default_json_limit() -> usize {
    1024 * 1024
}
fn default_form_limit() -> usize {
    56 * 1024
}
fn default_text_limit() -> usize {
    1024 * 1024
}
fn default_multipart_limit() -> u64 {
    200 * 1024 * 1024
}
fn default_strict() -> bool {
    true
}

impl Default for BodyParserOptions {
    fn default() -> Self {
        Self {
            enable_types: default_enable_types(),
            json_limit: default_json_limit(),
            form_limit: default_form_limit(),
            text_limit: default_text_limit(),
            multipart_limit: default_multipart_limit(),
            strict: default_strict(),
        }
    }
}

impl BodyParserOptions {
    /// Whether `ty` is decoded.
    pub fn is_enabled(&self, ty: BodyType) -> bool {
        self.enable_types.contains(&ty)
    }
}

/// RPC layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Path prefix RPC methods live under.
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Body decoding options.
    #[serde(default)]
    pub body_parser: BodyParserOptions,

    /// Tell clients to use `ResponseError` instead of masking unknown
    /// handler errors as `Internal Server Error`. Development only.
    #[serde(default)]
    pub expose_unknown_errors: bool,
}

fn default_api_path() -> String {
    "api".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            api_path: default_api_path(),
            body_parser: BodyParserOptions::default(),
            expose_unknown_errors: false,
        }
    }
}

impl RpcConfig {
    /// Set the API path prefix.
    pub fn with_api_path(mut self, api_path: impl Into<String>) -> Self {
        self.api_path = api_path.into();
        self
    }

    /// The API path prefix as matched against request paths.
    pub fn formatted_api_path(&self) -> String {
        format_api_path(&self.api_path)
    }
}

/// Normalise an API path prefix to `/<path>/` without repeated slashes.
///
/// ```
/// use rpcwire::config::format_api_path;
///
/// assert_eq!(format_api_path("api"), "/api/");
/// assert_eq!(format_api_path("/v1//rpc/"), "/v1/rpc/");
/// assert_eq!(format_api_path(""), "/");
/// ```
pub fn format_api_path(path: &str) -> String {
    let mut formatted = String::with_capacity(path.len() + 2);
    formatted.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        formatted.push_str(segment);
        formatted.push('/');
    }
    formatted
}

/// Standalone server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub rpc: RpcConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            rpc: RpcConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("rpc.body_parser.enable_types")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e| {
            config::ConfigError::Message(format!("invalid listen address {addr}: {e}")).into()
        })
    }
}
