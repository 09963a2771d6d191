//! Codec module - request body decoding.
//!
//! The decoder is chosen from the `Content-Type` header:
//!
//! - `multipart/form-data` - [`multipart`], fields and files merged
//! - `application/json`, `*+json` - JSON
//! - `application/x-www-form-urlencoded` - urlencoded form
//! - `text/*` - plain text (when enabled)
//! - `application/msgpack`, `application/x-msgpack` - [`MsgPackCodec`] (when enabled)
//!
//! Anything else, or a format not listed in
//! [`BodyParserOptions::enable_types`], decodes to an empty object.

mod msgpack;
mod multipart;
mod text;

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};

use crate::config::{BodyParserOptions, BodyType};
use crate::error::{Result, RpcError, ERR_BAD_BODY};
use crate::handler::UploadedFile;

pub use msgpack::MsgPackCodec;

/// Code for bodies over the configured size limit.
pub const ERR_TOO_LARGE: &str = "entity.too.large";

/// Code for malformed bodies.
pub const ERR_PARSE_FAILED: &str = "entity.parse.failed";

/// Decoded request body.
#[derive(Debug, Clone, Default)]
pub struct DecodedBody {
    /// Argument value handed to the handler.
    pub args: Value,
    /// Uploaded files by field name (multipart only).
    pub files: HashMap<String, UploadedFile>,
}

impl DecodedBody {
    fn args(args: Value) -> Self {
        Self {
            args,
            files: HashMap::new(),
        }
    }

    fn empty() -> Self {
        Self::args(Value::Object(Map::new()))
    }
}

/// Body format selected by a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Multipart,
    Typed(BodyType),
    Unsupported,
}

/// Classify a `Content-Type` header value.
pub(crate) fn body_kind(content_type: Option<&str>) -> BodyKind {
    let Some(content_type) = content_type else {
        return BodyKind::Unsupported;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "multipart/form-data" => BodyKind::Multipart,
        "application/json" | "application/csp-report" => BodyKind::Typed(BodyType::Json),
        "application/x-www-form-urlencoded" => BodyKind::Typed(BodyType::Form),
        "application/msgpack" | "application/x-msgpack" | "application/vnd.msgpack" => {
            BodyKind::Typed(BodyType::Msgpack)
        }
        e if e.starts_with("application/") && e.ends_with("+json") => {
            BodyKind::Typed(BodyType::Json)
        }
        e if e.starts_with("text/") => BodyKind::Typed(BodyType::Text),
        _ => BodyKind::Unsupported,
    }
}

/// Decode a request body according to its headers and the parser options.
pub async fn decode_body(
    headers: &HeaderMap,
    body: Body,
    options: &BodyParserOptions,
) -> Result<DecodedBody> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let kind = body_kind(content_type);
    tracing::debug!(?kind, content_type, "decoding rpc body");

    match kind {
        BodyKind::Multipart => {
            // body_kind only yields Multipart for a present header
            let content_type = content_type.unwrap_or_default();
            multipart::decode_multipart(content_type, body, options.multipart_limit).await
        }
        BodyKind::Typed(ty) if options.is_enabled(ty) => {
            let limit = match ty {
                BodyType::Json | BodyType::Msgpack => options.json_limit,
                BodyType::Form => options.form_limit,
                BodyType::Text => options.text_limit,
            };
            let bytes = read_limited(body, limit).await?;
            let args = match ty {
                BodyType::Json => text::decode_json(&bytes, options.strict)?,
                BodyType::Form => text::decode_form(&bytes)?,
                BodyType::Text => text::decode_text(&bytes)?,
                BodyType::Msgpack => msgpack::decode_msgpack_body(&bytes, options.strict)?,
            };
            Ok(DecodedBody::args(args))
        }
        BodyKind::Typed(_) | BodyKind::Unsupported => Ok(DecodedBody::empty()),
    }
}

/// Collect a body, failing once it exceeds `limit` bytes.
async fn read_limited(body: Body, limit: usize) -> Result<Bytes> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(RpcError::body("request entity too large", ERR_TOO_LARGE))
        }
        Err(e) => Err(RpcError::body(
            format!("failed to read request body: {e}"),
            ERR_BAD_BODY,
        )),
    }
}
