//! `multipart/form-data` bodies.
//!
//! Text fields and uploaded files are merged into a single argument object.
//! A file field is represented by its descriptor (`filename`, `contentType`,
//! `size`); its contents are handed to the handler through
//! [`RequestContext::file`](crate::handler::RequestContext::file). On a name
//! collision the file wins, and a repeated field name keeps its last value.

use std::collections::HashMap;

use axum::body::Body;
use multer::{Constraints, Multipart, SizeLimit};
use serde_json::{Map, Value};

use super::{DecodedBody, ERR_TOO_LARGE};
use crate::error::{Result, RpcError, ERR_BAD_BODY};
use crate::handler::UploadedFile;

/// Decode a multipart body.
///
/// `content_type` is the full header value, including the boundary.
pub(crate) async fn decode_multipart(content_type: &str, body: Body, limit: u64) -> Result<DecodedBody> {
    let boundary = multer::parse_boundary(content_type).map_err(multipart_error)?;
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(limit));
    let mut multipart = Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let mut fields = Map::new();
    let mut files: HashMap<String, UploadedFile> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            tracing::debug!("skipping multipart field without a name");
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;
                files.insert(
                    name.clone(),
                    UploadedFile {
                        field: name,
                        filename,
                        content_type,
                        data,
                    },
                );
            }
            None => {
                let text = field.text().await.map_err(multipart_error)?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    for (name, file) in &files {
        fields.insert(name.clone(), file.descriptor());
    }

    Ok(DecodedBody {
        args: Value::Object(fields),
        files,
    })
}

fn multipart_error(err: multer::Error) -> RpcError {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            RpcError::body("request entity too large", ERR_TOO_LARGE)
        }
        other => RpcError::body(format!("invalid multipart body: {other}"), ERR_BAD_BODY),
    }
}
