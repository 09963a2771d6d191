//! MessagePack request bodies.
//!
//! Bodies sent as `application/msgpack` are decoded into the same JSON
//! argument value a JSON body would produce, so handlers never see the wire
//! format. Encoding uses `to_vec_named` (structs as maps, keyed by field
//! name), which is what JavaScript MessagePack clients produce and expect.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::MsgPackCodec;
//! use serde_json::{json, Value};
//!
//! let encoded = MsgPackCodec::encode(&json!({ "id": 1 })).unwrap();
//! let decoded: Value = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, json!({ "id": 1 }));
//! ```

use serde_json::Value;

use super::ERR_PARSE_FAILED;
use crate::error::{Result, RpcError};

/// MessagePack encoding of RPC arguments.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Encode`] if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns a body error with code `entity.parse.failed` if the bytes
    /// cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| RpcError::body(format!("invalid msgpack: {e}"), ERR_PARSE_FAILED))
    }
}

/// Decode a MessagePack body into an argument value.
///
/// An empty body yields `{}`; in strict mode only maps and arrays are accepted.
pub(crate) fn decode_msgpack_body(bytes: &[u8], strict: bool) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = MsgPackCodec::decode(bytes)?;
    if strict && !(value.is_object() || value.is_array()) {
        return Err(RpcError::body(
            "invalid msgpack, only supports map and array",
            ERR_PARSE_FAILED,
        ));
    }
    Ok(value)
}
