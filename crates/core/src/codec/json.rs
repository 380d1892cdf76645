// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::error::{CoreError, Result};
use crate::value::Value;

use super::Codec;

/// UTF-8 JSON codec.
///
/// Human-debuggable and the default for the WebSocket surface. Byte strings
/// degrade to arrays of numbers; use `msgpack` or `cbor` when payloads carry
/// binary data.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CoreError::Codec(format!("json encode: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Codec(format!("json decode: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_plain_json() {
        let value = Value::from_iter([("op", Value::from("ping"))]);
        let bytes = JsonCodec.encode(&value).unwrap();
        assert_eq!(bytes, br#"{"op":"ping"}"#);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(JsonCodec.decode(b"{not json").is_err());
    }
}
