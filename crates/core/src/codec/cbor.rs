// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::error::{CoreError, Result};
use crate::value::Value;

use super::Codec;

/// CBOR codec (RFC 8949), via ciborium.
///
/// Preserves byte strings as CBOR major type 2.
pub struct CborCodec;

impl Codec for CborCodec {
    fn name(&self) -> &str {
        "cbor"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| CoreError::Codec(format!("cbor encode: {e}")))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::Codec(format!("cbor decode: {e}")))
    }
}
