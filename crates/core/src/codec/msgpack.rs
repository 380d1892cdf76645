// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::error::{CoreError, Result};
use crate::value::Value;

use super::Codec;

/// MessagePack codec (compact default for the wire).
///
/// Preserves byte strings via the `bin` family.
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn name(&self) -> &str {
        "msgpack"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| CoreError::Codec(format!("msgpack encode: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Codec(format!("msgpack decode: {e}")))
    }
}
