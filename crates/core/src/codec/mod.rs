// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Symmetric byte↔value codecs.
//!
//! Every codec maps a [`Value`] to bytes and back. The three wire codecs have
//! stable canonical names (`msgpack`, `cbor`, `json`); the compression
//! wrapper composes a base codec with an algorithm suffix (`msgpackzstd`).
//!
//! Codecs are pure CPU transforms, so the interface is synchronous; callers
//! on async paths invoke them inline.

mod cbor;
mod compressed;
mod json;
mod msgpack;

pub use cbor::CborCodec;
pub use compressed::{CompressedCodec, CompressionAlgo};
pub use json::JsonCodec;
pub use msgpack::MsgpackCodec;

use crate::error::{CoreError, Result};
use crate::value::Value;

/// Byte↔value codec seam.
///
/// Implementations must round-trip the JSON value model (null, bool, integer,
/// float, string, array, object). MessagePack and CBOR additionally preserve
/// [`Value::Bytes`] unchanged.
pub trait Codec: Send + Sync {
    /// Stable canonical name (`msgpack`, `cbor`, `json`, `jsonzstd`, …).
    fn name(&self) -> &str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// Look up a codec by canonical name.
///
/// Compression-wrapped names are formed as `base + algo` (`msgpackzstd`).
///
/// # Errors
///
/// Returns [`CoreError::Configuration`] for unknown names.
pub fn codec_for_name(name: &str) -> Result<Box<dyn Codec>> {
    match name {
        "msgpack" => Ok(Box::new(MsgpackCodec)),
        "cbor" => Ok(Box::new(CborCodec)),
        "json" => Ok(Box::new(JsonCodec)),
        _ => {
            if let Some(base) = name.strip_suffix("zstd") {
                let inner = codec_for_name(base)?;
                return Ok(Box::new(CompressedCodec::new(inner, CompressionAlgo::Zstd)));
            }
            Err(CoreError::Configuration(format!("unknown codec '{name}'")))
        }
    }
}
