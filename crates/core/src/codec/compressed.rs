// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::error::{CoreError, Result};
use crate::value::Value;

use super::Codec;

/// Compression algorithm for [`CompressedCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    Zstd,
}

impl CompressionAlgo {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
        }
    }
}

/// Wraps a base codec with payload compression.
///
/// Canonical name is `base + algo` (`msgpackzstd`). When the negotiated
/// algorithm is unavailable in this build, the wrapper falls through to the
/// base codec's uncompressed bytes and logs a warning; it never refuses the
/// call. Decode detects the zstd magic, so an uncompressed fall-through
/// produced by a peer still decodes.
pub struct CompressedCodec {
    inner: Box<dyn Codec>,
    algo: CompressionAlgo,
    name: String,
}

#[cfg(feature = "zstd")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

impl CompressedCodec {
    pub fn new(inner: Box<dyn Codec>, algo: CompressionAlgo) -> Self {
        let name = format!("{}{}", inner.name(), algo.suffix());
        Self { inner, algo, name }
    }

    #[cfg(feature = "zstd")]
    fn compress(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        match self.algo {
            CompressionAlgo::Zstd => zstd::stream::encode_all(&bytes[..], 0)
                .map_err(|e| CoreError::Codec(format!("zstd compress: {e}"))),
        }
    }

    #[cfg(not(feature = "zstd"))]
    #[allow(clippy::unnecessary_wraps)]
    fn compress(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        tracing::warn!(
            codec = %self.name,
            algo = self.algo.suffix(),
            "compression unavailable in this build; sending uncompressed"
        );
        Ok(bytes)
    }

    #[cfg(feature = "zstd")]
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.starts_with(&ZSTD_MAGIC) {
            match self.algo {
                CompressionAlgo::Zstd => zstd::stream::decode_all(bytes)
                    .map_err(|e| CoreError::Codec(format!("zstd decompress: {e}"))),
            }
        } else {
            // Peer fell through to uncompressed bytes.
            Ok(bytes.to_vec())
        }
    }

    #[cfg(not(feature = "zstd"))]
    #[allow(clippy::unnecessary_wraps)]
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

impl Codec for CompressedCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let bytes = self.inner.encode(value)?;
        self.compress(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let plain = self.decompress(bytes)?;
        self.inner.decode(&plain)
    }
}
