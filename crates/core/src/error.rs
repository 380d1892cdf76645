// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for the protocol engine.
//!
//! Wire-level rejects (bad magic, bad CRC, truncated frames) are *not*
//! errors: `deframe` and FEC decode return `Option` and callers count the
//! discard. The variants here cover genuine failures the caller has to
//! handle: codec round-trip failures, invalid configuration and framing
//! limits.

use thiserror::Error;

/// Main error type for protocol engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration or parameter validation error.
    ///
    /// Examples:
    /// - MTU outside the supported range
    /// - Unknown codec or FEC name requested
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Codec encode/decode failure.
    ///
    /// Examples:
    /// - Truncated MessagePack input
    /// - CBOR value outside the supported data model
    #[error("Codec error: {0}")]
    Codec(String),

    /// Framing failure during encode.
    ///
    /// Examples:
    /// - Payload needs more than 255 chunks at the requested MTU
    /// - Chunking disabled but the payload exceeds the MTU
    #[error("Framing error: {0}")]
    Framing(String),

    /// Address parse failure.
    #[error("Address error: {0}")]
    Address(String),

    /// I/O error (transport send/receive).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Codec("truncated input".to_string());
        assert_eq!(err.to_string(), "Codec error: truncated input");

        let err = CoreError::Framing("payload needs 300 chunks".to_string());
        assert_eq!(err.to_string(), "Framing error: payload needs 300 chunks");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket closed");
        let err: CoreError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("socket closed"));
    }
}
