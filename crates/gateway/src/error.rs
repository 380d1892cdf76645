// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for gateway operations.
//!
//! Runtime policy denials are *not* errors (they come back as decision
//! objects); these variants cover configuration problems and I/O failures.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration validation error.
    ///
    /// Examples:
    /// - Negotiated MTU outside [64, 65535]
    /// - Audit path without a parent directory
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session lookup failure (missing or expired).
    #[error("Session error: {0}")]
    Session(String),

    /// Audit journal or transcript store failure.
    #[error("Audit error: {0}")]
    Audit(String),

    /// Transport send/receive failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error (journal writes, transcript files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Propagated protocol engine error.
    #[error(transparent)]
    Core(#[from] gibberlink_core::CoreError),
}

/// Convenience type alias for Results using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;
