// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Error types for the acoustic PHY.

use thiserror::Error;

/// DSP configuration and processing errors.
///
/// Runtime demodulation never errors: an undecodable stretch of audio is
/// silence as far as the modem is concerned. The variants here guard
/// construction-time parameters.
#[derive(Debug, Error)]
pub enum DspError {
    /// Invalid analyzer or modem parameters.
    ///
    /// Examples:
    /// - Window size not a power of two
    /// - Symbol rate of zero, or above the sample rate
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using [`DspError`].
pub type Result<T> = std::result::Result<T, DspError>;
