// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Gibberlink DSP - Acoustic PHY for the Gibberlink gateway.
//!
//! Real-time demodulation of PCM audio into protocol payload bytes, and the
//! matching modulator for loopback and transmit paths:
//!
//! - [`spectral`]: Hann-windowed streaming FFT with peak detection
//! - [`modem`]: 4-FSK modulator/demodulator with preamble + Barker sync
//!   acquisition, Goertzel tone detection and adaptive thresholding
//! - [`decoder`]: Ring-buffered streaming decode that gates on silence,
//!   deframes recovered bytestreams and emits [`decoder::DecoderEvent`]s
//!
//! The acoustic link is lossy by design: CRC and deframe failures are
//! counted, never retried.

pub mod decoder;
pub mod error;
pub mod modem;
pub mod spectral;

pub use decoder::{AudioDecoder, AudioStats, DecoderEvent};
pub use error::DspError;
pub use modem::{DemodFrame, FskDemodulator, FskModulator, ModemConfig};
pub use spectral::{find_peak_frequencies, FrequencyBin, SpectralAnalyzer};
