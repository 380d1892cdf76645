// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Hann-windowed streaming FFT.
//!
//! The analyzer consumes PCM in arbitrary chunk sizes and produces one
//! spectrum per hop (`hop = W * (1 - overlap)`). The modem also borrows the
//! one-shot [`SpectralAnalyzer::spectrum`] path to estimate the per-block
//! noise floor; magnitudes there are directly comparable with Goertzel
//! magnitudes computed over the same windowed block.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use gibberlink_core::types::now_us;

use crate::error::{DspError, Result};

/// One FFT bin.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyBin {
    pub frequency: f32,
    pub magnitude: f32,
    pub phase: f32,
    pub timestamp_us: u64,
}

/// Streaming FFT with Hann window and configurable overlap.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    window_size: usize,
    hop: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<f32>,
}

impl SpectralAnalyzer {
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] when `window_size` is not a power
    /// of two or `overlap` is outside `[0, 1)`.
    pub fn new(sample_rate: u32, window_size: usize, overlap: f32) -> Result<Self> {
        if window_size == 0 || !window_size.is_power_of_two() {
            return Err(DspError::Configuration(format!(
                "window size {window_size} must be a power of two"
            )));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(DspError::Configuration(format!("overlap {overlap} outside [0, 1)")));
        }

        let hop = ((window_size as f32) * (1.0 - overlap)).round().max(1.0) as usize;
        let window = hann(window_size);
        let fft = FftPlanner::new().plan_fft_forward(window_size);
        Ok(Self { sample_rate, window_size, hop, window, fft, buffer: Vec::new() })
    }

    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    pub const fn hop(&self) -> usize {
        self.hop
    }

    /// Feed PCM; returns one spectrum per completed hop.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<FrequencyBin>> {
        self.buffer.extend_from_slice(samples);

        let mut spectra = Vec::new();
        while self.buffer.len() >= self.window_size {
            let block = &self.buffer[..self.window_size];
            spectra.push(self.spectrum(block));
            self.buffer.drain(..self.hop);
        }
        spectra
    }

    /// One-shot spectrum of a block. Blocks shorter than the window are
    /// zero-padded; longer blocks are truncated.
    pub fn spectrum(&self, block: &[f32]) -> Vec<FrequencyBin> {
        let ts = now_us();
        let mut input: Vec<Complex<f32>> = (0..self.window_size)
            .map(|i| {
                let sample = block.get(i).copied().unwrap_or(0.0);
                Complex::new(sample * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut input);

        let bin_width = self.sample_rate as f32 / self.window_size as f32;
        input[..self.window_size / 2]
            .iter()
            .enumerate()
            .map(|(k, c)| FrequencyBin {
                frequency: k as f32 * bin_width,
                magnitude: c.norm(),
                phase: c.arg(),
                timestamp_us: ts,
            })
            .collect()
    }

    /// Mean power across all bins of a block (noise-floor estimate in the
    /// squared domain, no sqrt).
    pub fn mean_bin_power(&self, block: &[f32]) -> f32 {
        let bins = self.spectrum(block);
        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().map(|b| b.magnitude * b.magnitude).sum::<f32>() / bins.len() as f32
    }
}

/// Peak frequencies above `threshold`, strongest first, deduplicated within
/// a 50 Hz neighborhood. At most 10 are returned.
pub fn find_peak_frequencies(bins: &[FrequencyBin], threshold: f32) -> Vec<f32> {
    const DEDUP_HZ: f32 = 50.0;
    const MAX_PEAKS: usize = 10;

    let mut candidates: Vec<&FrequencyBin> =
        bins.iter().filter(|b| b.magnitude > threshold).collect();
    candidates.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));

    let mut peaks: Vec<f32> = Vec::new();
    for bin in candidates {
        if peaks.len() >= MAX_PEAKS {
            break;
        }
        if peaks.iter().all(|&f| (f - bin.frequency).abs() >= DEDUP_HZ) {
            peaks.push(bin.frequency);
        }
    }
    peaks
}

fn hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / size as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}
