// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! 4-FSK modem.
//!
//! Each byte is four 2-bit symbols (MSB first), each symbol one of four
//! tones. A transmission is `preamble ∥ sync ∥ data`: the preamble
//! alternates tones 0 and 2 for ~200 ms so the receiver can lock symbol
//! timing on the transitions, the sync word is a 13-chip Barker-like
//! sequence over tones 0/1, and the payload follows until ten consecutive
//! symbol erasures.
//!
//! Demodulation runs at hop resolution (`hop = S/4`, `S` samples per
//! symbol): every hop position gets a Hann-windowed Goertzel sweep over the
//! four tones plus an FFT noise-floor estimate over the *same* windowed
//! block, so tone magnitudes and the adaptive threshold share one scale.
//! Sync acquisition scans all hop phases; once the sync word matches
//! exactly, payload symbols are read at every fourth hop from the locked
//! phase.

use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::{DspError, Result};

/// 13-chip Barker-like sync word, transmitted over tones 0/1.
pub const SYNC_WORD: [u8; 13] = [1, 1, 1, 1, 1, 0, 0, 1, 1, 0, 1, 0, 1];

/// Consecutive symbol erasures that terminate a frame.
const ERASURE_LIMIT: usize = 10;

/// Trailing silence appended by the modulator so the receiver's erasure
/// counter terminates the frame without external gating.
const GUARD_SYMBOLS: usize = 12;

/// Detection hops per symbol (`hop = S / 4`).
const HOPS_PER_SYMBOL: usize = 4;

/// Minimum preamble symbols that must precede a sync match.
const MIN_PREAMBLE_SYMBOLS: usize = 8;

/// Raised-cosine pulse roll-off.
const PULSE_ROLLOFF: f32 = 0.5;

/// Transmit amplitude.
const TX_AMPLITUDE: f32 = 0.3;

/// Modem parameters. Use one of the presets unless you know the channel.
#[derive(Debug, Clone)]
pub struct ModemConfig {
    pub sample_rate: u32,
    pub symbol_rate: u32,
    pub tones: [f32; 4],
    /// Spectral-analyzer window (power of two).
    pub window_size: usize,
    pub overlap: f32,
    /// Adaptive-threshold multiplier over the RMS bin magnitude (~+6 dB at 2.0).
    pub noise_threshold: f32,
    /// RMS gate below which a chunk is treated as silence.
    pub silence_threshold: f32,
    /// Largest recovered payload, bytes; larger frames are dropped.
    pub max_frame_size: usize,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self::low_latency()
    }
}

impl ModemConfig {
    /// 16 kHz / 125 Bd, tones 1.0-2.5 kHz.
    pub const fn low_latency() -> Self {
        Self {
            sample_rate: 16_000,
            symbol_rate: 125,
            tones: [1000.0, 1500.0, 2000.0, 2500.0],
            window_size: 512,
            overlap: 0.25,
            noise_threshold: 2.0,
            silence_threshold: 1e-3,
            max_frame_size: 1500,
        }
    }

    /// 48 kHz / 500 Bd, tones 1.5-2.7 kHz.
    pub const fn high_quality() -> Self {
        Self {
            sample_rate: 48_000,
            symbol_rate: 500,
            tones: [1500.0, 1900.0, 2300.0, 2700.0],
            window_size: 2048,
            overlap: 0.75,
            noise_threshold: 2.0,
            silence_threshold: 1e-3,
            max_frame_size: 1500,
        }
    }

    /// 44.1 kHz / 100 Bd, tones 1.2-3.0 kHz.
    pub const fn noise_resistant() -> Self {
        Self {
            sample_rate: 44_100,
            symbol_rate: 100,
            tones: [1200.0, 1800.0, 2400.0, 3000.0],
            window_size: 4096,
            overlap: 0.5,
            noise_threshold: 2.0,
            silence_threshold: 1e-3,
            max_frame_size: 1500,
        }
    }

    /// Preset lookup by wire name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "lowLatency" => Some(Self::low_latency()),
            "highQuality" => Some(Self::high_quality()),
            "noiseResistant" => Some(Self::noise_resistant()),
            _ => None,
        }
    }

    /// Samples per symbol.
    pub const fn samples_per_symbol(&self) -> usize {
        (self.sample_rate / self.symbol_rate) as usize
    }

    /// Preamble length: `floor(0.2 * symbol_rate)` symbols (~200 ms).
    pub fn preamble_symbols(&self) -> usize {
        (0.2 * self.symbol_rate as f32).floor() as usize
    }

    fn validate(&self) -> Result<()> {
        if self.symbol_rate == 0 || self.symbol_rate > self.sample_rate {
            return Err(DspError::Configuration(format!(
                "symbol rate {} invalid for sample rate {}",
                self.symbol_rate, self.sample_rate
            )));
        }
        if self.samples_per_symbol() < HOPS_PER_SYMBOL {
            return Err(DspError::Configuration(
                "fewer than 4 samples per symbol".to_string(),
            ));
        }
        if !self.window_size.is_power_of_two() {
            return Err(DspError::Configuration(format!(
                "window size {} must be a power of two",
                self.window_size
            )));
        }
        Ok(())
    }
}

/// Raised-cosine pulse shape, `t` in [-1, 1] across the symbol.
///
/// `|t| = 1` sits on the formula's pole and returns `α·π/4`.
fn raised_cosine(t: f32, alpha: f32) -> f32 {
    if (t.abs() - 1.0).abs() < f32::EPSILON {
        return alpha * PI / 4.0;
    }
    let sinc = if t == 0.0 { 1.0 } else { (PI * t).sin() / (PI * t) };
    let denom = 1.0 - (2.0 * alpha * t).powi(2);
    if denom.abs() < f32::EPSILON {
        return alpha * PI / 4.0;
    }
    sinc * (PI * alpha * t).cos() / denom
}

/// 4-FSK modulator.
pub struct FskModulator {
    config: ModemConfig,
}

impl FskModulator {
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for unusable parameters.
    pub fn new(config: ModemConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Render payload bytes as PCM: preamble, sync word, data symbols and a
    /// trailing guard of silence.
    pub fn modulate(&self, payload: &[u8]) -> Vec<f32> {
        let s = self.config.samples_per_symbol();
        let symbols = self.symbols_for(payload);
        let mut pcm = Vec::with_capacity((symbols.len() + GUARD_SYMBOLS) * s);
        for symbol in symbols {
            self.render_symbol(&mut pcm, symbol);
        }
        pcm.extend(std::iter::repeat(0.0).take(GUARD_SYMBOLS * s));
        pcm
    }

    fn symbols_for(&self, payload: &[u8]) -> Vec<u8> {
        let preamble_len = self.config.preamble_symbols();
        let mut symbols = Vec::with_capacity(preamble_len + SYNC_WORD.len() + payload.len() * 4);
        for i in 0..preamble_len {
            symbols.push(if i % 2 == 0 { 0 } else { 2 });
        }
        symbols.extend_from_slice(&SYNC_WORD);
        for &byte in payload {
            // MSB-first 2-bit groups.
            symbols.push((byte >> 6) & 0b11);
            symbols.push((byte >> 4) & 0b11);
            symbols.push((byte >> 2) & 0b11);
            symbols.push(byte & 0b11);
        }
        symbols
    }

    fn render_symbol(&self, pcm: &mut Vec<f32>, symbol: u8) {
        let s = self.config.samples_per_symbol();
        let tone = self.config.tones[usize::from(symbol & 0b11)];
        let half = (s - 1) as f32 / 2.0;
        for j in 0..s {
            let t = (j as f32 - half) / half;
            let pulse = raised_cosine(t, PULSE_ROLLOFF);
            let sample = (TAU * tone * j as f32 / self.config.sample_rate as f32).sin();
            pcm.push(sample * pulse * TX_AMPLITUDE);
        }
    }
}

/// A payload recovered by the demodulator, before deframing.
#[derive(Debug, Clone)]
pub struct DemodFrame {
    pub bytes: Vec<u8>,
    /// `10·log10(Σ peak power / mean bin power)` averaged over the frame.
    pub snr_db: f32,
    /// Detected symbols over expected symbols in the acquisition window.
    pub lock_pct: f32,
}

enum DemodState {
    Searching,
    Collecting {
        /// Absolute hop index of the first payload symbol.
        data_start: u64,
        collected: Vec<Option<u8>>,
        erasures: usize,
        preamble_matched: usize,
        preamble_total: usize,
        snr_sum: f32,
        snr_count: usize,
    },
}

/// Streaming 4-FSK demodulator.
pub struct FskDemodulator {
    config: ModemConfig,
    samples_per_symbol: usize,
    hop: usize,
    win: usize,
    goertzel_window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    nfft: usize,

    // Channel conditioning state.
    prev_raw: f32,
    ma_hist: VecDeque<f32>,

    // Filtered samples, absolute position `buf_offset + i`.
    buf: Vec<f32>,
    buf_offset: u64,
    next_hop: u64,

    // Per-hop detections, absolute index `hops_base + i`.
    hops: Vec<Option<u8>>,
    hop_snrs: Vec<f32>,
    hops_base: u64,

    state: DemodState,

    // Advisory symbol-clock drift, accumulated phase error in symbols.
    symbol_clock: f32,
    last_detected_hop: Option<u64>,
}

impl FskDemodulator {
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for unusable parameters.
    pub fn new(config: ModemConfig) -> Result<Self> {
        config.validate()?;
        let samples_per_symbol = config.samples_per_symbol();
        let hop = (samples_per_symbol / HOPS_PER_SYMBOL).max(1);
        // Goertzel analysis block: one symbol, capped at 1024 samples.
        let win = samples_per_symbol.min(1024);
        let nfft = win.next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(nfft);
        Ok(Self {
            config,
            samples_per_symbol,
            hop,
            win,
            goertzel_window: hann(win),
            fft,
            nfft,
            prev_raw: 0.0,
            ma_hist: VecDeque::with_capacity(5),
            buf: Vec::new(),
            buf_offset: 0,
            next_hop: 0,
            hops: Vec::new(),
            hop_snrs: Vec::new(),
            hops_base: 0,
            state: DemodState::Searching,
            symbol_clock: 0.0,
            last_detected_hop: None,
        })
    }

    pub const fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Accumulated symbol-clock drift (advisory; not used for resampling).
    pub const fn symbol_clock(&self) -> f32 {
        self.symbol_clock
    }

    /// Feed PCM; returns any payloads whose final symbol arrived in this
    /// chunk.
    pub fn push(&mut self, pcm: &[f32]) -> Vec<DemodFrame> {
        self.condition(pcm);
        self.detect_available_hops();
        self.drain_consumed_samples();
        self.run_state_machine()
    }

    /// Finalize any in-flight frame (end of stream or silence gate).
    pub fn flush(&mut self) -> Vec<DemodFrame> {
        let mut frames = self.run_state_machine();
        if let DemodState::Collecting {
            collected,
            preamble_matched,
            preamble_total,
            snr_sum,
            snr_count,
            ..
        } = std::mem::replace(&mut self.state, DemodState::Searching)
        {
            if let Some(frame) =
                self.finalize(collected, preamble_matched, preamble_total, snr_sum, snr_count)
            {
                frames.push(frame);
            }
        }
        self.hops.clear();
        self.hop_snrs.clear();
        self.hops_base = self.next_hop;
        frames
    }

    /// Pre-emphasis followed by a 5-tap moving average: together a crude
    /// bandpass centered on the tone band.
    fn condition(&mut self, pcm: &[f32]) {
        self.buf.reserve(pcm.len());
        for &raw in pcm {
            let emphasized = raw - 0.95 * self.prev_raw;
            self.prev_raw = raw;

            self.ma_hist.push_back(emphasized);
            if self.ma_hist.len() > 5 {
                self.ma_hist.pop_front();
            }
            let filtered = self.ma_hist.iter().sum::<f32>() / self.ma_hist.len() as f32;
            self.buf.push(filtered);
        }
    }

    fn detect_available_hops(&mut self) {
        loop {
            let start = self.next_hop * self.hop as u64;
            let end = start + self.win as u64;
            if end > self.buf_offset + self.buf.len() as u64 {
                break;
            }
            let rel = (start - self.buf_offset) as usize;
            let (detection, snr) = self.detect_block_at(rel);

            if detection.is_some() {
                if let Some(last) = self.last_detected_hop {
                    let delta_hops = (self.next_hop - last) as f32;
                    // Phase error relative to the nominal one-symbol spacing.
                    let error = (delta_hops - HOPS_PER_SYMBOL as f32) / HOPS_PER_SYMBOL as f32;
                    if error.abs() < 1.0 {
                        self.symbol_clock += error;
                    }
                }
                self.last_detected_hop = Some(self.next_hop);
            }

            self.hops.push(detection);
            self.hop_snrs.push(snr);
            self.next_hop += 1;
        }
    }

    fn detect_block_at(&self, rel: usize) -> (Option<u8>, f32) {
        let block = &self.buf[rel..rel + self.win];

        let mut windowed = vec![0.0f32; self.win];
        for (i, (&sample, &w)) in block.iter().zip(&self.goertzel_window).enumerate() {
            windowed[i] = sample * w;
        }

        let mut magnitudes = [0.0f32; 4];
        for (slot, &tone) in self.config.tones.iter().enumerate() {
            magnitudes[slot] = goertzel_magnitude(&windowed, tone, self.config.sample_rate as f32);
        }

        let mean_power = self.mean_bin_power(&windowed);
        let threshold = self.config.noise_threshold * mean_power.sqrt();

        let (best, best_mag) = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &m)| (i, m))
            .unwrap_or((0, 0.0));

        if best_mag <= threshold || mean_power <= f32::EPSILON {
            return (None, 0.0);
        }

        let signal_power: f32 =
            magnitudes.iter().filter(|&&m| m > threshold).map(|&m| m * m).sum();
        let snr_db = 10.0 * (signal_power / mean_power.max(f32::MIN_POSITIVE)).log10();
        (Some(best as u8), snr_db)
    }

    /// Mean power across the FFT bins of the (already windowed) block.
    fn mean_bin_power(&self, windowed: &[f32]) -> f32 {
        let mut input: Vec<Complex<f32>> = (0..self.nfft)
            .map(|i| Complex::new(windowed.get(i).copied().unwrap_or(0.0), 0.0))
            .collect();
        self.fft.process(&mut input);
        let bins = self.nfft / 2;
        input[..bins].iter().map(|c| c.norm_sqr()).sum::<f32>() / bins as f32
    }

    fn drain_consumed_samples(&mut self) {
        let keep_from = self.next_hop * self.hop as u64;
        if keep_from > self.buf_offset {
            let drop = ((keep_from - self.buf_offset) as usize).min(self.buf.len());
            self.buf.drain(..drop);
            self.buf_offset += drop as u64;
        }
    }

    fn run_state_machine(&mut self) -> Vec<DemodFrame> {
        let mut frames = Vec::new();
        loop {
            match std::mem::replace(&mut self.state, DemodState::Searching) {
                DemodState::Searching => {
                    let Some((data_start_rel, matched, total)) = self.scan_for_sync() else {
                        self.trim_search_history();
                        break;
                    };
                    self.state = DemodState::Collecting {
                        data_start: self.hops_base + data_start_rel as u64,
                        collected: Vec::new(),
                        erasures: 0,
                        preamble_matched: matched,
                        preamble_total: total,
                        snr_sum: 0.0,
                        snr_count: 0,
                    };
                }
                DemodState::Collecting {
                    data_start,
                    mut collected,
                    mut erasures,
                    preamble_matched,
                    preamble_total,
                    mut snr_sum,
                    mut snr_count,
                } => {
                    let mut done = false;
                    loop {
                        let abs = data_start + (collected.len() * HOPS_PER_SYMBOL) as u64;
                        let Some(rel) = abs
                            .checked_sub(self.hops_base)
                            .map(|r| r as usize)
                            .filter(|&r| r < self.hops.len())
                        else {
                            break;
                        };
                        match self.hops[rel] {
                            Some(symbol) => {
                                erasures = 0;
                                snr_sum += self.hop_snrs[rel];
                                snr_count += 1;
                                collected.push(Some(symbol));
                            }
                            None => {
                                erasures += 1;
                                collected.push(None);
                                if erasures >= ERASURE_LIMIT {
                                    done = true;
                                    break;
                                }
                            }
                        }
                        // Runaway guard: drop frames that overrun the payload
                        // budget without terminating.
                        if collected.len() > (self.config.max_frame_size + 8) * 4 {
                            done = true;
                            break;
                        }
                    }

                    if done {
                        let consumed = data_start + (collected.len() * HOPS_PER_SYMBOL) as u64;
                        if let Some(frame) = self.finalize(
                            collected,
                            preamble_matched,
                            preamble_total,
                            snr_sum,
                            snr_count,
                        ) {
                            frames.push(frame);
                        }
                        self.consume_hops_through(consumed);
                    } else {
                        // Waiting on more audio; park the partial frame.
                        self.state = DemodState::Collecting {
                            data_start,
                            collected,
                            erasures,
                            preamble_matched,
                            preamble_total,
                            snr_sum,
                            snr_count,
                        };
                        break;
                    }
                }
            }
        }
        frames
    }

    /// Exact sync-word match at any hop phase, gated by a preamble score of
    /// at least 80% tones 0/2 over the preceding symbols.
    fn scan_for_sync(&self) -> Option<(usize, usize, usize)> {
        let span = SYNC_WORD.len() * HOPS_PER_SYMBOL;
        let n = self.hops.len();
        if n < span {
            return None;
        }

        'outer: for start in 0..=(n - span) {
            for (k, &chip) in SYNC_WORD.iter().enumerate() {
                if self.hops[start + k * HOPS_PER_SYMBOL] != Some(chip) {
                    continue 'outer;
                }
            }

            let mut matched = 0usize;
            let mut total = 0usize;
            for j in 1..=self.config.preamble_symbols() {
                let Some(idx) = start.checked_sub(j * HOPS_PER_SYMBOL) else { break };
                total += 1;
                if matches!(self.hops[idx], Some(0 | 2)) {
                    matched += 1;
                }
            }

            if total >= MIN_PREAMBLE_SYMBOLS && matched as f32 >= 0.8 * total as f32 {
                return Some((start + span, matched, total));
            }
        }
        None
    }

    fn trim_search_history(&mut self) {
        let keep = (self.config.preamble_symbols() + 20) * HOPS_PER_SYMBOL;
        if self.hops.len() > keep {
            let drop = self.hops.len() - keep;
            self.hops.drain(..drop);
            self.hop_snrs.drain(..drop);
            self.hops_base += drop as u64;
        }
    }

    fn consume_hops_through(&mut self, abs: u64) {
        if abs > self.hops_base {
            let drop = ((abs - self.hops_base) as usize).min(self.hops.len());
            self.hops.drain(..drop);
            self.hop_snrs.drain(..drop);
            self.hops_base += drop as u64;
        }
    }

    fn finalize(
        &self,
        mut collected: Vec<Option<u8>>,
        preamble_matched: usize,
        preamble_total: usize,
        snr_sum: f32,
        snr_count: usize,
    ) -> Option<DemodFrame> {
        // Drop the trailing erasure run.
        while collected.last() == Some(&None) {
            collected.pop();
        }
        if collected.is_empty() {
            return None;
        }

        let detected = collected.iter().filter(|d| d.is_some()).count();
        // Mid-frame erasures become tone 0; the frame CRC arbitrates.
        let symbols: Vec<u8> = collected.iter().map(|d| d.unwrap_or(0)).collect();

        let full_bytes = symbols.len() / 4;
        if full_bytes == 0 {
            return None;
        }
        if full_bytes > self.config.max_frame_size {
            tracing::debug!(bytes = full_bytes, "dropping oversize acoustic frame");
            return None;
        }

        let mut bytes = Vec::with_capacity(full_bytes);
        for group in symbols.chunks_exact(4) {
            bytes.push(group[0] << 6 | group[1] << 4 | group[2] << 2 | group[3]);
        }

        let expected = preamble_total + SYNC_WORD.len() + collected.len();
        let got = preamble_matched + SYNC_WORD.len() + detected;
        let lock_pct = (got as f32 / expected.max(1) as f32).clamp(0.0, 1.0);

        let snr_db = if snr_count == 0 { 0.0 } else { snr_sum / snr_count as f32 };

        Some(DemodFrame { bytes, snr_db, lock_pct })
    }
}

/// Goertzel magnitude of one tone over an already windowed block.
fn goertzel_magnitude(windowed: &[f32], tone: f32, sample_rate: f32) -> f32 {
    let omega = TAU * tone / sample_rate;
    let coeff = 2.0 * omega.cos();
    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;
    for &sample in windowed {
        let s = sample + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    (s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2).max(0.0).sqrt()
}

fn hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = TAU * i as f32 / size as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn loopback(config: ModemConfig, payload: &[u8]) -> Vec<DemodFrame> {
        let pcm = FskModulator::new(config.clone()).unwrap().modulate(payload);
        let mut demod = FskDemodulator::new(config).unwrap();
        let mut frames = Vec::new();
        for chunk in pcm.chunks(1024) {
            frames.extend(demod.push(chunk));
        }
        frames.extend(demod.flush());
        frames
    }

    #[test]
    fn test_symbol_mapping_msb_first() {
        let modulator = FskModulator::new(ModemConfig::low_latency()).unwrap();
        let symbols = modulator.symbols_for(&[0b1110_0100]);
        let data = &symbols[symbols.len() - 4..];
        assert_eq!(data, &[3, 2, 1, 0]);
    }

    #[test]
    fn test_preamble_alternates() {
        let modulator = FskModulator::new(ModemConfig::low_latency()).unwrap();
        let symbols = modulator.symbols_for(&[]);
        let preamble = &symbols[..25];
        for (i, &s) in preamble.iter().enumerate() {
            assert_eq!(s, if i % 2 == 0 { 0 } else { 2 });
        }
        assert_eq!(&symbols[25..38], &SYNC_WORD);
    }

    #[test]
    fn test_modulated_length_and_amplitude() {
        let config = ModemConfig::low_latency();
        let s = config.samples_per_symbol();
        let pcm = FskModulator::new(config).unwrap().modulate(b"hi");
        // 25 preamble + 13 sync + 8 data + 12 guard symbols.
        assert_eq!(pcm.len(), (25 + 13 + 8 + 12) * s);
        let peak = pcm.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak <= TX_AMPLITUDE + 1e-3);
        assert!(peak > 0.1);
    }

    #[test]
    fn test_raised_cosine_edges() {
        assert!((raised_cosine(0.0, 0.5) - 1.0).abs() < 1e-6);
        assert!((raised_cosine(1.0, 0.5) - 0.5 * PI / 4.0).abs() < 1e-6);
        assert!((raised_cosine(-1.0, 0.5) - 0.5 * PI / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_goertzel_picks_the_right_tone() {
        let config = ModemConfig::low_latency();
        let fs = config.sample_rate as f32;
        let window = hann(128);
        for (slot, &tone) in config.tones.iter().enumerate() {
            let block: Vec<f32> = (0..128)
                .map(|i| (TAU * tone * i as f32 / fs).sin() * 0.3 * window[i])
                .collect();
            let mags: Vec<f32> = config
                .tones
                .iter()
                .map(|&t| goertzel_magnitude(&block, t, fs))
                .collect();
            let best = mags
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(best, slot, "tone {tone} Hz detected as slot {best}");
        }
    }

    #[test]
    fn test_clean_loopback_low_latency() {
        let frames = loopback(ModemConfig::low_latency(), b"Hello");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"Hello");
        assert!(frames[0].lock_pct > 0.9, "lock {}", frames[0].lock_pct);
        assert!(frames[0].snr_db >= 10.0, "snr {}", frames[0].snr_db);
    }

    #[test]
    fn test_clean_loopback_noise_resistant() {
        let frames = loopback(ModemConfig::noise_resistant(), &[0x00, 0xFF, 0xA5, 0x5A]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, vec![0x00, 0xFF, 0xA5, 0x5A]);
    }

    #[test]
    fn test_clean_loopback_high_quality() {
        let payload: Vec<u8> = (0..32).collect();
        let frames = loopback(ModemConfig::high_quality(), &payload);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, payload);
    }

    #[test]
    fn test_loopback_survives_awgn() {
        // ~16 dB SNR relative to the shaped carrier.
        let config = ModemConfig::low_latency();
        let mut pcm = FskModulator::new(config.clone()).unwrap().modulate(b"Hello");
        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0f32, 0.02).unwrap();
        for sample in &mut pcm {
            *sample += noise.sample(&mut rng);
        }

        let mut demod = FskDemodulator::new(config).unwrap();
        let mut frames = Vec::new();
        for chunk in pcm.chunks(512) {
            frames.extend(demod.push(chunk));
        }
        frames.extend(demod.flush());

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"Hello");
        assert!(frames[0].snr_db >= 10.0, "snr {}", frames[0].snr_db);
    }

    #[test]
    fn test_loopback_with_leading_silence_offset() {
        // An arbitrary non-hop-aligned amount of leading silence shifts the
        // signal; phase search must still lock.
        let config = ModemConfig::low_latency();
        let signal = FskModulator::new(config.clone()).unwrap().modulate(b"x");
        let mut pcm = vec![0.0f32; 777];
        pcm.extend(signal);

        let mut demod = FskDemodulator::new(config).unwrap();
        let mut frames = Vec::new();
        for chunk in pcm.chunks(333) {
            frames.extend(demod.push(chunk));
        }
        frames.extend(demod.flush());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"x");
    }

    #[test]
    fn test_silence_detects_nothing() {
        let mut demod = FskDemodulator::new(ModemConfig::low_latency()).unwrap();
        let frames = demod.push(&vec![0.0; 16_000]);
        assert!(frames.is_empty());
        assert!(demod.flush().is_empty());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let config = ModemConfig::low_latency();
        let modulator = FskModulator::new(config.clone()).unwrap();
        let mut pcm = modulator.modulate(b"one");
        pcm.extend(modulator.modulate(b"two"));

        let mut demod = FskDemodulator::new(config).unwrap();
        let mut frames = Vec::new();
        for chunk in pcm.chunks(2048) {
            frames.extend(demod.push(chunk));
        }
        frames.extend(demod.flush());

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].bytes, b"one");
        assert_eq!(frames[1].bytes, b"two");
    }

    #[test]
    fn test_preset_lookup() {
        assert!(ModemConfig::preset("lowLatency").is_some());
        assert!(ModemConfig::preset("highQuality").is_some());
        assert!(ModemConfig::preset("noiseResistant").is_some());
        assert!(ModemConfig::preset("ultra").is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ModemConfig::low_latency();
        config.symbol_rate = 0;
        assert!(FskDemodulator::new(config).is_err());

        let mut config = ModemConfig::low_latency();
        config.window_size = 500;
        assert!(FskModulator::new(config).is_err());
    }
}
