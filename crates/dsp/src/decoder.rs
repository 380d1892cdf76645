// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Ring-buffered streaming audio decode.
//!
//! [`AudioDecoder`] owns a demodulator, gates chunks on RMS silence (silent
//! chunks skip the FFT entirely and instead finalize any in-flight frame),
//! deframes recovered bytestreams and emits [`DecoderEvent`]s on a broadcast
//! channel. The acoustic link is lossy: deframe/CRC failures are counted in
//! [`AudioStats`], never retried.

use serde::Serialize;
use tokio::sync::broadcast;

use gibberlink_core::framer::{Framer, CHUNK_HEADER_SIZE, CRC_SIZE, HEADER_SIZE, MAGIC, MSG_ID_SIZE, VERSION};
use gibberlink_core::types::{now_us, MsgId, PipelineFrame};

use crate::error::Result;
use crate::modem::{FskDemodulator, ModemConfig};

/// Stats event cadence, in chunks.
const STATS_EVERY_CHUNKS: u64 = 50;

/// Event channel capacity; slow subscribers lag rather than block decode.
const EVENT_CAPACITY: usize = 64;

/// Running decoder statistics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStats {
    pub total_chunks: u64,
    pub total_frames: u64,
    pub average_snr: f32,
    /// Deframe/CRC failures over all recovered bytestreams.
    pub error_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_time_us: Option<u64>,
}

/// Streaming decoder events.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    Started,
    Frame(PipelineFrame),
    Error(String),
    Stats(AudioStats),
    Stopped,
}

/// Streaming PCM → [`PipelineFrame`] decoder.
pub struct AudioDecoder {
    demod: FskDemodulator,
    framer: Framer,
    event_tx: broadcast::Sender<DecoderEvent>,
    running: bool,

    total_chunks: u64,
    frames_emitted: u64,
    deframe_failures: u64,
    snr_sum: f64,
    snr_count: u64,
    last_frame_time_us: Option<u64>,
}

impl AudioDecoder {
    /// # Errors
    ///
    /// Returns [`crate::DspError::Configuration`] for unusable modem
    /// parameters.
    pub fn new(config: ModemConfig) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            demod: FskDemodulator::new(config)?,
            framer: Framer,
            event_tx,
            running: false,
            total_chunks: 0,
            frames_emitted: 0,
            deframe_failures: 0,
            snr_sum: 0.0,
            snr_count: 0,
            last_frame_time_us: None,
        })
    }

    /// Subscribe to decoder events. Slow subscribers lag; decode never
    /// blocks on them.
    pub fn subscribe(&self) -> broadcast::Receiver<DecoderEvent> {
        self.event_tx.subscribe()
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            let _ = self.event_tx.send(DecoderEvent::Started);
        }
    }

    /// Stop and finalize. Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for frame in self.drain_demod_flush() {
            let _ = self.event_tx.send(DecoderEvent::Frame(frame));
        }
        self.running = false;
        let _ = self.event_tx.send(DecoderEvent::Stats(self.stats()));
        let _ = self.event_tx.send(DecoderEvent::Stopped);
    }

    /// Feed one PCM chunk; returns frames completed by this chunk and emits
    /// the matching events.
    pub fn decode_chunk(&mut self, pcm: &[f32]) -> Vec<PipelineFrame> {
        self.start();
        self.total_chunks += 1;

        let rms = if pcm.is_empty() {
            0.0
        } else {
            (pcm.iter().map(|s| s * s).sum::<f32>() / pcm.len() as f32).sqrt()
        };

        // Silence skips the FFT entirely and acts as an end-of-frame gate.
        let demod_frames = if rms < self.demod.config().silence_threshold {
            self.demod.flush()
        } else {
            self.demod.push(pcm)
        };

        let mut out = Vec::new();
        for demod_frame in demod_frames {
            self.snr_sum += f64::from(demod_frame.snr_db);
            self.snr_count += 1;

            match self.framer.deframe(&demod_frame.bytes) {
                Some(frame) => {
                    let pipeline_frame = PipelineFrame {
                        msg_id: frame.msg_id,
                        payload: frame.payload,
                        timestamp_us: now_us(),
                        snr_db: demod_frame.snr_db,
                        lock_pct: demod_frame.lock_pct,
                        crc_valid: true,
                        chunk_index: frame.chunk.map(|c| c.index),
                        total_chunks: frame.chunk.map(|c| c.total),
                    };
                    self.frames_emitted += 1;
                    self.last_frame_time_us = Some(pipeline_frame.timestamp_us);
                    let _ = self.event_tx.send(DecoderEvent::Frame(pipeline_frame.clone()));
                    out.push(pipeline_frame);
                }
                None => {
                    self.deframe_failures += 1;
                    if let Some(pipeline_frame) = lenient_frame(&demod_frame.bytes, demod_frame.snr_db, demod_frame.lock_pct) {
                        // Frame-shaped but CRC-invalid: surface it so the
                        // pipeline can count the CRC failure by msgId.
                        let _ = self.event_tx.send(DecoderEvent::Frame(pipeline_frame.clone()));
                        out.push(pipeline_frame);
                    } else {
                        let _ = self.event_tx.send(DecoderEvent::Error(format!(
                            "undecodable bytestream of {} bytes",
                            demod_frame.bytes.len()
                        )));
                    }
                }
            }
        }

        if self.total_chunks % STATS_EVERY_CHUNKS == 0 {
            let _ = self.event_tx.send(DecoderEvent::Stats(self.stats()));
        }
        out
    }

    pub fn stats(&self) -> AudioStats {
        let attempts = self.frames_emitted + self.deframe_failures;
        AudioStats {
            total_chunks: self.total_chunks,
            total_frames: self.frames_emitted,
            average_snr: if self.snr_count == 0 {
                0.0
            } else {
                (self.snr_sum / self.snr_count as f64) as f32
            },
            error_rate: if attempts == 0 {
                0.0
            } else {
                self.deframe_failures as f32 / attempts as f32
            },
            last_frame_time_us: self.last_frame_time_us,
        }
    }

    fn drain_demod_flush(&mut self) -> Vec<PipelineFrame> {
        let mut frames = Vec::new();
        for demod_frame in self.demod.flush() {
            if let Some(frame) = self.framer.deframe(&demod_frame.bytes) {
                self.frames_emitted += 1;
                frames.push(PipelineFrame {
                    msg_id: frame.msg_id,
                    payload: frame.payload,
                    timestamp_us: now_us(),
                    snr_db: demod_frame.snr_db,
                    lock_pct: demod_frame.lock_pct,
                    crc_valid: true,
                    chunk_index: frame.chunk.map(|c| c.index),
                    total_chunks: frame.chunk.map(|c| c.total),
                });
            }
        }
        frames
    }
}

/// Best-effort parse of a frame-shaped buffer that failed CRC, so the
/// failure can be attributed to a msgId downstream.
fn lenient_frame(bytes: &[u8], snr_db: f32, lock_pct: f32) -> Option<PipelineFrame> {
    if bytes.len() < HEADER_SIZE + MSG_ID_SIZE + CRC_SIZE {
        return None;
    }
    let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != MAGIC || bytes[4] != VERSION {
        return None;
    }
    let length = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
    let available = bytes.len() - HEADER_SIZE - MSG_ID_SIZE - CRC_SIZE;
    if length > available + CHUNK_HEADER_SIZE {
        return None;
    }
    let msg_id = MsgId::from_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
    let payload = bytes[HEADER_SIZE + MSG_ID_SIZE..HEADER_SIZE + MSG_ID_SIZE + length.min(available)]
        .to_vec();
    Some(PipelineFrame {
        msg_id,
        payload,
        timestamp_us: now_us(),
        snr_db,
        lock_pct,
        crc_valid: false,
        chunk_index: None,
        total_chunks: None,
    })
}
