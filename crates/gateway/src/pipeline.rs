// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Audio → decode → translate pipeline.
//!
//! One pipeline serves one session: a single producer pushes PCM chunks and
//! a single worker runs demodulation, protocol decode and englishization
//! sequentially, so events leave in arrival order and multipart reassembly
//! is deterministic. CRC-invalid frames abort before any buffering; a
//! multipart group only produces output once every part has arrived with a
//! valid CRC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use gibberlink_core::processor::ProtocolProcessor;
use gibberlink_core::types::{now_us, MsgId, PipelineFrame, Protocol};
use gibberlink_dsp::decoder::AudioDecoder;
use gibberlink_dsp::modem::ModemConfig;
use gibberlink_englishizer::{Englishizer, EventMeta, GatewayEvent};

use crate::error::{GatewayError, Result};

/// Multipart groups older than this are dropped silently (counted in
/// metrics), mirroring the reassembler timeout.
const MULTIPART_TIMEOUT: Duration = Duration::from_secs(30);

/// Event channel capacity; slow subscribers lag rather than stall decode.
const EVENT_CAPACITY: usize = 128;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub modem: ModemConfig,
    /// Latency threshold for [`PipelineEvent::LatencyWarning`].
    pub max_latency_ms: u64,
    pub session_id: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { modem: ModemConfig::default(), max_latency_ms: 300, session_id: None }
    }
}

/// A fully translated message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainEnglish {
    pub msg_id: MsgId,
    pub text: String,
    pub confidence: f32,
    /// SNR averaged across the message's frames.
    pub snr_db: f32,
    /// Lock percentage averaged across the message's frames.
    pub lock_pct: f32,
    pub started_us: u64,
    pub finished_us: u64,
    pub latency_ms: u64,
}

/// Running pipeline metrics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub frames: u64,
    pub messages: u64,
    pub crc_failures: u64,
    pub decode_errors: u64,
    pub expired_multiparts: u64,
    pub average_snr: f32,
    pub average_latency_ms: f32,
}

/// Streaming pipeline events.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PlainEnglish(PlainEnglish),
    DecodeError { msg_id: MsgId, error: String },
    LatencyWarning { msg_id: MsgId, latency_ms: u64 },
    Metrics(PipelineMetrics),
}

struct Multipart {
    parts: HashMap<u8, Vec<u8>>,
    total: u8,
    started_us: u64,
    first_seen: Instant,
    snr_sum: f32,
    lock_sum: f32,
    frames: u32,
}

/// The per-session audio pipeline worker state.
pub struct AudioPipeline {
    decoder: AudioDecoder,
    processor: Arc<ProtocolProcessor>,
    englishizer: Arc<Englishizer>,
    config: PipelineConfig,
    multipart: HashMap<MsgId, Multipart>,
    event_tx: broadcast::Sender<PipelineEvent>,
    destroyed: bool,

    // Metric accumulators.
    frames: u64,
    messages: u64,
    crc_failures: u64,
    decode_errors: u64,
    expired_multiparts: u64,
    snr_sum: f64,
    snr_count: u64,
    latency_sum_ms: f64,
}

impl AudioPipeline {
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] for unusable modem
    /// parameters.
    pub fn new(
        config: PipelineConfig,
        processor: Arc<ProtocolProcessor>,
        englishizer: Arc<Englishizer>,
    ) -> Result<Self> {
        let decoder = AudioDecoder::new(config.modem.clone())
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            decoder,
            processor,
            englishizer,
            config,
            multipart: HashMap::new(),
            event_tx,
            destroyed: false,
            frames: 0,
            messages: 0,
            crc_failures: 0,
            decode_errors: 0,
            expired_multiparts: 0,
            snr_sum: 0.0,
            snr_count: 0,
            latency_sum_ms: 0.0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    /// Feed one PCM chunk through demod → decode → englishize. Events are
    /// both returned and broadcast to subscribers.
    pub async fn process_chunk(&mut self, pcm: &[f32]) -> Vec<PipelineEvent> {
        if self.destroyed {
            return Vec::new();
        }
        let frames = self.decoder.decode_chunk(pcm);
        let mut events = Vec::new();
        for frame in frames {
            events.extend(self.handle_frame(frame).await);
        }
        events
    }

    /// Handle one recovered frame (also the entry point for `audio.frame`
    /// WebSocket messages carrying pre-demodulated frames).
    pub async fn handle_frame(&mut self, frame: PipelineFrame) -> Vec<PipelineEvent> {
        if self.destroyed {
            return Vec::new();
        }

        self.frames += 1;
        self.snr_sum += f64::from(frame.snr_db);
        self.snr_count += 1;

        if !frame.crc_valid {
            self.crc_failures += 1;
            tracing::debug!(msg_id = %frame.msg_id, "dropping CRC-invalid acoustic frame");
            return Vec::new();
        }

        self.expire_stale_multiparts();

        let Some((payload, started_us, snr_db, lock_pct)) = self.accept_part(&frame) else {
            return Vec::new();
        };

        let mut events = Vec::new();

        let Some(value) = self.processor.decode_payload(&payload) else {
            self.decode_errors += 1;
            let event = PipelineEvent::DecodeError {
                msg_id: frame.msg_id,
                error: format!("undecodable payload of {} bytes", payload.len()),
            };
            self.emit(&mut events, event);
            return events;
        };

        let gateway_event = GatewayEvent {
            kind: None,
            payload: value,
            meta: EventMeta {
                msg_id: frame.msg_id,
                transport: Protocol::Audio,
                codec: self.processor.codec_name().to_string(),
                timestamp_us: started_us,
                session_id: self.config.session_id.clone(),
            },
        };
        let englishized = self.englishizer.englishize(&gateway_event).await;

        let finished_us = now_us();
        let latency_ms = finished_us.saturating_sub(started_us) / 1000;

        self.messages += 1;
        self.latency_sum_ms += latency_ms as f64;

        self.emit(
            &mut events,
            PipelineEvent::PlainEnglish(PlainEnglish {
                msg_id: frame.msg_id,
                text: englishized.text,
                confidence: englishized.confidence,
                snr_db,
                lock_pct,
                started_us,
                finished_us,
                latency_ms,
            }),
        );

        if latency_ms > self.config.max_latency_ms {
            self.emit(
                &mut events,
                PipelineEvent::LatencyWarning { msg_id: frame.msg_id, latency_ms },
            );
        }

        let metrics = self.metrics();
        self.emit(&mut events, PipelineEvent::Metrics(metrics));
        events
    }

    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            frames: self.frames,
            messages: self.messages,
            crc_failures: self.crc_failures,
            decode_errors: self.decode_errors,
            expired_multiparts: self.expired_multiparts,
            average_snr: if self.snr_count == 0 {
                0.0
            } else {
                (self.snr_sum / self.snr_count as f64) as f32
            },
            average_latency_ms: if self.messages == 0 {
                0.0
            } else {
                (self.latency_sum_ms / self.messages as f64) as f32
            },
        }
    }

    /// Stop decoding and release buffered multipart entries. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.decoder.stop();
        self.multipart.clear();
        tracing::debug!(session_id = ?self.config.session_id, "audio pipeline destroyed");
    }

    /// Move this pipeline onto its own worker task; the handle is the
    /// producer side.
    pub fn spawn(self) -> PipelineHandle {
        let cancel = CancellationToken::new();
        let events = self.event_tx.clone();
        let (input_tx, mut input_rx) = mpsc::channel::<PipelineInput>(64);

        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let mut pipeline = self;
            loop {
                tokio::select! {
                    () = worker_cancel.cancelled() => break,
                    input = input_rx.recv() => {
                        match input {
                            Some(input) => { pipeline.accept(input).await; }
                            None => break,
                        }
                    }
                }
            }
            // Drain whatever the producer already queued, then tear down.
            while let Ok(input) = input_rx.try_recv() {
                pipeline.accept(input).await;
            }
            pipeline.destroy();
        });

        PipelineHandle { input_tx, events, cancel, join: Mutex::new(Some(join)) }
    }

    async fn accept(&mut self, input: PipelineInput) {
        match input {
            PipelineInput::Pcm(pcm) => {
                self.process_chunk(&pcm).await;
            }
            PipelineInput::Frame(frame) => {
                self.handle_frame(frame).await;
            }
        }
    }
}

/// Worker input: raw PCM for the server-side modem, or a frame demodulated
/// elsewhere (e.g. in a browser).
enum PipelineInput {
    Pcm(Vec<f32>),
    Frame(PipelineFrame),
}

impl AudioPipeline {
    fn emit(&self, out: &mut Vec<PipelineEvent>, event: PipelineEvent) {
        let _ = self.event_tx.send(event.clone());
        out.push(event);
    }

    fn expire_stale_multiparts(&mut self) {
        let before = self.multipart.len();
        self.multipart.retain(|_, entry| entry.first_seen.elapsed() < MULTIPART_TIMEOUT);
        self.expired_multiparts += (before - self.multipart.len()) as u64;
    }

    /// Buffer a part; returns the complete payload with averaged PHY
    /// metadata once all parts are in.
    fn accept_part(&mut self, frame: &PipelineFrame) -> Option<(Vec<u8>, u64, f32, f32)> {
        let (Some(index), Some(total)) = (frame.chunk_index, frame.total_chunks) else {
            return Some((frame.payload.clone(), frame.timestamp_us, frame.snr_db, frame.lock_pct));
        };
        if total == 0 || index >= total {
            return None;
        }

        let entry = self.multipart.entry(frame.msg_id).or_insert_with(|| Multipart {
            parts: HashMap::new(),
            total,
            started_us: frame.timestamp_us,
            first_seen: Instant::now(),
            snr_sum: 0.0,
            lock_sum: 0.0,
            frames: 0,
        });
        entry.parts.insert(index, frame.payload.clone());
        entry.snr_sum += frame.snr_db;
        entry.lock_sum += frame.lock_pct;
        entry.frames += 1;

        if entry.parts.len() < usize::from(entry.total) {
            return None;
        }

        let mut entry = self.multipart.remove(&frame.msg_id)?;
        let mut payload = Vec::new();
        for i in 0..entry.total {
            payload.extend_from_slice(&entry.parts.remove(&i)?);
        }
        let n = entry.frames.max(1) as f32;
        Some((payload, entry.started_us, entry.snr_sum / n, entry.lock_sum / n))
    }
}

/// Producer-side handle to a spawned pipeline worker.
pub struct PipelineHandle {
    input_tx: mpsc::Sender<PipelineInput>,
    events: broadcast::Sender<PipelineEvent>,
    cancel: CancellationToken,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PipelineHandle {
    /// Push one PCM chunk; applies backpressure when the worker is behind.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Session`] when the worker is gone.
    pub async fn push_pcm(&self, pcm: Vec<f32>) -> Result<()> {
        self.input_tx
            .send(PipelineInput::Pcm(pcm))
            .await
            .map_err(|_| GatewayError::Session("audio pipeline worker stopped".to_string()))
    }

    /// Push a frame demodulated outside the server-side modem.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Session`] when the worker is gone.
    pub async fn push_frame(&self, frame: PipelineFrame) -> Result<()> {
        self.input_tx
            .send(PipelineInput::Frame(frame))
            .await
            .map_err(|_| GatewayError::Session("audio pipeline worker stopped".to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Stop the worker: halt the producer, drain queued chunks, release
    /// buffers. Idempotent.
    pub async fn destroy(&self) {
        self.cancel.cancel();
        let handle = self.join.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gibberlink_core::codec::JsonCodec;
    use gibberlink_core::framer::{FrameOptions, Framer};
    use gibberlink_core::Value;
    use gibberlink_dsp::modem::FskModulator;

    fn pipeline() -> AudioPipeline {
        AudioPipeline::new(
            PipelineConfig { session_id: Some("s-1".to_string()), ..PipelineConfig::default() },
            Arc::new(ProtocolProcessor::new(Box::new(JsonCodec), None)),
            Arc::new(Englishizer::default()),
        )
        .unwrap()
    }

    fn frame(msg_id: MsgId, payload: Vec<u8>, chunk: Option<(u8, u8)>) -> PipelineFrame {
        PipelineFrame {
            msg_id,
            payload,
            timestamp_us: now_us(),
            snr_db: 18.0,
            lock_pct: 0.97,
            crc_valid: true,
            chunk_index: chunk.map(|(i, _)| i),
            total_chunks: chunk.map(|(_, t)| t),
        }
    }

    fn json_bytes(value: &Value) -> Vec<u8> {
        gibberlink_core::codec::Codec::encode(&JsonCodec, value).unwrap()
    }

    #[tokio::test]
    async fn test_single_frame_produces_plain_english() {
        let mut pipeline = pipeline();
        let value = Value::from_iter([
            ("op", Value::from("sum")),
            ("args", Value::from_iter([("a", Value::from(2)), ("b", Value::from(3))])),
            ("id", Value::from("req-1")),
        ]);
        let events = pipeline
            .handle_frame(frame(MsgId::from_bytes(*b"m001"), json_bytes(&value), None))
            .await;

        let plain = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::PlainEnglish(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert!(plain.text.contains("sum"));
        assert!(plain.text.contains("req-1"));
        assert!((plain.snr_db - 18.0).abs() < f32::EPSILON);
        assert!(matches!(events.last(), Some(PipelineEvent::Metrics(_))));
        assert_eq!(pipeline.metrics().messages, 1);
    }

    #[tokio::test]
    async fn test_multipart_out_of_order_single_event() {
        let mut pipeline = pipeline();
        let value = Value::from_iter([("note", Value::String("multi".repeat(40)))]);
        let bytes = json_bytes(&value);
        let (first, second) = bytes.split_at(bytes.len() / 2);
        let msg_id = MsgId::from_bytes(*b"m002");

        let events =
            pipeline.handle_frame(frame(msg_id, second.to_vec(), Some((1, 2)))).await;
        assert!(events.iter().all(|e| !matches!(e, PipelineEvent::PlainEnglish(_))));

        let events = pipeline.handle_frame(frame(msg_id, first.to_vec(), Some((0, 2)))).await;
        let plain_count = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::PlainEnglish(_)))
            .count();
        assert_eq!(plain_count, 1);
        assert_eq!(pipeline.metrics().messages, 1);
        assert_eq!(pipeline.metrics().frames, 2);
    }

    #[tokio::test]
    async fn test_crc_invalid_part_suppresses_output() {
        let mut pipeline = pipeline();
        let value = Value::from_iter([("note", Value::from("x"))]);
        let bytes = json_bytes(&value);
        let (first, second) = bytes.split_at(bytes.len() / 2);
        let msg_id = MsgId::from_bytes(*b"m003");

        let mut bad = frame(msg_id, first.to_vec(), Some((0, 2)));
        bad.crc_valid = false;
        assert!(pipeline.handle_frame(bad).await.is_empty());

        let events = pipeline.handle_frame(frame(msg_id, second.to_vec(), Some((1, 2)))).await;
        assert!(events.iter().all(|e| !matches!(e, PipelineEvent::PlainEnglish(_))));
        assert_eq!(pipeline.metrics().crc_failures, 1);
        assert_eq!(pipeline.metrics().messages, 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload_emits_decode_error() {
        let mut pipeline = pipeline();
        let events = pipeline
            .handle_frame(frame(MsgId::from_bytes(*b"m004"), vec![0xFF, 0x00, 0x12], None))
            .await;
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::DecodeError { .. })));
        assert_eq!(pipeline.metrics().decode_errors, 1);
    }

    #[tokio::test]
    async fn test_latency_warning() {
        let mut pipeline = AudioPipeline::new(
            PipelineConfig { max_latency_ms: 0, ..PipelineConfig::default() },
            Arc::new(ProtocolProcessor::new(Box::new(JsonCodec), None)),
            Arc::new(Englishizer::default()),
        )
        .unwrap();

        let value = Value::from_iter([("op", Value::from("ping"))]);
        let mut stale = frame(MsgId::from_bytes(*b"m005"), json_bytes(&value), None);
        stale.timestamp_us = now_us().saturating_sub(5_000_000);
        let events = pipeline.handle_frame(stale).await;
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::LatencyWarning { .. })));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let mut pipeline = pipeline();
        pipeline.destroy();
        pipeline.destroy();
        let value = Value::from_iter([("op", Value::from("ping"))]);
        let events = pipeline
            .handle_frame(frame(MsgId::from_bytes(*b"m006"), json_bytes(&value), None))
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_acoustic_end_to_end() {
        // Frame a JSON payload, modulate it, and run the PCM through the
        // whole pipeline.
        let config = PipelineConfig::default();
        let value = Value::from_iter([("msg", Value::from("Hello"))]);
        let bytes = json_bytes(&value);
        let wire = Framer
            .frame(MsgId::from_bytes(*b"m007"), &bytes, &FrameOptions::default())
            .unwrap()
            .pop()
            .unwrap();
        let pcm = FskModulator::new(config.modem.clone()).unwrap().modulate(&wire);

        let mut pipeline = pipeline();
        let mut plain = None;
        for chunk in pcm.chunks(1024) {
            for event in pipeline.process_chunk(chunk).await {
                if let PipelineEvent::PlainEnglish(p) = event {
                    plain = Some(p);
                }
            }
        }
        // Trailing silence closes out the stream.
        for event in pipeline.process_chunk(&vec![0.0; 512]).await {
            if let PipelineEvent::PlainEnglish(p) = event {
                plain = Some(p);
            }
        }

        let plain = plain.expect("acoustic round-trip produced no plainEnglish event");
        assert!(plain.snr_db >= 10.0);
        assert!(plain.lock_pct > 0.9);
        assert_eq!(plain.msg_id, MsgId::from_bytes(*b"m007"));
    }

    #[tokio::test]
    async fn test_spawned_worker_and_destroy() {
        let handle = pipeline().spawn();
        let mut events = handle.subscribe();

        handle.push_pcm(vec![0.0; 1600]).await.unwrap();
        handle.destroy().await;
        handle.destroy().await; // idempotent

        assert!(handle.push_pcm(vec![0.0; 16]).await.is_err());
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }
}
