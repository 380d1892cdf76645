// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-session WebSocket handler.
//!
//! The connection multiplexes protocol messages (`send` → `recv`) and the
//! acoustic pipeline (`audio.*`). Each connection owns at most one audio
//! pipeline; pipeline events stream back interleaved with responses. The
//! pipeline is destroyed when the socket closes.

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info, warn};

use gibberlink_api::{ClientMessage, ServerMessage};
use gibberlink_core::codec::JsonCodec;
use gibberlink_core::processor::ProtocolProcessor;
use gibberlink_core::types::{now_us, MsgId, PipelineFrame};
use gibberlink_dsp::modem::ModemConfig;
use gibberlink_englishizer::Englishizer;
use gibberlink_gateway::pipeline::{AudioPipeline, PipelineConfig, PipelineEvent, PipelineHandle};
use gibberlink_gateway::Session;

use crate::error::ApiError;
use crate::server::encode_message;
use crate::state::AppState;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Connection-local audio pipeline state.
struct AudioLink {
    handle: PipelineHandle,
    events: tokio::sync::broadcast::Receiver<PipelineEvent>,
    preset: String,
    last_metrics: Option<serde_json::Value>,
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    match serde_json::to_string(message) {
        Ok(json) => {
            if socket.send(Message::Text(json.into())).await.is_err() {
                warn!("failed to send WebSocket message");
                Err(())
            } else {
                Ok(())
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize WebSocket message");
            Err(())
        }
    }
}

async fn send_error(socket: &mut WebSocket, error: &ApiError) -> Result<(), ()> {
    send_message(socket, &ServerMessage::Error { payload: error.to_payload() }).await
}

/// Main WebSocket connection loop.
pub async fn handle(mut socket: WebSocket, state: AppState, session: Session, actor: String) {
    info!(session_id = %session.id, %actor, "WebSocket connection established");
    let mut audio: Option<AudioLink> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_text(&mut socket, &state, &session, &actor, text.as_str(), &mut audio).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session.id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = %session.id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            event = recv_pipeline_event(&mut audio) => {
                let Some(event) = event else { continue };
                if forward_pipeline_event(&mut socket, &mut audio, event).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(link) = audio.take() {
        link.handle.destroy().await;
    }
    info!(session_id = %session.id, "WebSocket connection terminated");
}

/// Receive the next pipeline event, or park forever when no pipeline runs.
async fn recv_pipeline_event(audio: &mut Option<AudioLink>) -> Option<PipelineEvent> {
    match audio {
        Some(link) => link.events.recv().await.ok(),
        None => std::future::pending().await,
    }
}

async fn forward_pipeline_event(
    socket: &mut WebSocket,
    audio: &mut Option<AudioLink>,
    event: PipelineEvent,
) -> Result<(), ()> {
    match event {
        PipelineEvent::PlainEnglish(plain) => {
            send_message(
                socket,
                &ServerMessage::RecvPlain {
                    msg_id: plain.msg_id.to_string(),
                    text: plain.text,
                    confidence: plain.confidence,
                    snr_db: plain.snr_db,
                    lock_pct: plain.lock_pct,
                    latency_ms: plain.latency_ms,
                },
            )
            .await
        }
        PipelineEvent::DecodeError { msg_id, error } => {
            send_message(
                socket,
                &ServerMessage::AudioError { message: format!("{msg_id}: {error}") },
            )
            .await
        }
        PipelineEvent::LatencyWarning { msg_id, latency_ms } => {
            send_message(
                socket,
                &ServerMessage::AudioNoise {
                    message: format!("message {msg_id} took {latency_ms} ms end to end"),
                },
            )
            .await
        }
        PipelineEvent::Metrics(metrics) => {
            if let Some(link) = audio {
                link.last_metrics = serde_json::to_value(&metrics).ok();
            }
            Ok(())
        }
    }
}

/// Returns false when the connection should close.
async fn handle_client_text(
    socket: &mut WebSocket,
    state: &AppState,
    session: &Session,
    actor: &str,
    text: &str,
    audio: &mut Option<AudioLink>,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "unparseable WebSocket message");
            let error = ApiError::bad_request(format!("invalid message: {e}"));
            return send_error(socket, &error).await.is_ok();
        }
    };

    match message {
        ClientMessage::Send { target, payload, require_transcript } => {
            handle_send(socket, state, session, actor, target, payload, require_transcript).await
        }
        ClientMessage::AudioStart { preset } => handle_audio_start(socket, state, session, preset, audio).await,
        ClientMessage::AudioStop => handle_audio_stop(socket, audio).await,
        ClientMessage::AudioRaw { pcm_base64 } => handle_audio_raw(socket, &pcm_base64, audio).await,
        ClientMessage::AudioFrame {
            msg_id,
            payload_base64,
            snr_db,
            lock_pct,
            crc_valid,
            chunk_index,
            total_chunks,
        } => {
            handle_audio_frame(
                socket,
                audio,
                &msg_id,
                &payload_base64,
                snr_db,
                lock_pct,
                crc_valid,
                chunk_index,
                total_chunks,
            )
            .await
        }
    }
}

async fn handle_send(
    socket: &mut WebSocket,
    state: &AppState,
    session: &Session,
    actor: &str,
    target: Option<String>,
    payload: serde_json::Value,
    require_transcript: bool,
) -> bool {
    match encode_message(
        state,
        session,
        actor,
        "ws:send",
        &payload,
        target.as_deref(),
        require_transcript,
    )
    .await
    {
        Ok(response) => {
            // A WebSocket session without an explicit target is loopback:
            // the connected client is the peer, so its own send comes back
            // decoded as `recv`.
            if target.is_none() {
                let codec = match session.features.compression {
                    gibberlink_core::types::Compression::Zstd => "msgpackzstd",
                    gibberlink_core::types::Compression::None => "msgpack",
                };
                let metadata = gibberlink_core::types::MessageMetadata {
                    timestamp_us: now_us(),
                    transport: Some(session.transport),
                    codec: codec.to_string(),
                    fec: if session.features.fec { "stub-rs" } else { "none" }.to_string(),
                    size: response.size,
                    frames: response.frames,
                    crc32: u32::from_str_radix(&response.crc32, 16).unwrap_or_default(),
                };
                return send_message(
                    socket,
                    &ServerMessage::Recv { msg_id: response.msg_id, payload, metadata },
                )
                .await
                .is_ok();
            }
            true
        }
        Err(error) => send_error(socket, &error).await.is_ok(),
    }
}

async fn handle_audio_start(
    socket: &mut WebSocket,
    state: &AppState,
    session: &Session,
    preset: Option<String>,
    audio: &mut Option<AudioLink>,
) -> bool {
    if audio.is_some() {
        let error = ApiError::bad_request("audio pipeline already started");
        return send_error(socket, &error).await.is_ok();
    }

    let preset_name = preset.unwrap_or_else(|| "lowLatency".to_string());
    let Some(modem) = ModemConfig::preset(&preset_name) else {
        let error = ApiError::bad_request(format!("unknown audio preset '{preset_name}'"));
        return send_error(socket, &error).await.is_ok();
    };

    let config = PipelineConfig {
        modem,
        max_latency_ms: 300,
        session_id: Some(session.id.clone()),
    };
    // The acoustic link always carries JSON payloads without FEC; the
    // negotiated wire features apply to the framed transports.
    let processor = std::sync::Arc::new(ProtocolProcessor::new(Box::new(JsonCodec), None));
    let englishizer: std::sync::Arc<Englishizer> = state.englishizer.clone();

    match AudioPipeline::new(config, processor, englishizer) {
        Ok(pipeline) => {
            let handle = pipeline.spawn();
            let events = handle.subscribe();
            *audio = Some(AudioLink {
                handle,
                events,
                preset: preset_name.clone(),
                last_metrics: None,
            });
            send_message(socket, &ServerMessage::AudioStarted { preset: preset_name })
                .await
                .is_ok()
        }
        Err(e) => send_error(socket, &ApiError::bad_request(e.to_string())).await.is_ok(),
    }
}

async fn handle_audio_stop(socket: &mut WebSocket, audio: &mut Option<AudioLink>) -> bool {
    let Some(link) = audio.take() else {
        let error = ApiError::bad_request("audio pipeline not started");
        return send_error(socket, &error).await.is_ok();
    };
    link.handle.destroy().await;
    debug!(preset = %link.preset, "audio pipeline stopped");
    send_message(socket, &ServerMessage::AudioStopped { stats: link.last_metrics })
        .await
        .is_ok()
}

async fn handle_audio_raw(
    socket: &mut WebSocket,
    pcm_base64: &str,
    audio: &mut Option<AudioLink>,
) -> bool {
    let Some(link) = audio.as_ref() else {
        let error = ApiError::bad_request("audio pipeline not started");
        return send_error(socket, &error).await.is_ok();
    };
    let bytes = match BASE64.decode(pcm_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = ApiError::bad_request(format!("invalid pcm base64: {e}"));
            return send_error(socket, &error).await.is_ok();
        }
    };
    // f32 little-endian samples; a ragged tail is dropped.
    let pcm: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if link.handle.push_pcm(pcm).await.is_err() {
        let error = ApiError::internal("audio pipeline worker stopped");
        return send_error(socket, &error).await.is_ok();
    }
    true
}

#[allow(clippy::too_many_arguments)]
async fn handle_audio_frame(
    socket: &mut WebSocket,
    audio: &mut Option<AudioLink>,
    msg_id: &str,
    payload_base64: &str,
    snr_db: Option<f32>,
    lock_pct: Option<f32>,
    crc_valid: bool,
    chunk_index: Option<u8>,
    total_chunks: Option<u8>,
) -> bool {
    let Some(link) = audio.as_ref() else {
        let error = ApiError::bad_request("audio pipeline not started");
        return send_error(socket, &error).await.is_ok();
    };
    let msg_id: MsgId = match msg_id.parse() {
        Ok(msg_id) => msg_id,
        Err(e) => {
            let error = ApiError::bad_request(format!("{e}"));
            return send_error(socket, &error).await.is_ok();
        }
    };
    let payload = match BASE64.decode(payload_base64) {
        Ok(payload) => payload,
        Err(e) => {
            let error = ApiError::bad_request(format!("invalid frame base64: {e}"));
            return send_error(socket, &error).await.is_ok();
        }
    };

    let frame = PipelineFrame {
        msg_id,
        payload,
        timestamp_us: now_us(),
        snr_db: snr_db.unwrap_or(0.0),
        lock_pct: lock_pct.unwrap_or(1.0),
        crc_valid,
        chunk_index,
        total_chunks,
    };
    if link.handle.push_frame(frame).await.is_err() {
        let error = ApiError::internal("audio pipeline worker stopped");
        return send_error(socket, &error).await.is_ok();
    }
    true
}
