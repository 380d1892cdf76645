// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! api: Defines the HTTP and WebSocket API contract for the Gibberlink
//! gateway.
//!
//! All API communication uses JSON. Binary material (wire frames, PCM)
//! travels base64-encoded inside JSON fields. WebSocket messages carry a
//! `type` tag (`send`, `audio.start`, …) on both directions.

use serde::{Deserialize, Serialize};

// Re-export types so client crates can use them.
pub use gibberlink_core::types::{Address, Compression, Features, MessageMetadata, Protocol};

// --- Error payloads ---

/// Canonical API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    SessionNotFound,
    PolicyViolation,
    DecodeFailed,
    RateLimitExceeded,
    NotFound,
    InternalServerError,
}

impl ErrorCode {
    /// HTTP status this code maps to.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest | Self::DecodeFailed => 400,
            Self::Unauthorized => 401,
            Self::PolicyViolation => 403,
            Self::SessionNotFound | Self::NotFound => 404,
            Self::RateLimitExceeded => 429,
            Self::InternalServerError => 500,
        }
    }
}

/// Error body shared by the HTTP surface and WebSocket `error` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: ErrorCode,
    pub message: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub request_id: String,
}

// --- HTTP request/response bodies ---

/// `GET /v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub transports: Vec<String>,
    pub codecs: Vec<String>,
    pub version: String,
}

/// `POST /v1/handshake`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub client_features: Features,
    /// Peer URI (`ws://…`, `udp://…`, `audio://…`).
    pub peer_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub session_id: String,
    pub negotiated: Features,
    pub peer_address: Address,
    /// RFC 3339 expiry.
    pub expires_at: String,
}

/// `POST /v1/encode`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub session_id: String,
    /// Optional delivery target; encode succeeds even when delivery fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub require_transcript: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeResponse {
    pub msg_id: String,
    /// Concatenated wire frames, base64.
    pub bytes_base64: String,
    pub frames: usize,
    pub size: usize,
    /// Zero-padded lowercase hex.
    pub crc32: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
}

/// `POST /v1/decode`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub bytes_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResponse {
    pub msg_id: String,
    pub payload: serde_json::Value,
    pub metadata: MessageMetadata,
    pub crc32: String,
}

// --- WebSocket messages ---

/// Client → server WebSocket messages (`GET /v1/messages?sessionId=…`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Encode and deliver a payload to the session peer.
    #[serde(rename = "send", rename_all = "camelCase")]
    Send {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        payload: serde_json::Value,
        #[serde(default)]
        require_transcript: bool,
    },
    /// Start the acoustic pipeline for this session.
    #[serde(rename = "audio.start", rename_all = "camelCase")]
    AudioStart {
        /// Modem preset (`lowLatency`, `highQuality`, `noiseResistant`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<String>,
    },
    /// Stop the acoustic pipeline.
    #[serde(rename = "audio.stop")]
    AudioStop,
    /// A pre-demodulated acoustic frame (e.g. from a browser-side modem).
    #[serde(rename = "audio.frame", rename_all = "camelCase")]
    AudioFrame {
        msg_id: String,
        payload_base64: String,
        #[serde(default)]
        snr_db: Option<f32>,
        #[serde(default)]
        lock_pct: Option<f32>,
        #[serde(default = "default_true")]
        crc_valid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_index: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_chunks: Option<u8>,
    },
    /// Raw PCM (f32 little-endian), base64, for the server-side modem.
    #[serde(rename = "audio.raw", rename_all = "camelCase")]
    AudioRaw { pcm_base64: String },
}

const fn default_true() -> bool {
    true
}

/// Server → client WebSocket messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A decoded inbound message.
    #[serde(rename = "recv", rename_all = "camelCase")]
    Recv {
        msg_id: String,
        payload: serde_json::Value,
        metadata: MessageMetadata,
    },
    /// Plain-English rendering of an inbound message.
    #[serde(rename = "recv.plain", rename_all = "camelCase")]
    RecvPlain {
        msg_id: String,
        text: String,
        confidence: f32,
        snr_db: f32,
        lock_pct: f32,
        latency_ms: u64,
    },
    #[serde(rename = "audio.started", rename_all = "camelCase")]
    AudioStarted { preset: String },
    #[serde(rename = "audio.stopped", rename_all = "camelCase")]
    AudioStopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<serde_json::Value>,
    },
    /// Channel quality warning (latency, low SNR).
    #[serde(rename = "audio.noise", rename_all = "camelCase")]
    AudioNoise { message: String },
    #[serde(rename = "audio.error", rename_all = "camelCase")]
    AudioError { message: String },
    #[serde(rename = "error")]
    Error {
        #[serde(flatten)]
        payload: ErrorPayload,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(serde_json::to_string(&ErrorCode::RateLimitExceeded).unwrap(), "\"RATE_LIMIT_EXCEEDED\"");
        assert_eq!(serde_json::to_string(&ErrorCode::BadRequest).unwrap(), "\"BAD_REQUEST\"");
    }

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::BadRequest.http_status(), 400);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::PolicyViolation.http_status(), 403);
        assert_eq!(ErrorCode::SessionNotFound.http_status(), 404);
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::InternalServerError.http_status(), 500);
    }

    #[test]
    fn test_client_message_tags() {
        let send: ClientMessage = serde_json::from_str(
            r#"{"type":"send","payload":{"op":"ping"},"requireTranscript":true}"#,
        )
        .unwrap();
        assert!(matches!(send, ClientMessage::Send { require_transcript: true, .. }));

        let start: ClientMessage =
            serde_json::from_str(r#"{"type":"audio.start","preset":"lowLatency"}"#).unwrap();
        assert!(matches!(start, ClientMessage::AudioStart { preset: Some(p) } if p == "lowLatency"));

        let stop: ClientMessage = serde_json::from_str(r#"{"type":"audio.stop"}"#).unwrap();
        assert!(matches!(stop, ClientMessage::AudioStop));
    }

    #[test]
    fn test_server_message_round_trip() {
        let message = ServerMessage::RecvPlain {
            msg_id: "abcd".to_string(),
            text: "agent A asked agent B to perform \"sum\".".to_string(),
            confidence: 1.0,
            snr_db: 17.5,
            lock_pct: 0.98,
            latency_ms: 42,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"recv.plain\""));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerMessage::RecvPlain { latency_ms: 42, .. }));
    }

    #[test]
    fn test_handshake_request_shape() {
        let request: HandshakeRequest = serde_json::from_str(
            r#"{"clientFeatures":{"compression":"zstd","fec":true,"crypto":false,"maxMtu":16384},
                "peerAddress":"udp://peer.local:9999"}"#,
        )
        .unwrap();
        assert_eq!(request.client_features.max_mtu, Some(16384));
        assert_eq!(request.peer_address, "udp://peer.local:9999");
    }

    #[test]
    fn test_error_payload_flattens_into_ws_error() {
        let message = ServerMessage::Error {
            payload: ErrorPayload {
                error: ErrorCode::SessionNotFound,
                message: "no such session".to_string(),
                timestamp: "2025-01-01T00:00:00Z".to_string(),
                request_id: "r-1".to_string(),
            },
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "SESSION_NOT_FOUND");
        assert_eq!(json["requestId"], "r-1");
    }
}
