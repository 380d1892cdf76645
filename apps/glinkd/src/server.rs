// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP surface: router, auth/rate-limit middleware and the `/v1` handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use gibberlink_api::{
    Compression, DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse, Features,
    HandshakeRequest, HandshakeResponse, HealthResponse,
};
use gibberlink_core::codec::codec_for_name;
use gibberlink_core::fec::StubRsFec;
use gibberlink_core::framer::{FrameOptions, Framer, CHUNK_HEADER_SIZE, CRC_SIZE, HEADER_SIZE, MSG_ID_SIZE};
use gibberlink_core::processor::ProtocolProcessor;
use gibberlink_core::types::{now_us, Address, MsgId, Protocol};
use gibberlink_core::{crc32, Value};
use gibberlink_gateway::{handshake, AuditEntry, Session, Transcript, UdpTransport};
use gibberlink_gateway::transport::Transport;

use crate::error::{now_rfc3339, system_time_to_rfc3339, ApiError};
use crate::state::AppState;
use crate::websocket;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Authenticated actor, injected by the auth middleware.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

/// Feature set this gateway advertises during handshakes.
pub const fn server_features() -> Features {
    Features {
        compression: Compression::Zstd,
        fec: true,
        crypto: false,
        max_mtu: Some(1500),
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/handshake", post(handshake_handler))
        .route("/v1/encode", post(encode_handler))
        .route("/v1/decode", post(decode_handler))
        .route("/v1/transcript/{msg_id}", get(transcript_handler))
        .route("/v1/messages", get(messages_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_and_rate_limit));

    Router::new()
        .route("/v1/health", get(health_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind, serve, and drain on shutdown (sweep sessions, flush audit).
///
/// # Errors
///
/// Propagates bind/serve failures.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_address, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "glinkd listening");

    let sweeper = state
        .sessions
        .spawn_sweeper(gibberlink_gateway::session::SWEEP_INTERVAL, state.shutdown.clone());

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                () = shutdown.cancelled() => {},
            }
        })
        .await?;

    // Graceful teardown: stop the sweeper, sweep sessions, flush audit.
    state.shutdown.cancel();
    let _ = sweeper.await;
    state.sessions.sweep().await;
    state.audit.flush().await?;
    tracing::info!("glinkd stopped");
    Ok(())
}

/// Authenticate the request and charge the rate limiter; attaches the
/// resolved [`Actor`] and `X-RateLimit-*` headers.
async fn auth_and_rate_limit(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(actor) = state.api_keys.authenticate(request.headers()) else {
        return ApiError::unauthorized().into_response();
    };

    let status = state.rate_limiter.check(&actor);
    if !status.allowed {
        let mut response = ApiError::new(
            gibberlink_api::ErrorCode::RateLimitExceeded,
            format!("rate limit of {} requests per window exceeded", status.limit),
        )
        .into_response();
        append_rate_headers(response.headers_mut(), status);
        return response;
    }

    request.extensions_mut().insert(Actor(actor));
    let mut response = next.run(request).await;
    append_rate_headers(response.headers_mut(), status);
    response
}

fn append_rate_headers(headers: &mut HeaderMap, status: crate::rate_limit::RateStatus) {
    let entries = [
        ("x-ratelimit-limit", u64::from(status.limit)),
        ("x-ratelimit-remaining", u64::from(status.remaining)),
        ("x-ratelimit-reset", status.reset_secs),
    ];
    for (name, value) in entries {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    }
}

// --- Handlers ---

async fn health_handler(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now_rfc3339(),
        transports: vec!["ws".to_string(), "udp".to_string(), "audio".to_string()],
        codecs: vec!["msgpack".to_string(), "cbor".to_string(), "json".to_string()],
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handshake_handler(
    State(state): State<AppState>,
    Json(request): Json<HandshakeRequest>,
) -> Result<Json<HandshakeResponse>, ApiError> {
    let peer = Address::parse(&request.peer_address)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let handshake = handshake::open(&request.client_features, &server_features(), peer)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let session = state.sessions.insert(&handshake).await;

    Ok(Json(HandshakeResponse {
        session_id: session.id,
        negotiated: handshake.negotiated,
        peer_address: handshake.peer,
        expires_at: system_time_to_rfc3339(
            std::time::SystemTime::UNIX_EPOCH
                + std::time::Duration::from_micros(handshake.expires_at_us),
        ),
    }))
}

async fn encode_handler(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(request): Json<EncodeRequest>,
) -> Result<Json<EncodeResponse>, ApiError> {
    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| ApiError::session_not_found(&request.session_id))?;

    let response = encode_message(
        &state,
        &session,
        &actor,
        "/v1/encode",
        &request.payload,
        request.target.as_deref(),
        request.require_transcript,
    )
    .await?;
    Ok(Json(response))
}

/// Shared encode operation (HTTP and WebSocket `send`).
pub async fn encode_message(
    state: &AppState,
    session: &Session,
    actor: &str,
    route: &str,
    payload_json: &serde_json::Value,
    target: Option<&str>,
    require_transcript: bool,
) -> Result<EncodeResponse, ApiError> {
    let payload = Value::from_json(payload_json);
    let processor = processor_for(&session.features)?;

    let decision = state.policy.check(
        &payload,
        &gibberlink_gateway::PolicyContext {
            transport: Some(session.transport.as_str().to_string()),
            codec: Some(processor.codec_name().to_string()),
        },
    );

    let msg_id = MsgId::generate();
    let audit_entry = AuditEntry {
        timestamp_us: now_us(),
        route: route.to_string(),
        actor: actor.to_string(),
        msg_id: msg_id.to_string(),
        size: decision.payload_size,
        codec: processor.codec_name().to_string(),
        transport: session.transport.as_str().to_string(),
        policy_decision: decision.decision_str().to_string(),
        payload_sha256: decision.payload_hash.clone(),
        pii_detected: decision.pii_detected,
        redacted_fields: decision.redacted_fields.clone(),
    };
    if let Err(e) = state.audit.append(&audit_entry).await {
        tracing::error!(error = %e, "audit append failed");
    }

    if !decision.allowed {
        return Err(ApiError::policy_violation(
            decision.reason.unwrap_or_else(|| "policy denied the payload".to_string()),
        ));
    }

    let mtu = usize::from(session.features.max_mtu.unwrap_or(1500));
    let frames = processor
        .encode(msg_id, &payload, &FrameOptions { max_frame_size: mtu, enable_chunking: true })
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let crc = Framer
        .deframe(&frames[0])
        .map(|f| f.crc32)
        .ok_or_else(|| ApiError::internal("produced an undecodable frame"))?;

    let mut wire = Vec::new();
    for frame in &frames {
        wire.extend_from_slice(frame);
    }

    let transcript_id = if require_transcript {
        let transcript = Transcript {
            msg_id: msg_id.to_string(),
            timestamp_us: audit_entry.timestamp_us,
            payload: payload_json.clone(),
            metadata: gibberlink_core::types::MessageMetadata {
                timestamp_us: audit_entry.timestamp_us,
                transport: Some(session.transport),
                codec: processor.codec_name().to_string(),
                fec: processor.fec_name().to_string(),
                size: wire.len(),
                frames: frames.len(),
                crc32: crc,
            },
            audit: audit_entry,
            raw_frames: frames.iter().map(|f| BASE64.encode(f)).collect(),
        };
        if let Err(e) = state.transcripts.save(&transcript).await {
            tracing::error!(error = %e, "transcript save failed");
        }
        Some(transcript.msg_id)
    } else {
        None
    };

    // Delivery failures are logged and counted, never fatal: the encoded
    // bytes still go back to the caller.
    if let Some(target) = target {
        deliver(target, &frames).await;
    }

    Ok(EncodeResponse {
        msg_id: msg_id.to_string(),
        bytes_base64: BASE64.encode(&wire),
        frames: frames.len(),
        size: wire.len(),
        crc32: crc32::to_hex(crc),
        transcript_id,
    })
}

async fn deliver(target: &str, frames: &[Vec<u8>]) {
    let address = match Address::parse(target) {
        Ok(address) => address,
        Err(e) => {
            tracing::warn!(target, error = %e, "undeliverable target address");
            return;
        }
    };
    if address.protocol != Protocol::Udp {
        tracing::debug!(target, "non-UDP delivery is handled by the session transport");
        return;
    }
    match UdpTransport::connect(&address).await {
        Ok(transport) => {
            if let Err(e) = transport.send(frames).await {
                tracing::warn!(target, error = %e, "frame delivery failed");
            }
        }
        Err(e) => tracing::warn!(target, error = %e, "transport connect failed"),
    }
}

/// Build the protocol processor matching a session's negotiated features.
fn processor_for(features: &Features) -> Result<ProtocolProcessor, ApiError> {
    let codec_name = match features.compression {
        Compression::Zstd => "msgpackzstd",
        Compression::None => "msgpack",
    };
    let codec = codec_for_name(codec_name).map_err(|e| ApiError::internal(e))?;
    let fec: Option<Box<dyn gibberlink_core::Fec>> =
        if features.fec { Some(Box::new(StubRsFec::default())) } else { None };
    Ok(ProtocolProcessor::new(codec, fec))
}

async fn decode_handler(
    State(_state): State<AppState>,
    Json(request): Json<DecodeRequest>,
) -> Result<Json<DecodeResponse>, ApiError> {
    let bytes = BASE64
        .decode(&request.bytes_base64)
        .map_err(|e| ApiError::bad_request(format!("invalid base64: {e}")))?;

    let frames = split_frames(&bytes);
    if frames.is_empty() {
        return Err(ApiError::decode_failed("no well-formed frames in input"));
    }

    // The wire does not mark codec or FEC; try the supported combinations.
    // The zstd-wrapped codecs also accept uncompressed bytes, so they cover
    // both cases of the compression negotiation.
    for codec_name in ["msgpack", "cbor", "json", "msgpackzstd", "cborzstd", "jsonzstd"] {
        for with_fec in [false, true] {
            let Ok(codec) = codec_for_name(codec_name) else { continue };
            let fec: Option<Box<dyn gibberlink_core::Fec>> =
                if with_fec { Some(Box::new(StubRsFec::default())) } else { None };
            let processor = ProtocolProcessor::new(codec, fec);
            if let Some(decoded) = processor.decode(&frames) {
                return Ok(Json(DecodeResponse {
                    msg_id: decoded.msg_id.to_string(),
                    payload: decoded.value.to_json(),
                    crc32: crc32::to_hex(decoded.metadata.crc32),
                    metadata: decoded.metadata,
                }));
            }
        }
    }

    Err(ApiError::decode_failed("bytes did not decode under any supported codec"))
}

/// Split a concatenation of wire frames into individual frames. A frame
/// does not flag chunking in its header, so both lengths are tried; the
/// deframe check disambiguates.
fn split_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let min = HEADER_SIZE + MSG_ID_SIZE + CRC_SIZE;
    let mut frames = Vec::new();
    let mut offset = 0;

    while bytes.len().saturating_sub(offset) >= min {
        let length = u32::from_be_bytes([
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
            bytes[offset + 8],
        ]) as usize;
        let single_end = offset + min + length;
        let chunked_end = single_end + CHUNK_HEADER_SIZE;

        if single_end <= bytes.len() && Framer.deframe(&bytes[offset..single_end]).is_some() {
            frames.push(bytes[offset..single_end].to_vec());
            offset = single_end;
        } else if chunked_end <= bytes.len()
            && Framer.deframe(&bytes[offset..chunked_end]).is_some()
        {
            frames.push(bytes[offset..chunked_end].to_vec());
            offset = chunked_end;
        } else {
            break;
        }
    }
    frames
}

async fn transcript_handler(
    State(state): State<AppState>,
    Path(msg_id): Path<String>,
) -> Result<Json<Transcript>, ApiError> {
    let transcript = state
        .transcripts
        .load(&msg_id)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("no transcript for '{msg_id}'")))?;
    Ok(Json(transcript))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    session_id: String,
}

async fn messages_handler(
    State(state): State<AppState>,
    Extension(Actor(actor)): Extension<Actor>,
    Query(query): Query<MessagesQuery>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .get(&query.session_id)
        .await
        .ok_or_else(|| ApiError::session_not_found(&query.session_id))?;

    Ok(upgrade.on_upgrade(move |socket| websocket::handle(socket, state, session, actor)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            audit_log_path: dir.path().join("audit.jsonl").to_string_lossy().into_owned(),
            transcript_storage_path: dir.path().join("transcripts").to_string_lossy().into_owned(),
            ..Config::default()
        };
        // The tempdir must outlive the test; leak it deliberately.
        std::mem::forget(dir);
        AppState::from_config(config).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder().uri("/v1/health").body(axum::body::Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["transports"].as_array().unwrap().iter().any(|t| t == "audio"));
    }

    #[tokio::test]
    async fn test_handshake_then_encode_then_decode() {
        let state = test_state().await;
        let app = router(state.clone());

        // Handshake
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/handshake")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        r#"{"clientFeatures":{"compression":"none","fec":false,"crypto":false,"maxMtu":1500},
                           "peerAddress":"udp://127.0.0.1:9999"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let handshake = body_json(response).await;
        let session_id = handshake["sessionId"].as_str().unwrap().to_string();
        assert_eq!(handshake["negotiated"]["maxMtu"], 1500);

        // Encode
        let encode_body = serde_json::json!({
            "sessionId": session_id,
            "payload": {"op": "sum", "args": {"a": 2, "b": 3}, "id": "req-1"},
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/encode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(encode_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let encoded = body_json(response).await;
        assert_eq!(encoded["frames"], 1);
        let bytes_base64 = encoded["bytesBase64"].as_str().unwrap().to_string();

        // Decode the bytes straight back.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/decode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        serde_json::json!({"bytesBase64": bytes_base64}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let decoded = body_json(response).await;
        assert_eq!(decoded["payload"]["op"], "sum");
        assert_eq!(decoded["payload"]["args"]["a"], 2);
    }

    #[tokio::test]
    async fn test_encode_unknown_session_is_404() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/encode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        r#"{"sessionId":"ghost","payload":{"op":"ping"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_auth_rejects_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            api_keys: "alice:s3cret".to_string(),
            audit_log_path: dir.path().join("audit.jsonl").to_string_lossy().into_owned(),
            transcript_storage_path: dir.path().join("t").to_string_lossy().into_owned(),
            ..Config::default()
        };
        std::mem::forget(dir);
        let app = router(AppState::from_config(config).await.unwrap());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/decode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"bytesBase64":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Health stays open.
        let response = app
            .oneshot(
                Request::builder().uri("/v1/health").body(axum::body::Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_and_429() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            rate_limit_max_requests: 2,
            audit_log_path: dir.path().join("audit.jsonl").to_string_lossy().into_owned(),
            transcript_storage_path: dir.path().join("t").to_string_lossy().into_owned(),
            ..Config::default()
        };
        std::mem::forget(dir);
        let app = router(AppState::from_config(config).await.unwrap());

        let request = || {
            Request::builder()
                .method("POST")
                .uri("/v1/decode")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(r#"{"bytesBase64":"AA=="}"#))
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

        let _ = app.clone().oneshot(request()).await.unwrap();
        let third = app.oneshot(request()).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(third).await;
        assert_eq!(json["error"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_policy_violation_is_403() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            max_payload_size: 32,
            audit_log_path: dir.path().join("audit.jsonl").to_string_lossy().into_owned(),
            transcript_storage_path: dir.path().join("t").to_string_lossy().into_owned(),
            ..Config::default()
        };
        std::mem::forget(dir);
        let state = AppState::from_config(config).await.unwrap();
        let app = router(state.clone());

        let handshake = handshake::open(
            &Features::default(),
            &server_features(),
            Address::parse("udp://127.0.0.1:9999").unwrap(),
        )
        .unwrap();
        let session = state.sessions.insert(&handshake).await;

        let body = serde_json::json!({
            "sessionId": session.id,
            "payload": {"blob": "x".repeat(100)},
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/encode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"], "POLICY_VIOLATION");
    }

    #[tokio::test]
    async fn test_transcript_round_trip_via_http() {
        let state = test_state().await;
        let app = router(state.clone());

        let handshake = handshake::open(
            &Features::default(),
            &server_features(),
            Address::parse("udp://127.0.0.1:9999").unwrap(),
        )
        .unwrap();
        let session = state.sessions.insert(&handshake).await;

        let body = serde_json::json!({
            "sessionId": session.id,
            "payload": {"op": "ping"},
            "requireTranscript": true,
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/encode")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let encoded = body_json(response).await;
        let transcript_id = encoded["transcriptId"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/transcript/{transcript_id}"))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let transcript = body_json(response).await;
        assert_eq!(transcript["payload"]["op"], "ping");
        assert_eq!(transcript["audit"]["policyDecision"], "allow");
        assert!(!transcript["rawFrames"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_split_frames_concatenated() {
        let frames = Framer
            .frame(MsgId::from_bytes(*b"many"), &vec![7u8; 600], &FrameOptions::with_max_frame_size(200))
            .unwrap();
        let mut wire = Vec::new();
        for frame in &frames {
            wire.extend_from_slice(frame);
        }
        let split = split_frames(&wire);
        assert_eq!(split.len(), frames.len());
        assert_eq!(split, frames);
    }

    #[test]
    fn test_split_frames_rejects_garbage() {
        assert!(split_frames(b"definitely not a frame").is_empty());
    }
}
