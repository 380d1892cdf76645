// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Message kinds and the default matcher table.
//!
//! Kinds are a closed tagged enum plus an escape hatch for extensions
//! registered at startup. Matchers are pure predicates over the decoded
//! value; they run in the declared priority order and the first match wins.

use serde::Serialize;

use gibberlink_core::Value;

/// Detected message kind, in matcher priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    AudioError,
    SensorStatus,
    Handshake,
    ComputeRequest,
    Ack,
    Error,
    PolicyDecision,
    /// Extension kind registered at startup.
    Custom(String),
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AudioError => "audio-error",
            Self::SensorStatus => "sensor-status",
            Self::Handshake => "handshake",
            Self::ComputeRequest => "compute-request",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::PolicyDecision => "policy-decision",
            Self::Custom(name) => name,
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure predicate over a decoded value.
pub type Matcher = Box<dyn Fn(&Value) -> bool + Send + Sync>;

fn op_is(payload: &Value, ops: &[&str]) -> bool {
    payload.get("op").and_then(Value::as_str).is_some_and(|op| ops.contains(&op))
}

pub(crate) fn matches_audio_error(payload: &Value) -> bool {
    let code = payload.get("code").and_then(Value::as_i64);
    code.is_some_and(|c| (400..=599).contains(&c))
        && (payload.get("error").is_some() || payload.get("message").is_some())
}

pub(crate) fn matches_sensor_status(payload: &Value) -> bool {
    op_is(payload, &["sensor_read", "status_check", "status"]) || payload.get("sensor").is_some()
}

pub(crate) fn matches_handshake(payload: &Value) -> bool {
    payload.get("negotiated").is_some()
        || payload.get("clientFeatures").is_some()
        || (payload.get("compression").is_some() && payload.get("maxMtu").is_some())
        || op_is(payload, &["handshake"])
}

pub(crate) fn matches_compute_request(payload: &Value) -> bool {
    payload.get("op").and_then(Value::as_str).is_some() && payload.get("args").is_some()
}

pub(crate) fn matches_ack(payload: &Value) -> bool {
    payload.get("ack").is_some()
        || payload.get("type").and_then(Value::as_str) == Some("ack")
}

pub(crate) fn matches_error(payload: &Value) -> bool {
    payload.get("error").is_some()
        || payload.get("type").and_then(Value::as_str) == Some("error")
}

pub(crate) fn matches_policy_decision(payload: &Value) -> bool {
    payload.get("decision").is_some() && payload.get("policy").is_some()
}
