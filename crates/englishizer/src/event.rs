// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Event and result types at the englishizer boundary.

use indexmap::IndexMap;
use serde::Serialize;

use gibberlink_core::types::{MsgId, Protocol};
use gibberlink_core::Value;

use crate::kind::MessageKind;

/// Wire metadata accompanying a decoded payload.
#[derive(Debug, Clone)]
pub struct EventMeta {
    pub msg_id: MsgId,
    pub transport: Protocol,
    pub codec: String,
    pub timestamp_us: u64,
    pub session_id: Option<String>,
}

/// A decoded message on its way to plain English.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Pre-detected kind; `None` runs the matcher table.
    pub kind: Option<MessageKind>,
    pub payload: Value,
    pub meta: EventMeta,
}

/// Plain-English rendering of one message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Englishized {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glossary: Option<IndexMap<String, String>>,
    /// Notable fields the renderer extracted, stringified.
    pub fields: IndexMap<String, String>,
    /// Dotted paths that were redacted before rendering.
    pub redactions: Vec<String>,
    pub msg_id: MsgId,
    /// Renderer confidence in [0, 1]; the generic fallback caps at 0.3.
    pub confidence: f32,
    /// Field name → dotted source path, when source mapping is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_mapping: Option<IndexMap<String, String>>,
}
