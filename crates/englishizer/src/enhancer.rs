// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Optional external enhancement hook.
//!
//! An [`Enhancer`] (typically an LLM call behind an RPC) can rewrite
//! low-confidence or long template output. The engine bounds every call with
//! a timeout and swallows failures: the template text always stands when the
//! enhancer cannot improve on it.

use async_trait::async_trait;
use thiserror::Error;

use gibberlink_core::Value;

use crate::kind::MessageKind;

/// Default enhancer call timeout.
pub const DEFAULT_ENHANCER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Recent-message context passed along with each enhancement request.
#[derive(Debug, Clone)]
pub struct EnhanceContext {
    /// Up to the last N englishized texts for this session.
    pub recent_messages: Vec<String>,
    pub session_id: Option<String>,
    pub timestamp_us: u64,
}

/// Request for an external rewrite of template output.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    pub original_payload: Value,
    pub detected_kind: MessageKind,
    pub template_translation: String,
    pub confidence: f32,
    pub context: EnhanceContext,
}

/// Successful enhancement.
#[derive(Debug, Clone)]
pub struct EnhanceResponse {
    pub text: String,
    pub confidence: f32,
}

/// Enhancer failure; always swallowed by the engine.
#[derive(Debug, Error)]
pub enum EnhancerError {
    #[error("enhancer unavailable: {0}")]
    Unavailable(String),
    #[error("enhancer rejected the request: {0}")]
    Rejected(String),
}

/// External enhancement seam.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, request: EnhanceRequest) -> Result<EnhanceResponse, EnhancerError>;
}
