// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The englishizer engine: matcher table, option processing and the
//! enhancer hook.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gibberlink_core::Value;

use crate::enhancer::{
    EnhanceContext, EnhanceRequest, Enhancer, DEFAULT_ENHANCER_TIMEOUT,
};
use crate::event::{Englishized, GatewayEvent};
use crate::kind::{self, Matcher, MessageKind};
use crate::redact::Redactor;
use crate::render::{self, Rendered, Renderer};
use crate::glossary;

/// How many recent messages accompany each enhancement request.
const RECENT_CONTEXT_LEN: usize = 5;

/// Enhancement triggers: low confidence or long template output.
const ENHANCE_CONFIDENCE_BELOW: f32 = 0.7;
const ENHANCE_TEXT_OVER_CHARS: usize = 100;

/// Rendering options.
#[derive(Debug, Clone, Default)]
pub struct EnglishizeOptions {
    /// Truncate output to at most this many sentences.
    pub max_sentences: Option<usize>,
    /// Attach glossary entries for protocol terms found in the text.
    pub glossary: bool,
    /// Attach structural bullets when the renderer provides them.
    pub bullets: bool,
    /// Attach field → dotted-source-path mapping.
    pub source_mapping: bool,
}

struct Registration {
    kind: MessageKind,
    matcher: Matcher,
    renderer: Renderer,
}

/// Kind detection + template rendering + redaction, with an optional
/// external enhancer.
pub struct Englishizer {
    registry: Vec<Registration>,
    redactor: Redactor,
    options: EnglishizeOptions,
    enhancer: Option<Arc<dyn Enhancer>>,
    enhancer_timeout: Duration,
    recent: Mutex<VecDeque<String>>,
}

impl Default for Englishizer {
    fn default() -> Self {
        Self::new(EnglishizeOptions::default())
    }
}

impl Englishizer {
    pub fn new(options: EnglishizeOptions) -> Self {
        let registry = vec![
            Registration {
                kind: MessageKind::AudioError,
                matcher: Box::new(kind::matches_audio_error),
                renderer: Box::new(render::render_audio_error),
            },
            Registration {
                kind: MessageKind::SensorStatus,
                matcher: Box::new(kind::matches_sensor_status),
                renderer: Box::new(render::render_sensor_status),
            },
            Registration {
                kind: MessageKind::Handshake,
                matcher: Box::new(kind::matches_handshake),
                renderer: Box::new(render::render_handshake),
            },
            Registration {
                kind: MessageKind::ComputeRequest,
                matcher: Box::new(kind::matches_compute_request),
                renderer: Box::new(render::render_compute_request),
            },
            Registration {
                kind: MessageKind::Ack,
                matcher: Box::new(kind::matches_ack),
                renderer: Box::new(render::render_ack),
            },
            Registration {
                kind: MessageKind::Error,
                matcher: Box::new(kind::matches_error),
                renderer: Box::new(render::render_error),
            },
            Registration {
                kind: MessageKind::PolicyDecision,
                matcher: Box::new(kind::matches_policy_decision),
                renderer: Box::new(render::render_policy_decision),
            },
        ];
        Self {
            registry,
            redactor: Redactor::default(),
            options,
            enhancer: None,
            enhancer_timeout: DEFAULT_ENHANCER_TIMEOUT,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CONTEXT_LEN)),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn Enhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_enhancer_timeout(mut self, timeout: Duration) -> Self {
        self.enhancer_timeout = timeout;
        self
    }

    /// Register an extension kind at startup. Extensions run after the
    /// built-in matchers but before the generic fallback.
    pub fn register(&mut self, kind: MessageKind, matcher: Matcher, renderer: Renderer) {
        self.registry.push(Registration { kind, matcher, renderer });
    }

    /// Detect the kind of a payload without rendering it.
    pub fn detect_kind(&self, payload: &Value) -> MessageKind {
        self.registry
            .iter()
            .find(|registration| (registration.matcher)(payload))
            .map_or(MessageKind::Unknown, |registration| registration.kind.clone())
    }

    /// Render one decoded message.
    pub async fn englishize(&self, event: &GatewayEvent) -> Englishized {
        let (payload, redactions) = self.redactor.redact(&event.payload);

        let detected = event.kind.clone().unwrap_or_else(|| self.detect_kind(&payload));
        let rendered = self.render(&detected, &payload);

        let mut text = rendered.text;
        let mut confidence = rendered.confidence.clamp(0.0, 1.0);

        if let Some(max) = self.options.max_sentences {
            text = truncate_sentences(&text, max);
        }

        let glossary_entries = if self.options.glossary {
            let entries = glossary::extract(&text);
            (!entries.is_empty()).then_some(entries)
        } else {
            None
        };

        if let Some(enhancer) = &self.enhancer {
            let should_enhance = confidence < ENHANCE_CONFIDENCE_BELOW
                || text.len() > ENHANCE_TEXT_OVER_CHARS
                || self.options.glossary;
            if should_enhance {
                let request = EnhanceRequest {
                    original_payload: payload.clone(),
                    detected_kind: detected.clone(),
                    template_translation: text.clone(),
                    confidence,
                    context: EnhanceContext {
                        recent_messages: self.recent_messages(),
                        session_id: event.meta.session_id.clone(),
                        timestamp_us: event.meta.timestamp_us,
                    },
                };
                match tokio::time::timeout(self.enhancer_timeout, enhancer.enhance(request)).await
                {
                    Ok(Ok(response)) => {
                        text = response.text;
                        confidence = response.confidence.clamp(0.0, 1.0);
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "enhancer failed; keeping template output");
                    }
                    Err(_) => {
                        tracing::debug!(
                            timeout_ms = self.enhancer_timeout.as_millis() as u64,
                            "enhancer timed out; keeping template output"
                        );
                    }
                }
            }
        }

        self.remember(&text);

        Englishized {
            text,
            bullets: if self.options.bullets { rendered.bullets } else { None },
            glossary: glossary_entries,
            fields: rendered.fields,
            redactions,
            msg_id: event.meta.msg_id,
            confidence,
            source_mapping: self.options.source_mapping.then_some(rendered.source_mapping),
        }
    }

    fn render(&self, detected: &MessageKind, payload: &Value) -> Rendered {
        self.registry
            .iter()
            .find(|registration| registration.kind == *detected)
            .map_or_else(|| render::render_generic(payload), |r| (r.renderer)(payload))
    }

    fn recent_messages(&self) -> Vec<String> {
        self.recent.lock().map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }

    fn remember(&self, text: &str) {
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == RECENT_CONTEXT_LEN {
                recent.pop_front();
            }
            recent.push_back(text.to_string());
        }
    }
}

/// Keep at most `max` sentences, splitting on `.`, `?` and `!`.
fn truncate_sentences(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut count = 0;
    for ch in text.chars() {
        out.push(ch);
        if matches!(ch, '.' | '?' | '!') {
            count += 1;
            if count >= max {
                break;
            }
        }
    }
    out.trim_end().to_string()
}
