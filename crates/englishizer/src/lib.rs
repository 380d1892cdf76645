// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Gibberlink Englishizer - decoded payloads rendered as short plain-English
//! summaries.
//!
//! The pipeline hands every decoded message to [`Englishizer::englishize`]:
//!
//! 1. The payload is deep-copied and redacted (denylisted keys, sensitive
//!    dotted paths and PII become `«redacted»`).
//! 2. [`MessageKind`] matchers run in priority order; first match wins.
//! 3. The matching renderer produces deterministic template text with a
//!    confidence score (generic fallback caps at 0.3).
//! 4. Options apply: sentence truncation, glossary extraction, bullets.
//! 5. An optional external [`Enhancer`] may rewrite low-confidence or long
//!    output; enhancer failures never surface — the template text stands.

pub mod enhancer;
pub mod engine;
pub mod event;
pub mod glossary;
pub mod kind;
pub mod redact;
pub mod render;

pub use engine::{Englishizer, EnglishizeOptions};
pub use enhancer::{EnhanceContext, EnhanceRequest, EnhanceResponse, Enhancer, EnhancerError};
pub use event::{Englishized, EventMeta, GatewayEvent};
pub use kind::MessageKind;
pub use redact::{Redactor, REDACTED_PLACEHOLDER};
