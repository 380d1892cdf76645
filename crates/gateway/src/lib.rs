// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Gibberlink Gateway - session and pipeline orchestration.
//!
//! Everything between the protocol engine and the HTTP/WebSocket surface:
//!
//! - [`handshake`]: capability negotiation (pointwise AND/min over features)
//! - [`session`]: in-memory session store with expiry sweep
//! - [`policy`]: payload size limits, denylist/PII redaction, allowlists,
//!   content hashing
//! - [`audit`]: append-only JSON-lines journal with rotation, plus
//!   transcript materialization
//! - [`pipeline`]: the audio → decode → englishize worker with streaming
//!   events and metrics
//! - [`transport`]: transport seam with the UDP implementation (WebSocket
//!   lives in the server app, audio in the DSP crate)

pub mod audit;
pub mod error;
pub mod handshake;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod transport;

pub use audit::{AuditConfig, AuditEntry, AuditJournal, AuditQuery, Transcript, TranscriptStore};
pub use error::GatewayError;
pub use handshake::{negotiate, Handshake, SESSION_TTL};
pub use pipeline::{AudioPipeline, PipelineConfig, PipelineEvent, PipelineMetrics, PlainEnglish};
pub use policy::{PolicyConfig, PolicyContext, PolicyDecision, PolicyEngine};
pub use session::{Session, SessionStore};
pub use transport::{Transport, UdpTransport};
