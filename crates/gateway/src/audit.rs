// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Append-only audit journal and transcript store.
//!
//! The journal is UTF-8 JSON-lines, one object per line, flushed on every
//! append. A single writer serializes appends behind a mutex; rotation
//! (close → rename chain → reopen) happens under the same lock so a
//! concurrent append can never land in a half-rotated file. Lookups scan the
//! current file line by line.
//!
//! Transcripts are materialized views (audit entry + decoded payload +
//! metadata + raw frames) stored one JSON file per msgId.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use gibberlink_core::types::MessageMetadata;

use crate::error::{GatewayError, Result};

/// One audit line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp_us: u64,
    /// Request route (`/v1/encode`, `ws:send`, `audio`).
    pub route: String,
    /// Authenticated key id or peer identity.
    pub actor: String,
    pub msg_id: String,
    pub size: usize,
    pub codec: String,
    pub transport: String,
    /// `allow` or `deny`.
    pub policy_decision: String,
    /// SHA-256 of the canonical payload JSON, lowercase hex.
    pub payload_sha256: String,
    pub pii_detected: bool,
    pub redacted_fields: Vec<String>,
}

/// Search filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub route: Option<String>,
    pub policy_decision: Option<String>,
    pub from_us: Option<u64>,
    pub to_us: Option<u64>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_ref().is_none_or(|a| *a == entry.actor)
            && self.route.as_ref().is_none_or(|r| *r == entry.route)
            && self.policy_decision.as_ref().is_none_or(|d| *d == entry.policy_decision)
            && self.from_us.is_none_or(|from| entry.timestamp_us >= from)
            && self.to_us.is_none_or(|to| entry.timestamp_us <= to)
    }
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub path: PathBuf,
    /// Rotate when the current file exceeds this size.
    pub max_file_size: u64,
    /// Rotated files kept (`path.1` .. `path.N`); older ones are discarded.
    pub max_files: usize,
}

impl AuditConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_file_size: 10 * 1024 * 1024, max_files: 5 }
    }
}

struct JournalInner {
    file: fs::File,
    size: u64,
}

/// Append-only JSON-lines journal with size-based rotation.
pub struct AuditJournal {
    config: AuditConfig,
    writer: Mutex<JournalInner>,
}

impl AuditJournal {
    /// Open (or create) the journal at the configured path.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures.
    pub async fn open(config: AuditConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await?;
        let size = file.metadata().await?.len();
        Ok(Self { config, writer: Mutex::new(JournalInner { file, size }) })
    }

    /// Append one entry and flush. Rotates first when the current file is
    /// over the size limit.
    ///
    /// # Errors
    ///
    /// Propagates serialization and filesystem failures.
    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| GatewayError::Audit(format!("serialize entry: {e}")))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        if writer.size >= self.config.max_file_size {
            self.rotate(&mut writer).await?;
        }
        writer.file.write_all(line.as_bytes()).await?;
        writer.file.flush().await?;
        writer.size += line.len() as u64;
        Ok(())
    }

    /// Flush any buffered bytes (graceful shutdown).
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures.
    pub async fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.file.flush().await?;
        Ok(())
    }

    /// Close → rename chain → reopen, all under the writer lock.
    async fn rotate(&self, writer: &mut JournalInner) -> Result<()> {
        writer.file.flush().await?;

        let rotated = |i: usize| -> PathBuf {
            let mut name = self.config.path.as_os_str().to_owned();
            name.push(format!(".{i}"));
            PathBuf::from(name)
        };

        // Oldest file falls off the end.
        let _ = fs::remove_file(rotated(self.config.max_files)).await;
        for i in (1..self.config.max_files).rev() {
            let _ = fs::rename(rotated(i), rotated(i + 1)).await;
        }
        fs::rename(&self.config.path, rotated(1)).await?;

        writer.file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;
        writer.size = 0;
        tracing::info!(path = %self.config.path.display(), "audit journal rotated");
        Ok(())
    }

    /// Find the first entry for `msg_id` in the current file.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures; a missing journal file reads as
    /// empty.
    pub async fn lookup(&self, msg_id: &str) -> Result<Option<AuditEntry>> {
        Ok(self
            .read_entries()
            .await?
            .into_iter()
            .find(|entry| entry.msg_id == msg_id))
    }

    /// All entries matching the query, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures.
    pub async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        Ok(self
            .read_entries()
            .await?
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect())
    }

    async fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        let content = match fs::read_to_string(&self.config.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable audit line");
                    None
                }
            })
            .collect())
    }
}

/// A materialized audit view with the decoded payload and raw frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub msg_id: String,
    pub timestamp_us: u64,
    pub payload: serde_json::Value,
    pub metadata: MessageMetadata,
    pub audit: AuditEntry,
    /// Base64 wire frames.
    pub raw_frames: Vec<String>,
}

/// One JSON file per msgId under a storage directory.
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    /// # Errors
    ///
    /// Propagates directory creation failures.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, msg_id: &str) -> Result<PathBuf> {
        // msgIds come off the wire; never let one escape the storage dir.
        if msg_id.is_empty() || !msg_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(GatewayError::Audit(format!("unsafe transcript id '{msg_id}'")));
        }
        Ok(self.dir.join(format!("{msg_id}.json")))
    }

    /// # Errors
    ///
    /// Propagates serialization and filesystem failures.
    pub async fn save(&self, transcript: &Transcript) -> Result<()> {
        let path = self.path_for(&transcript.msg_id)?;
        let json = serde_json::to_vec_pretty(transcript)
            .map_err(|e| GatewayError::Audit(format!("serialize transcript: {e}")))?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates filesystem failures; a missing transcript is `Ok(None)`.
    pub async fn load(&self, msg_id: &str) -> Result<Option<Transcript>> {
        let path = self.path_for(msg_id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GatewayError::Audit(format!("parse transcript: {e}")))
    }
}
