// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use gibberlink_englishizer::Englishizer;
use gibberlink_gateway::policy::{PolicyConfig, PolicyEngine};
use gibberlink_gateway::{AuditConfig, AuditJournal, SessionStore, TranscriptStore};

use crate::auth::ApiKeys;
use crate::config::Config;
use crate::rate_limit::RateLimiter;

/// Process-wide services, composed once at startup and passed to every
/// handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api_keys: Arc<ApiKeys>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionStore>,
    pub policy: Arc<PolicyEngine>,
    pub audit: Arc<AuditJournal>,
    pub transcripts: Arc<TranscriptStore>,
    pub englishizer: Arc<Englishizer>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build every service from configuration.
    ///
    /// # Errors
    ///
    /// Propagates audit/transcript storage failures.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let api_keys = ApiKeys::from_pairs(config.parsed_api_keys());
        let rate_limiter = RateLimiter::new(
            Duration::from_secs(config.rate_limit_window),
            config.rate_limit_max_requests,
        );
        let audit = AuditJournal::open(AuditConfig::new(config.audit_log_path.clone())).await?;
        let transcripts = TranscriptStore::open(config.transcript_storage_path.clone()).await?;
        let policy = PolicyEngine::new(PolicyConfig {
            max_payload_size: config.max_payload_size,
            ..PolicyConfig::default()
        });

        Ok(Self {
            config: Arc::new(config),
            api_keys: Arc::new(api_keys),
            rate_limiter: Arc::new(rate_limiter),
            sessions: Arc::new(SessionStore::new()),
            policy: Arc::new(policy),
            audit: Arc::new(audit),
            transcripts: Arc::new(transcripts),
            englishizer: Arc::new(Englishizer::default()),
            shutdown: CancellationToken::new(),
        })
    }
}
