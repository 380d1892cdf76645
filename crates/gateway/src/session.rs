// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! In-memory session store.
//!
//! Sessions are minted by the handshake and live 30 minutes. Lookups are
//! read-heavy; expired entries are deleted lazily on lookup and by a
//! periodic sweep task (every 5 minutes by default). No two live sessions
//! share an id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use gibberlink_core::types::{Address, Features, Protocol};

use crate::handshake::Handshake;

/// Default sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A negotiated, time-bounded peer context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub transport: Protocol,
    pub features: Features,
    pub peer: Address,
    pub created_at_us: u64,
    pub expires_at_us: u64,
}

impl Session {
    fn from_handshake(handshake: &Handshake) -> Self {
        Self {
            id: handshake.session_id.clone(),
            transport: handshake.peer.protocol,
            features: handshake.negotiated,
            peer: handshake.peer.clone(),
            created_at_us: gibberlink_core::types::now_us(),
            expires_at_us: handshake.expires_at_us,
        }
    }

    pub fn is_expired(&self) -> bool {
        gibberlink_core::types::now_us() >= self.expires_at_us
    }
}

/// Thread-safe store for all live sessions.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    // Metrics
    sessions_active_gauge: opentelemetry::metrics::Gauge<u64>,
    sessions_created_counter: opentelemetry::metrics::Counter<u64>,
    sessions_expired_counter: opentelemetry::metrics::Counter<u64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        let meter = global::meter("glink_sessions");
        Self {
            sessions: Mutex::new(HashMap::new()),
            sessions_active_gauge: meter
                .u64_gauge("sessions.active")
                .with_description("Number of live sessions")
                .build(),
            sessions_created_counter: meter
                .u64_counter("sessions.created")
                .with_description("Total sessions created")
                .build(),
            sessions_expired_counter: meter
                .u64_counter("sessions.expired")
                .with_description("Sessions removed by expiry")
                .build(),
        }
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the session minted by a handshake.
    pub async fn insert(&self, handshake: &Handshake) -> Session {
        let session = Session::from_handshake(handshake);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id.clone(), session.clone());
        self.sessions_created_counter.add(1, &[]);
        self.sessions_active_gauge.record(sessions.len() as u64, &[]);
        tracing::info!(session_id = %session.id, peer = %session.peer, "session created");
        session
    }

    /// Look up a live session. Expired entries are deleted on the way out.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(session) if session.is_expired() => {
                sessions.remove(id);
                self.sessions_expired_counter.add(1, &[]);
                self.sessions_active_gauge.record(sessions.len() as u64, &[]);
                None
            }
            Some(session) => Some(session.clone()),
            None => None,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(id);
        if removed.is_some() {
            self.sessions_active_gauge.record(sessions.len() as u64, &[]);
            tracing::info!(session_id = %id, "session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Delete every expired session; returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        let removed = before - sessions.len();
        if removed > 0 {
            self.sessions_expired_counter.add(removed as u64, &[]);
            self.sessions_active_gauge.record(sessions.len() as u64, &[]);
            tracing::debug!(removed, "session sweep");
        }
        removed
    }

    /// Spawn the periodic sweeper; cancelled via `cancel`.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep().await;
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handshake;
    use gibberlink_core::types::Compression;

    fn handshake_fixture() -> Handshake {
        handshake::open(
            &Features {
                compression: Compression::Zstd,
                fec: true,
                crypto: false,
                max_mtu: Some(4096),
            },
            &Features {
                compression: Compression::Zstd,
                fec: true,
                crypto: false,
                max_mtu: Some(1500),
            },
            Address::parse("ws://peer.local/messages").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SessionStore::new();
        let handshake = handshake_fixture();
        let session = store.insert(&handshake).await;
        assert_eq!(session.features.max_mtu, Some(1500));

        let looked_up = store.get(&session.id).await.unwrap();
        assert_eq!(looked_up.id, session.id);
        assert_eq!(looked_up.transport, Protocol::Ws);
    }

    #[tokio::test]
    async fn test_unknown_id_returns_none() {
        let store = SessionStore::new();
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_deleted_on_lookup() {
        let store = SessionStore::new();
        let mut handshake = handshake_fixture();
        handshake.expires_at_us = 1; // already expired
        let session = store.insert(&handshake).await;

        assert!(store.get(&session.id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = SessionStore::new();
        let live = store.insert(&handshake_fixture()).await;

        let mut expired = handshake_fixture();
        expired.expires_at_us = 1;
        store.insert(&expired).await;

        assert_eq!(store.sweep().await, 1);
        assert!(store.get(&live.id).await.is_some());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_and_stops() {
        let store = Arc::new(SessionStore::new());
        let mut expired = handshake_fixture();
        expired.expires_at_us = 1;
        store.insert(&expired).await;

        let cancel = CancellationToken::new();
        let handle = store.spawn_sweeper(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len().await, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_expires_thirty_minutes_out() {
        let handshake = handshake_fixture();
        let now = gibberlink_core::types::now_us();
        let delta = handshake.expires_at_us.saturating_sub(now);
        let thirty_minutes_us = 30 * 60 * 1_000_000;
        assert!(delta > thirty_minutes_us - 5_000_000 && delta <= thirty_minutes_us + 5_000_000);
    }
}
