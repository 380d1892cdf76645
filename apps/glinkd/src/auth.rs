// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! API-key authentication.
//!
//! Clients present their secret in the `x-api-key` header; the configured
//! `key:secret` pairs map it back to an actor name for the audit trail. An
//! empty key set disables authentication (development mode) and every
//! request runs as `anonymous`.

use std::collections::HashMap;

use axum::http::HeaderMap;

/// Parsed key material.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// secret → actor (key name).
    by_secret: HashMap<String, String>,
}

impl ApiKeys {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { by_secret: pairs.into_iter().map(|(key, secret)| (secret, key)).collect() }
    }

    pub fn is_enabled(&self) -> bool {
        !self.by_secret.is_empty()
    }

    /// Resolve the actor for a request, or `None` when the key is missing
    /// or wrong.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        if !self.is_enabled() {
            return Some("anonymous".to_string());
        }
        let secret = headers.get("x-api-key")?.to_str().ok()?;
        self.by_secret.get(secret).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn keys() -> ApiKeys {
        ApiKeys::from_pairs(vec![
            ("alice".to_string(), "s3cret".to_string()),
            ("bob".to_string(), "hunter2".to_string()),
        ])
    }

    #[test]
    fn test_valid_key_maps_to_actor() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("hunter2"));
        assert_eq!(keys().authenticate(&headers), Some("bob".to_string()));
    }

    #[test]
    fn test_missing_or_wrong_key_rejected() {
        let headers = HeaderMap::new();
        assert!(keys().authenticate(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("nope"));
        assert!(keys().authenticate(&headers).is_none());
    }

    #[test]
    fn test_disabled_auth_allows_anonymous() {
        let headers = HeaderMap::new();
        assert_eq!(
            ApiKeys::default().authenticate(&headers),
            Some("anonymous".to_string())
        );
    }
}
