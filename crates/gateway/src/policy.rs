// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Policy engine: size limits, allowlists, denylist/PII redaction and
//! content hashing.
//!
//! `check` never raises for runtime denials; the outcome is a
//! [`PolicyDecision`] the caller routes (403 at the API boundary, a counted
//! drop at the pipeline boundary). The scan works on a deep copy; the
//! original payload is never mutated. Scanning is commutative over disjoint
//! keys, so evaluation order cannot change an allow into a deny.

use serde::Serialize;
use sha2::{Digest, Sha256};

use gibberlink_core::Value;
use gibberlink_englishizer::redact::{pii_patterns, SENSITIVE_KEYS};

/// Replacement for denylisted keys.
const KEY_REDACTED: &str = "[REDACTED]";
/// Replacement for strings matching a PII pattern.
const PII_REDACTED: &str = "[PII_REDACTED]";

/// Policy configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Maximum canonical-JSON payload size, bytes.
    pub max_payload_size: usize,
    pub transport_allowlist: Vec<String>,
    pub codec_allowlist: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1024 * 1024,
            transport_allowlist: vec!["ws".to_string(), "udp".to_string(), "audio".to_string()],
            codec_allowlist: vec![
                "msgpack".to_string(),
                "cbor".to_string(),
                "json".to_string(),
                "msgpackzstd".to_string(),
                "cborzstd".to_string(),
                "jsonzstd".to_string(),
            ],
        }
    }
}

/// Request attributes checked against the allowlists.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    pub transport: Option<String>,
    pub codec: Option<String>,
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Dotted paths that were redacted in the scanned copy.
    pub redacted_fields: Vec<String>,
    pub pii_detected: bool,
    /// SHA-256 of the canonical JSON, lowercase hex, for the audit trail.
    pub payload_hash: String,
    /// Canonical-JSON size, bytes.
    pub payload_size: usize,
}

impl PolicyDecision {
    pub fn decision_str(&self) -> &'static str {
        if self.allowed {
            "allow"
        } else {
            "deny"
        }
    }
}

/// Stateless policy evaluator; safe to call concurrently.
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl PolicyEngine {
    pub const fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Evaluate one payload against the policy.
    pub fn check(&self, payload: &Value, ctx: &PolicyContext) -> PolicyDecision {
        let canonical = payload.to_canonical_json();
        let payload_size = canonical.len();
        let payload_hash = hex_digest(&canonical);

        if payload_size > self.config.max_payload_size {
            return PolicyDecision {
                allowed: false,
                reason: Some(format!(
                    "payload of {payload_size} bytes exceeds limit {}",
                    self.config.max_payload_size
                )),
                redacted_fields: Vec::new(),
                pii_detected: false,
                payload_hash,
                payload_size,
            };
        }

        let mut redacted_fields = Vec::new();
        let mut pii_detected = false;
        let _scanned = scan(payload, "", &mut redacted_fields, &mut pii_detected);

        if let Some(transport) = &ctx.transport {
            if !self.config.transport_allowlist.iter().any(|t| t == transport) {
                return PolicyDecision {
                    allowed: false,
                    reason: Some(format!("transport '{transport}' not allowed")),
                    redacted_fields,
                    pii_detected,
                    payload_hash,
                    payload_size,
                };
            }
        }
        if let Some(codec) = &ctx.codec {
            if !self.config.codec_allowlist.iter().any(|c| c == codec) {
                return PolicyDecision {
                    allowed: false,
                    reason: Some(format!("codec '{codec}' not allowed")),
                    redacted_fields,
                    pii_detected,
                    payload_hash,
                    payload_size,
                };
            }
        }

        PolicyDecision {
            allowed: true,
            reason: None,
            redacted_fields,
            pii_detected,
            payload_hash,
            payload_size,
        }
    }
}

/// Recursive denylist + PII scan over a deep copy.
fn scan(value: &Value, path: &str, redacted: &mut Vec<String>, pii: &mut bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, child) in map {
                let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                if SENSITIVE_KEYS.iter().any(|name| key.eq_ignore_ascii_case(name)) {
                    if child.as_str() != Some(KEY_REDACTED) {
                        redacted.push(child_path);
                    }
                    out.insert(key.clone(), Value::from(KEY_REDACTED));
                } else {
                    out.insert(key.clone(), scan(child, &child_path, redacted, pii));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| scan(item, path, redacted, pii)).collect())
        }
        Value::String(s) => {
            if s != PII_REDACTED && pii_patterns().iter().any(|re| re.is_match(s)) {
                *pii = true;
                redacted.push(path.to_string());
                Value::from(PII_REDACTED)
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    }
}

fn hex_digest(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
