// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Payload redaction for human-facing output.
//!
//! The rules mirror the policy engine's scan, with two differences: the
//! replacement string is `«redacted»` for every rule, and sensitive names
//! also match as substrings of the dotted field path (so `auth.api_key.value`
//! is caught by `key`). Redaction never mutates the input and is idempotent.

use std::sync::OnceLock;

use regex::Regex;

use gibberlink_core::Value;

/// Replacement for redacted values in englishized output.
pub const REDACTED_PLACEHOLDER: &str = "«redacted»";

/// Key denylist shared with the policy engine (matched case-insensitively).
pub const SENSITIVE_KEYS: [&str; 5] = ["password", "secret", "token", "key", "credential"];

/// PII patterns: SSN, 16-digit card number with optional separators, email,
/// 10-digit phone.
pub fn pii_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b\d{3}-\d{2}-\d{4}\b",
            r"\b(?:\d[ -]?){15}\d\b",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            r"\b\d{10}\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Returns true when `text` matches any PII pattern.
pub fn contains_pii(text: &str) -> bool {
    pii_patterns().iter().any(|re| re.is_match(text))
}

/// Recursive redactor over [`Value`] trees.
pub struct Redactor {
    sensitive_names: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            sensitive_names: SENSITIVE_KEYS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Redactor {
    /// Extend the default denylist with additional sensitive names.
    pub fn with_sensitive_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut redactor = Self::default();
        redactor.sensitive_names.extend(names.into_iter().map(|n| n.to_lowercase()));
        redactor
    }

    /// Deep-copy `value` with sensitive entries replaced by
    /// [`REDACTED_PLACEHOLDER`]. Returns the copy and the dotted paths that
    /// were redacted.
    pub fn redact(&self, value: &Value) -> (Value, Vec<String>) {
        let mut redactions = Vec::new();
        let redacted = self.walk(value, "", &mut redactions);
        (redacted, redactions)
    }

    fn is_sensitive(&self, key: &str, path: &str) -> bool {
        let key = key.to_lowercase();
        let path = path.to_lowercase();
        self.sensitive_names.iter().any(|name| key == *name || path.contains(name.as_str()))
    }

    fn walk(&self, value: &Value, path: &str, redactions: &mut Vec<String>) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = indexmap::IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    let child_path =
                        if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    if self.is_sensitive(key, &child_path) {
                        if child.as_str() != Some(REDACTED_PLACEHOLDER) {
                            redactions.push(child_path);
                        }
                        out.insert(key.clone(), Value::from(REDACTED_PLACEHOLDER));
                    } else {
                        out.insert(key.clone(), self.walk(child, &child_path, redactions));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items.iter().map(|item| self.walk(item, path, redactions)).collect(),
            ),
            Value::String(s) => {
                if s != REDACTED_PLACEHOLDER && contains_pii(s) {
                    redactions.push(path.to_string());
                    Value::from(REDACTED_PLACEHOLDER)
                } else {
                    value.clone()
                }
            }
            _ => value.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn login_payload() -> Value {
        Value::from_iter([
            ("op", Value::from("login")),
            (
                "args",
                Value::from_iter([
                    ("username", Value::from("john_doe")),
                    ("password", Value::from("secret123")),
                    ("email", Value::from("john@example.com")),
                ]),
            ),
        ])
    }

    #[test]
    fn test_denylist_key_redaction() {
        let (redacted, paths) = Redactor::default().redact(&login_payload());
        assert_eq!(
            redacted.get_path("args.password").and_then(Value::as_str),
            Some(REDACTED_PLACEHOLDER)
        );
        assert!(paths.contains(&"args.password".to_string()));
        // Untouched sibling.
        assert_eq!(redacted.get_path("args.username").and_then(Value::as_str), Some("john_doe"));
    }

    #[test]
    fn test_pii_string_redaction() {
        let (redacted, paths) = Redactor::default().redact(&login_payload());
        assert_eq!(
            redacted.get_path("args.email").and_then(Value::as_str),
            Some(REDACTED_PLACEHOLDER)
        );
        assert!(paths.contains(&"args.email".to_string()));
    }

    #[test]
    fn test_dotted_path_substring_match() {
        let payload = Value::from_iter([(
            "auth",
            Value::from_iter([(
                "api_key",
                Value::from_iter([("value", Value::from("abc123"))]),
            )]),
        )]);
        let (redacted, _) = Redactor::default().redact(&payload);
        // "key" is a substring of the dotted path "auth.api_key".
        assert_eq!(
            redacted.get_path("auth.api_key").and_then(Value::as_str),
            Some(REDACTED_PLACEHOLDER)
        );
    }

    #[test]
    fn test_idempotent() {
        let redactor = Redactor::default();
        let (once, _) = redactor.redact(&login_payload());
        let (twice, second_paths) = redactor.redact(&once);
        assert_eq!(once, twice);
        assert!(second_paths.is_empty());
    }

    #[test]
    fn test_pii_patterns() {
        assert!(contains_pii("my ssn is 123-45-6789"));
        assert!(contains_pii("card 4111 1111 1111 1111 ok"));
        assert!(contains_pii("mail me at a.b@c.io"));
        assert!(contains_pii("call 5551234567 now"));
        assert!(!contains_pii("nothing sensitive here"));
        assert!(!contains_pii(REDACTED_PLACEHOLDER));
    }

    #[test]
    fn test_original_not_mutated() {
        let payload = login_payload();
        let _ = Redactor::default().redact(&payload);
        assert_eq!(payload.get_path("args.password").and_then(Value::as_str), Some("secret123"));
    }
}
