// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Layered configuration: defaults ← TOML file ← environment.
//!
//! The environment names follow the deployment contract exactly: `PORT`,
//! `API_KEYS`, `RATE_LIMIT_WINDOW`, `RATE_LIMIT_MAX_REQUESTS`,
//! `AUDIT_LOG_PATH`, `TRANSCRIPT_STORAGE_PATH`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Environment variables that override file configuration.
const ENV_KEYS: [&str; 6] = [
    "PORT",
    "API_KEYS",
    "RATE_LIMIT_WINDOW",
    "RATE_LIMIT_MAX_REQUESTS",
    "AUDIT_LOG_PATH",
    "TRANSCRIPT_STORAGE_PATH",
];

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log output format for the file layer.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    pub console_enable: bool,
    pub console_level: LogLevel,
    pub file_enable: bool,
    pub file_level: LogLevel,
    pub file_format: LogFormat,
    pub file_path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::Info,
            file_enable: false,
            file_level: LogLevel::Debug,
            file_format: LogFormat::Json,
            file_path: "logs/glinkd.log".to_string(),
        }
    }
}

/// Server configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    pub bind_address: String,
    /// `key:secret,key:secret` pairs; empty disables authentication.
    pub api_keys: String,
    /// Rate-limit window, seconds.
    pub rate_limit_window: u64,
    /// Requests allowed per key per window.
    pub rate_limit_max_requests: u32,
    pub audit_log_path: String,
    pub transcript_storage_path: String,
    /// Maximum decoded payload size accepted by the policy engine, bytes.
    pub max_payload_size: usize,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            api_keys: String::new(),
            rate_limit_window: 60,
            rate_limit_max_requests: 100,
            audit_log_path: "data/audit.jsonl".to_string(),
            transcript_storage_path: "data/transcripts".to_string(),
            max_payload_size: 1024 * 1024,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load defaults ← optional TOML file ← environment overrides.
    ///
    /// # Errors
    ///
    /// Returns figment extraction errors (bad types, malformed TOML).
    pub fn load(file: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::raw().only(&ENV_KEYS)).extract()
    }

    /// Parsed `key:secret` pairs.
    pub fn parsed_api_keys(&self) -> Vec<(String, String)> {
        self.api_keys
            .split(',')
            .filter_map(|pair| {
                let (key, secret) = pair.trim().split_once(':')?;
                if key.is_empty() || secret.is_empty() {
                    None
                } else {
                    Some((key.to_string(), secret.to_string()))
                }
            })
            .collect()
    }

    /// Render the default configuration as TOML (for `--print-config`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
