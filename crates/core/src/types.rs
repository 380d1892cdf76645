// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Common identifiers, addresses and metadata that flow through the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CoreError, Result};

/// Current time as microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_micros() as u64)
}

/// Four-byte message identifier embedded in every frame.
///
/// Generated ids take the first four bytes of a nanoid, so they are printable
/// and filesystem-safe; ids recovered off the wire can be arbitrary bytes and
/// render as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgId([u8; 4]);

impl MsgId {
    /// Fresh random id.
    pub fn generate() -> Self {
        let id = nanoid::nanoid!(8);
        let bytes = id.as_bytes();
        Self([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            for b in self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:02x}{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2], self.0[3])
        }
    }
}

impl FromStr for MsgId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 4 {
            return Ok(Self([bytes[0], bytes[1], bytes[2], bytes[3]]));
        }
        if s.len() == 8 {
            if let Ok(raw) = u32::from_str_radix(s, 16) {
                return Ok(Self(raw.to_be_bytes()));
            }
        }
        Err(CoreError::Configuration(format!("invalid msgId '{s}'")))
    }
}

impl Serialize for MsgId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MsgId {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transport protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ws,
    Udp,
    Audio,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Udp => "udp",
            Self::Audio => "audio",
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::Ws => 80,
            Self::Udp => 9999,
            Self::Audio => 44100,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peer address: transport scheme, host, port and optional path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Address {
    /// Parse a peer URI (`ws://`, `wss://`, `udp://`, `audio://`).
    ///
    /// Missing ports fall back to per-scheme defaults: ws 80, udp 9999,
    /// audio 44100 (the "port" of an audio address is its sample rate).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Address`] for unparseable URIs or unknown schemes.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = url::Url::parse(uri).map_err(|e| CoreError::Address(format!("{uri}: {e}")))?;
        let protocol = match url.scheme() {
            "ws" | "wss" => Protocol::Ws,
            "udp" => Protocol::Udp,
            "audio" => Protocol::Audio,
            other => {
                return Err(CoreError::Address(format!("unsupported scheme '{other}'")));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| CoreError::Address(format!("{uri}: missing host")))?
            .to_string();
        let port = url.port().unwrap_or_else(|| protocol.default_port());
        let path = match url.path() {
            "" | "/" => None,
            p => Some(p.to_string()),
        };
        Ok(Self { protocol, host, port, path })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.protocol, self.host, self.port, self.path.as_deref().unwrap_or(""))
    }
}

/// Negotiable payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
    #[default]
    None,
}

/// Feature set advertised during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    pub compression: Compression,
    pub fec: bool,
    pub crypto: bool,
    /// Largest frame this peer accepts, bytes. `None` means "use defaults".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_mtu: Option<u16>,
}

impl Default for Features {
    fn default() -> Self {
        Self { compression: Compression::None, fec: false, crypto: false, max_mtu: None }
    }
}

/// Per-message wire metadata, reported alongside decoded payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub timestamp_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Protocol>,
    pub codec: String,
    pub fec: String,
    /// Total payload bytes on the wire (after FEC expansion).
    pub size: usize,
    /// Number of frames the message occupied.
    pub frames: usize,
    pub crc32: u32,
}

/// A payload recovered from the acoustic PHY, before protocol decode.
#[derive(Debug, Clone)]
pub struct PipelineFrame {
    pub msg_id: MsgId,
    pub payload: Vec<u8>,
    pub timestamp_us: u64,
    pub snr_db: f32,
    /// Symbol-detection success ratio in [0, 1] for the acquisition window.
    pub lock_pct: f32,
    pub crc_valid: bool,
    pub chunk_index: Option<u8>,
    pub total_chunks: Option<u8>,
}
