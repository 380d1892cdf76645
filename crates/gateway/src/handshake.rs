// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Capability negotiation.
//!
//! Negotiation is the pointwise AND/min over the two advertised feature
//! sets: a capability is on only when both sides advertise it, and the MTU
//! is the smaller of the two. Re-running with the same inputs yields the
//! same negotiated features (the session id and expiry differ).

use std::time::{Duration, SystemTime};

use serde::Serialize;
use uuid::Uuid;

use gibberlink_core::types::{Address, Compression, Features};

use crate::error::{GatewayError, Result};

/// Sessions expire 30 minutes after creation.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// MTU negotiated when a side does not advertise one.
const DEFAULT_MTU: u16 = 1500;

/// Valid negotiated MTU range.
const MTU_RANGE: std::ops::RangeInclusive<u16> = 64..=65535;

/// A successful handshake: negotiated features plus a fresh session
/// identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub session_id: String,
    pub negotiated: Features,
    pub peer: Address,
    /// Microseconds since the Unix epoch.
    pub expires_at_us: u64,
}

/// Pointwise feature negotiation.
///
/// # Errors
///
/// Returns [`GatewayError::Configuration`] when the negotiated MTU falls
/// outside [64, 65535].
pub fn negotiate(client: &Features, server: &Features) -> Result<Features> {
    let compression = if client.compression == Compression::Zstd
        && server.compression == Compression::Zstd
    {
        Compression::Zstd
    } else {
        Compression::None
    };

    let max_mtu = client
        .max_mtu
        .unwrap_or(DEFAULT_MTU)
        .min(server.max_mtu.unwrap_or(DEFAULT_MTU));
    if !MTU_RANGE.contains(&max_mtu) {
        return Err(GatewayError::Configuration(format!(
            "negotiated MTU {max_mtu} outside [64, 65535]"
        )));
    }

    Ok(Features {
        compression,
        fec: client.fec && server.fec,
        crypto: client.crypto && server.crypto,
        max_mtu: Some(max_mtu),
    })
}

/// Negotiate and mint a session identity.
///
/// # Errors
///
/// Propagates negotiation failures.
pub fn open(client: &Features, server: &Features, peer: Address) -> Result<Handshake> {
    let negotiated = negotiate(client, server)?;
    let expires_at = SystemTime::now() + SESSION_TTL;
    let expires_at_us = expires_at
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_micros() as u64);
    Ok(Handshake {
        session_id: Uuid::new_v4().to_string(),
        negotiated,
        peer,
        expires_at_us,
    })
}
