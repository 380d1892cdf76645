// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Fixed protocol glossary, matched case-insensitively against rendered
//! text.

use indexmap::IndexMap;

const TERMS: [(&str, &str); 10] = [
    ("frame", "unit of wire data with header, payload and CRC"),
    ("FEC", "forward error correction; redundancy that lets a receiver recover from some transmission errors"),
    ("MTU", "maximum transmission unit, the largest frame size"),
    ("FSK", "frequency-shift keying; data encoded by selecting among a small set of tones"),
    ("Goertzel", "single-frequency DFT bin computed efficiently as a second-order IIR filter"),
    ("preamble", "deterministic symbol sequence used for frame acquisition and timing"),
    ("CRC", "cyclic redundancy check guarding frame integrity"),
    ("codec", "symmetric encoder/decoder between payload values and bytes"),
    ("session", "negotiated, time-bounded context identifying a peer and feature set"),
    ("handshake", "feature negotiation that opens a session"),
];

/// Terms from the fixed glossary that occur in `text`, with definitions, in
/// glossary order.
pub fn extract(text: &str) -> IndexMap<String, String> {
    let haystack = text.to_lowercase();
    TERMS
        .iter()
        .filter(|(term, _)| haystack.contains(&term.to_lowercase()))
        .map(|(term, def)| ((*term).to_string(), (*def).to_string()))
        .collect()
}
