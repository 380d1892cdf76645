// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Composes codec + FEC + framer + reassembler into a single encode/decode
//! pair.
//!
//! Encode: `codec.encode → fec.encode → framer.frame`. Decode runs the
//! reverse, feeding chunked frames through the reassembler and re-verifying
//! the message CRC once reassembled. Decode failures are not errors; they
//! return `None` and the caller decides whether to surface or count them.

use std::sync::Mutex;

use crate::codec::Codec;
use crate::error::Result;
use crate::fec::Fec;
use crate::framer::{crc_over, FrameOptions, Framer};
use crate::reassembler::{Reassembler, ReassemblerStats};
use crate::types::{now_us, MessageMetadata, MsgId};
use crate::value::Value;

/// A fully decoded message.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub msg_id: MsgId,
    pub value: Value,
    pub metadata: MessageMetadata,
}

/// Protocol engine front door: one codec, optional FEC, shared framer and
/// reassembler. Stateless apart from reassembly; safe to share behind an
/// `Arc` (the reassembler sits under its own lock).
pub struct ProtocolProcessor {
    codec: Box<dyn Codec>,
    fec: Option<Box<dyn Fec>>,
    framer: Framer,
    reassembler: Mutex<Reassembler>,
}

impl ProtocolProcessor {
    pub fn new(codec: Box<dyn Codec>, fec: Option<Box<dyn Fec>>) -> Self {
        Self { codec, fec, framer: Framer, reassembler: Mutex::new(Reassembler::new()) }
    }

    pub fn codec_name(&self) -> &str {
        self.codec.name()
    }

    pub fn fec_name(&self) -> &str {
        self.fec.as_deref().map_or("none", Fec::name)
    }

    /// Encode a value into wire frames.
    ///
    /// # Errors
    ///
    /// Propagates codec failures and framing-limit violations.
    pub fn encode(
        &self,
        msg_id: MsgId,
        value: &Value,
        opts: &FrameOptions,
    ) -> Result<Vec<Vec<u8>>> {
        let mut bytes = self.codec.encode(value)?;
        if let Some(fec) = &self.fec {
            bytes = fec.encode(&bytes);
        }
        self.framer.frame(msg_id, &bytes, opts)
    }

    /// Decode the frames of one message.
    ///
    /// Returns `None` when no complete, CRC-valid message can be recovered
    /// from `frames` (bad frames are skipped; a partial chunked message stays
    /// buffered for a later call within the reassembly window).
    pub fn decode(&self, frames: &[Vec<u8>]) -> Option<Decoded> {
        let mut wire_size = 0usize;
        let mut complete: Option<(MsgId, Vec<u8>, u32)> = None;

        for bytes in frames {
            let Some(frame) = self.framer.deframe(bytes) else {
                tracing::debug!(len = bytes.len(), "discarding undecodable frame");
                continue;
            };
            wire_size += frame.payload.len();

            match frame.chunk {
                None => {
                    complete = Some((frame.msg_id, frame.payload, frame.crc32));
                    break;
                }
                Some(info) => {
                    let assembled = {
                        let mut reassembler = self.reassembler.lock().ok()?;
                        reassembler.add_chunk(frame.msg_id, info.index, info.total, frame.payload)
                    };
                    if let Some(assembled) = assembled {
                        if crc_over(frame.msg_id, &assembled) != frame.crc32 {
                            tracing::debug!(msg_id = %frame.msg_id, "reassembled CRC mismatch");
                            return None;
                        }
                        complete = Some((frame.msg_id, assembled, frame.crc32));
                        break;
                    }
                }
            }
        }

        let (msg_id, payload, crc) = complete?;
        let value = self.decode_payload(&payload)?;

        Some(Decoded {
            msg_id,
            value,
            metadata: MessageMetadata {
                timestamp_us: now_us(),
                transport: None,
                codec: self.codec.name().to_string(),
                fec: self.fec_name().to_string(),
                size: wire_size,
                frames: frames.len(),
                crc32: crc,
            },
        })
    }

    /// FEC-decode + codec-decode a payload that has already been deframed
    /// and (if chunked) reassembled. The audio pipeline enters here because
    /// the acoustic decoder deframes on its own.
    pub fn decode_payload(&self, payload: &[u8]) -> Option<Value> {
        let plain = match &self.fec {
            Some(fec) => fec.decode(payload)?,
            None => payload.to_vec(),
        };
        match self.codec.decode(&plain) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "codec decode failed");
                None
            }
        }
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.reassembler.lock().map(|r| r.stats()).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::{CborCodec, JsonCodec, MsgpackCodec};
    use crate::fec::StubRsFec;
    use proptest::prelude::*;

    fn compute_request() -> Value {
        Value::from_iter([
            ("op", Value::from("sum")),
            ("args", Value::from_iter([("a", Value::from(2)), ("b", Value::from(3))])),
            ("id", Value::from("req-1")),
        ])
    }

    #[test]
    fn test_single_frame_round_trip_msgpack() {
        let processor = ProtocolProcessor::new(Box::new(MsgpackCodec), None);
        let msg_id = MsgId::from_bytes(*b"abcd");
        let value = compute_request();

        let frames = processor.encode(msg_id, &value, &FrameOptions::default()).unwrap();
        assert_eq!(frames.len(), 1);

        let decoded = processor.decode(&frames).unwrap();
        assert_eq!(decoded.msg_id, msg_id);
        assert_eq!(decoded.value, value);
        assert_eq!(decoded.metadata.frames, 1);
        assert_eq!(decoded.metadata.codec, "msgpack");
    }

    #[test]
    fn test_chunked_round_trip_out_of_order() {
        let processor = ProtocolProcessor::new(Box::new(JsonCodec), None);
        let msg_id = MsgId::generate();
        let value = Value::from_iter([(
            "blob",
            Value::String("x".repeat(3000)),
        )]);

        let mut frames =
            processor.encode(msg_id, &value, &FrameOptions::with_max_frame_size(200)).unwrap();
        assert!(frames.len() >= 15);
        frames.reverse();

        let decoded = processor.decode(&frames).unwrap();
        assert_eq!(decoded.value, value);
    }

    #[test]
    fn test_missing_chunk_yields_none() {
        let processor = ProtocolProcessor::new(Box::new(JsonCodec), None);
        let value = Value::from_iter([("blob", Value::String("y".repeat(2000)))]);
        let mut frames = processor
            .encode(MsgId::generate(), &value, &FrameOptions::with_max_frame_size(200))
            .unwrap();
        frames.pop();
        assert!(processor.decode(&frames).is_none());
    }

    #[test]
    fn test_fec_round_trip() {
        let processor =
            ProtocolProcessor::new(Box::new(CborCodec), Some(Box::new(StubRsFec::default())));
        let value = compute_request();
        let frames =
            processor.encode(MsgId::generate(), &value, &FrameOptions::default()).unwrap();
        let decoded = processor.decode(&frames).unwrap();
        assert_eq!(decoded.value, value);
        assert_eq!(decoded.metadata.fec, "stub-rs");
    }

    #[test]
    fn test_corrupt_frame_yields_none() {
        let processor = ProtocolProcessor::new(Box::new(MsgpackCodec), None);
        let mut frames = processor
            .encode(MsgId::generate(), &compute_request(), &FrameOptions::default())
            .unwrap();
        let len = frames[0].len();
        frames[0][len / 2] ^= 0x40;
        assert!(processor.decode(&frames).is_none());
    }

    proptest! {
        #[test]
        fn prop_chunked_reassembly_matches_payload(
            text in "[a-z0-9 ]{500,4000}",
            mtu in 64usize..1500,
        ) {
            let processor = ProtocolProcessor::new(Box::new(JsonCodec), None);
            let value = Value::from_iter([("text", Value::from(text))]);
            let frames = processor
                .encode(MsgId::generate(), &value, &FrameOptions::with_max_frame_size(mtu))
                .unwrap();
            let decoded = processor.decode(&frames).unwrap();
            prop_assert_eq!(decoded.value, value);
        }

        #[test]
        fn prop_single_bit_flip_never_decodes(
            flip in any::<usize>(),
        ) {
            let processor = ProtocolProcessor::new(Box::new(MsgpackCodec), None);
            let frames = processor
                .encode(MsgId::from_bytes(*b"prop"), &compute_request(), &FrameOptions::default())
                .unwrap();
            let mut bytes = frames[0].clone();
            let bit = flip % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(processor.decode(&[bytes]).is_none());
        }
    }
}
