// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Gibberlink Core - Protocol engine for the Gibberlink gateway.
//!
//! This crate implements the wire-level half of the gateway:
//!
//! ## Core Modules
//!
//! - [`value`]: Heterogeneous payload tree ([`Value`]) shared by every codec
//! - [`crc32`]: CRC-32 (IEEE 802.3) calculation and verification
//! - [`codec`]: Symmetric byte↔value codecs (MessagePack, CBOR, JSON) plus the
//!   optional compression wrapper
//! - [`framer`]: GLIN v1 frame/deframe with chunking for oversize payloads
//! - [`reassembler`]: Collects chunked frames into complete messages with
//!   timeout garbage collection
//! - [`fec`]: Pluggable forward error correction (no-op, stub-RS, loss
//!   simulator)
//! - [`processor`]: Composes codec + FEC + framer + reassembler into a single
//!   `encode()`/`decode()` pair
//! - [`types`]: Addresses, negotiated features, message ids and metadata
//! - [`error`]: Error types and handling
//!
//! ## Quick Start
//!
//! ```
//! use gibberlink_core::codec::MsgpackCodec;
//! use gibberlink_core::framer::FrameOptions;
//! use gibberlink_core::processor::ProtocolProcessor;
//! use gibberlink_core::types::MsgId;
//! use gibberlink_core::Value;
//!
//! let processor = ProtocolProcessor::new(Box::new(MsgpackCodec), None);
//! let payload = Value::from_iter([("op", Value::from("sum"))]);
//! let frames = processor
//!     .encode(MsgId::generate(), &payload, &FrameOptions::default())
//!     .unwrap();
//! let decoded = processor.decode(&frames).unwrap();
//! assert_eq!(decoded.value, payload);
//! ```

// Module declarations
pub mod codec;
pub mod crc32;
pub mod error;
pub mod fec;
pub mod framer;
pub mod processor;
pub mod reassembler;
pub mod types;
pub mod value;

// Convenience re-exports for commonly used types

// Error handling
pub use error::CoreError;

// Payload tree
pub use value::Value;

// Wire format
pub use framer::{Frame, FrameOptions, Framer};
pub use reassembler::{Reassembler, ReassemblerStats};

// Codecs and FEC seams
pub use codec::{codec_for_name, Codec};
pub use fec::{fec_for_name, Fec};

// Composition
pub use processor::{Decoded, ProtocolProcessor};

// Common identifiers and metadata
pub use types::{Address, Compression, Features, MessageMetadata, MsgId, PipelineFrame, Protocol};
