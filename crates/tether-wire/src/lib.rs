//! # tether-wire: wire format for the tether socket protocol
//!
//! This crate defines the framed wire protocol exchanged between two tether
//! endpoints over a TCP connection.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────────┐
//! │ Header   │ Size     │ Type     │     Payload      │
//! │ (4 B)    │ (4 B)    │ (4 B)    │     (var)        │
//! └──────────┴──────────┴──────────┴──────────────────┘
//! ```
//!
//! - **Header**: `(0x2BAD << 16) | (major << 8) | minor`
//! - **Size**: payload length in bytes (signed, must be >= 0)
//! - **Type**: numeric message-type identifier
//! - **Payload**: opaque bytes, decoded by the embedder's registry
//!
//! All multi-byte integers are big-endian. A lone 4-byte zero word is a
//! keep-alive frame and carries no further fields.
//!
//! ## Parsing
//!
//! [`WireMessage`] is an incremental parser designed for a read loop over a
//! socket with a receive timeout: every field is resumable, so a read that
//! returns `WouldBlock` mid-frame preserves all progress and the next call
//! to [`WireMessage::advance`] continues where the previous one left off.

mod frame;
mod parser;

pub use frame::{
    encode_frame, header_word, keepalive_frame, signature_of, FIELD_SIZE, FRAME_OVERHEAD,
    KEEPALIVE_WORD, MAX_PAYLOAD_SIZE, PAYLOAD_WARN_SIZE, SIGNATURE, VERSION_MAJOR, VERSION_MINOR,
};
pub use parser::{Frame, ParseFault, ParseStatus, Phase, WireMessage};
