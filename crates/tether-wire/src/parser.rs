//! Incremental frame parser.
//!
//! [`WireMessage`] consumes one frame at a time from a byte source, holding
//! whatever partial state a short read leaves behind. It is built for a
//! socket with a receive timeout: `WouldBlock`/`TimedOut` pauses the parse
//! with all progress retained, and the next [`WireMessage::advance`] call
//! resumes from the exact byte where the previous one stopped.

use std::io::{self, ErrorKind, Read};
use std::mem;

use tracing::warn;

use crate::frame::{
    signature_of, FIELD_SIZE, KEEPALIVE_WORD, MAX_PAYLOAD_SIZE, PAYLOAD_WARN_SIZE, SIGNATURE,
};

/// Parse phase of the in-flight frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the 4-byte header word.
    Header,
    /// Waiting for the payload size.
    Size,
    /// Waiting for the message type id.
    Type,
    /// Accumulating payload bytes.
    Data,
}

/// A completely received frame, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Numeric message-type identifier.
    pub type_id: u32,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// Why an in-flight frame was discarded.
///
/// All faults are recoverable at the connection level: the parser resets to
/// the next frame boundary and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ParseFault {
    /// The header word did not carry the protocol signature.
    #[error("header signature mismatch: got 0x{header:08x}")]
    SignatureMismatch { header: u32 },

    /// The declared payload size was negative.
    #[error("negative payload size: {size}")]
    NegativeSize { size: i32 },

    /// The declared payload size exceeded the hard cap.
    #[error("payload size {size} exceeds maximum {max}")]
    OversizedPayload { size: u32, max: u32 },

    /// The size field could not be read (EOF or hard error mid-frame).
    #[error("payload size unreadable")]
    SizeUnreadable,

    /// A hard read error interrupted the payload.
    #[error("read failed mid-payload: {0}")]
    PayloadReadFailed(io::Error),

    /// The frame completed but had been marked invalid along the way.
    /// Discarded without an error report.
    #[error("frame marked invalid")]
    InvalidFrame,
}

/// Outcome of one parser tick.
#[derive(Debug)]
pub enum ParseStatus {
    /// No progress possible right now; all state preserved.
    Idle,
    /// A keep-alive word arrived at a frame boundary. Nothing to do.
    KeepAlive,
    /// A valid frame completed.
    Complete(Frame),
    /// The in-flight frame was discarded; the parser reset to Header.
    Rejected(ParseFault),
    /// The payload buffer could not be allocated. The caller should treat
    /// the connection as unusable.
    OutOfMemory,
}

/// Result of accumulating one 4-byte field.
enum FieldRead {
    /// All four bytes arrived.
    Word(u32),
    /// EAGAIN/timeout; partial bytes retained for the next tick.
    Stalled,
    /// The peer closed the stream (read returned 0).
    Closed,
    /// Hard I/O error.
    Failed(io::Error),
}

/// The in-flight receive record for one frame.
///
/// Invariants: `received <= size`; `size` is frozen once the Size phase
/// completes; the payload buffer is allocated exactly once, on exit from the
/// Type phase; a frame is dispatched only when complete and valid.
#[derive(Debug)]
pub struct WireMessage {
    phase: Phase,
    /// Accumulator for the 4-byte fixed fields, so a field split across
    /// reads survives the gap.
    field: [u8; FIELD_SIZE],
    field_len: usize,
    size: usize,
    type_id: u32,
    payload: Vec<u8>,
    received: usize,
    valid: bool,
}

impl Default for WireMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl WireMessage {
    /// Creates a parser at a frame boundary.
    pub fn new() -> Self {
        Self {
            phase: Phase::Header,
            field: [0u8; FIELD_SIZE],
            field_len: 0,
            size: 0,
            type_id: 0,
            payload: Vec::new(),
            received: 0,
            valid: true,
        }
    }

    /// Current parse phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Payload bytes received so far.
    pub fn bytes_received(&self) -> usize {
        self.received
    }

    /// Returns true if a partial frame (or partial field) is in flight.
    pub fn in_flight(&self) -> bool {
        self.phase != Phase::Header || self.field_len > 0
    }

    /// Discards the in-flight frame and returns to the frame boundary.
    pub fn reset(&mut self) {
        self.phase = Phase::Header;
        self.field_len = 0;
        self.size = 0;
        self.type_id = 0;
        self.payload = Vec::new();
        self.received = 0;
        self.valid = true;
    }

    /// Performs one parser tick against `src`.
    ///
    /// Makes at most one pass Header → Size → Type → Data for a single
    /// frame, falling through phases while bytes keep arriving. Returns
    /// [`ParseStatus::Idle`] as soon as the source stalls; nothing consumed
    /// so far is lost.
    pub fn advance<R: Read>(&mut self, src: &mut R) -> ParseStatus {
        if self.phase == Phase::Header {
            let word = match self.read_field(src) {
                FieldRead::Word(word) => word,
                // An unreadable header word takes the keep-alive return:
                // state is untouched and the liveness probe decides whether
                // the connection is still good.
                FieldRead::Stalled | FieldRead::Closed | FieldRead::Failed(_) => {
                    return ParseStatus::Idle;
                }
            };

            if word == KEEPALIVE_WORD {
                return ParseStatus::KeepAlive;
            }

            if signature_of(word) != SIGNATURE {
                self.reset();
                return ParseStatus::Rejected(ParseFault::SignatureMismatch { header: word });
            }

            // The minor version is deliberately not checked; the signature
            // is the only identity test.
            self.phase = Phase::Size;
        }

        if self.phase == Phase::Size {
            let word = match self.read_field(src) {
                FieldRead::Word(word) => word,
                FieldRead::Stalled => return ParseStatus::Idle,
                FieldRead::Closed | FieldRead::Failed(_) => {
                    self.reset();
                    return ParseStatus::Rejected(ParseFault::SizeUnreadable);
                }
            };

            let size = word as i32;
            if size < 0 {
                self.reset();
                return ParseStatus::Rejected(ParseFault::NegativeSize { size });
            }
            let size = size as u32;
            if size > MAX_PAYLOAD_SIZE {
                self.reset();
                return ParseStatus::Rejected(ParseFault::OversizedPayload {
                    size,
                    max: MAX_PAYLOAD_SIZE,
                });
            }
            if size >= PAYLOAD_WARN_SIZE {
                warn!(size, "payload size above warning threshold");
            }

            self.size = size as usize;
            self.phase = Phase::Type;
        }

        if self.phase == Phase::Type {
            match self.read_field(src) {
                FieldRead::Word(word) => self.type_id = word,
                FieldRead::Stalled => return ParseStatus::Idle,
                FieldRead::Closed | FieldRead::Failed(_) => {
                    // Keep consuming the declared payload so the stream stays
                    // framed, but never dispatch the result.
                    self.field_len = 0;
                    self.type_id = 0;
                    self.valid = false;
                }
            }

            if self.allocate_payload().is_err() {
                self.reset();
                return ParseStatus::OutOfMemory;
            }
            self.phase = Phase::Data;
        }

        // Data phase: read until the frame completes or the source stalls.
        while self.received < self.size {
            match src.read(&mut self.payload[self.received..]) {
                Ok(0) => return ParseStatus::Idle,
                Ok(n) => self.received += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if is_again(e) => return ParseStatus::Idle,
                Err(e) => {
                    self.reset();
                    return ParseStatus::Rejected(ParseFault::PayloadReadFailed(e));
                }
            }
        }

        if !self.valid {
            self.reset();
            return ParseStatus::Rejected(ParseFault::InvalidFrame);
        }

        let frame = Frame {
            type_id: self.type_id,
            payload: mem::take(&mut self.payload),
        };
        self.reset();
        ParseStatus::Complete(frame)
    }

    /// Accumulates one big-endian 4-byte field, resumable across ticks.
    fn read_field<R: Read>(&mut self, src: &mut R) -> FieldRead {
        while self.field_len < FIELD_SIZE {
            let mut chunk = [0u8; FIELD_SIZE];
            match src.read(&mut chunk[..FIELD_SIZE - self.field_len]) {
                Ok(0) => return FieldRead::Closed,
                Ok(n) => {
                    self.field[self.field_len..self.field_len + n].copy_from_slice(&chunk[..n]);
                    self.field_len += n;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if is_again(e) => return FieldRead::Stalled,
                Err(e) => return FieldRead::Failed(e),
            }
        }

        self.field_len = 0;
        FieldRead::Word(u32::from_be_bytes(self.field))
    }

    fn allocate_payload(&mut self) -> Result<(), std::collections::TryReserveError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(self.size)?;
        buf.resize(self.size, 0);
        self.payload = buf;
        self.received = 0;
        Ok(())
    }
}

/// EAGAIN in both spellings a timed-out blocking read can produce.
fn is_again(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
