//! Frame constants and encoding.

use bytes::{BufMut, BytesMut};

/// Protocol signature carried in the high 16 bits of the header word.
pub const SIGNATURE: u16 = 0x2BAD;

/// Current protocol major version.
pub const VERSION_MAJOR: u8 = 1;

/// Current protocol minor version.
pub const VERSION_MINOR: u8 = 0;

/// Width of each fixed wire field in bytes.
pub const FIELD_SIZE: usize = 4;

/// Fixed per-frame overhead: header word + size + type.
pub const FRAME_OVERHEAD: usize = 3 * FIELD_SIZE;

/// A frame whose first word equals this value is a keep-alive probe.
pub const KEEPALIVE_WORD: u32 = 0;

/// Hard payload size cap (500 MiB). Frames above this are rejected.
pub const MAX_PAYLOAD_SIZE: u32 = 500 * 1024 * 1024;

/// Soft payload size threshold (128 MiB). Frames above this are logged.
pub const PAYLOAD_WARN_SIZE: u32 = 128 * 1024 * 1024;

/// Returns the header word for the current protocol version.
pub fn header_word() -> u32 {
    (u32::from(SIGNATURE) << 16) | (u32::from(VERSION_MAJOR) << 8) | u32::from(VERSION_MINOR)
}

/// Extracts the signature from a header word.
pub fn signature_of(word: u32) -> u16 {
    (word >> 16) as u16
}

/// Encodes a complete frame into `buf`.
///
/// The payload must already fit within [`MAX_PAYLOAD_SIZE`]; the caller is
/// responsible for refusing oversized messages before they reach the wire.
pub fn encode_frame(type_id: u32, payload: &[u8], buf: &mut BytesMut) {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE as usize);

    buf.reserve(FRAME_OVERHEAD + payload.len());
    buf.put_u32(header_word());
    buf.put_i32(payload.len() as i32);
    buf.put_u32(type_id);
    buf.put_slice(payload);
}

/// Returns the 4-byte keep-alive frame.
pub fn keepalive_frame() -> [u8; FIELD_SIZE] {
    KEEPALIVE_WORD.to_be_bytes()
}

#[cfg(test)]
mod frame_tests {
    use super::*;

    #[test]
    fn header_word_layout() {
        assert_eq!(header_word(), 0x2BAD_0100);
        assert_eq!(signature_of(header_word()), SIGNATURE);
    }

    #[test]
    fn signature_of_foreign_header() {
        assert_eq!(signature_of(0xDEAD_0100), 0xDEAD);
        assert_ne!(signature_of(0xDEAD_0100), SIGNATURE);
    }

    #[test]
    fn encode_frame_byte_layout() {
        let mut buf = BytesMut::new();
        encode_frame(5, &[0x01, 0x02, 0x03], &mut buf);

        assert_eq!(
            &buf[..],
            &[
                0x2B, 0xAD, 0x01, 0x00, // header
                0x00, 0x00, 0x00, 0x03, // size
                0x00, 0x00, 0x00, 0x05, // type
                0x01, 0x02, 0x03, // payload
            ]
        );
    }

    #[test]
    fn encode_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(7, &[], &mut buf);

        assert_eq!(buf.len(), FRAME_OVERHEAD);
        assert_eq!(&buf[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn keepalive_is_all_zero() {
        assert_eq!(keepalive_frame(), [0, 0, 0, 0]);
    }
}
