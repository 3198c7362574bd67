//! Validated protocol frames
//!
//! Wire layout:
//!
//! ```text
//! START(0xBB) | TYPE | CMD | LEN (u16, big-endian) | PAYLOAD | CHECKSUM | END(0x7E)
//! ```
//!
//! The checksum is the low byte of the sum of every byte from TYPE through the
//! last payload byte.

use bytes::{BufMut, Bytes, BytesMut};

/// Start-of-frame marker
pub const FRAME_START: u8 = 0xBB;

/// End-of-frame marker
pub const FRAME_END: u8 = 0x7E;

/// START + TYPE + CMD + LEN(2)
pub const HEADER_LEN: usize = 5;

/// CHECKSUM + END
pub const TRAILER_LEN: usize = 2;

/// Smallest possible frame (empty payload)
pub const MIN_FRAME_LEN: usize = HEADER_LEN + TRAILER_LEN;

/// Largest payload the decoder accepts before treating a length field as noise
pub const MAX_PAYLOAD_LEN: usize = 512;

/// Frame type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Host-to-reader command (0x00)
    Command,
    /// Reader acknowledgement of a command (0x01)
    Response,
    /// Unsolicited reader notification (0x02)
    Notice,
    /// Any other type byte
    Other(u8),
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => FrameType::Command,
            0x01 => FrameType::Response,
            0x02 => FrameType::Notice,
            other => FrameType::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            FrameType::Command => 0x00,
            FrameType::Response => 0x01,
            FrameType::Notice => 0x02,
            FrameType::Other(byte) => byte,
        }
    }
}

/// A checksum-validated protocol frame.
///
/// Inbound frames are only produced by [`FrameDecoder`](super::FrameDecoder)
/// after trailer and checksum validation. Outbound frames are built with
/// [`Frame::command`] and serialized with [`Frame::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    command: u8,
    payload: Bytes,
}

impl Frame {
    /// Constructor for the decoder once validation has passed.
    pub(crate) fn validated(frame_type: FrameType, command: u8, payload: Bytes) -> Self {
        Self { frame_type, command, payload }
    }

    /// Build a host-to-reader command frame.
    ///
    /// Payloads longer than `u16::MAX` are truncated to the encodable length.
    pub fn command(command: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(u16::MAX as usize);
        Self {
            frame_type: FrameType::Command,
            command,
            payload: Bytes::copy_from_slice(&payload[..len]),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn command_code(&self) -> u8 {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Declared payload length as carried in the LEN field
    pub fn payload_len(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Total encoded length including markers
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + TRAILER_LEN
    }

    /// Checksum byte for this frame
    pub fn checksum(&self) -> u8 {
        let len = self.payload_len().to_be_bytes();
        let header = [self.frame_type.as_byte(), self.command, len[0], len[1]];
        checksum(header.iter().chain(self.payload.iter()))
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(FRAME_START);
        buf.put_u8(self.frame_type.as_byte());
        buf.put_u8(self.command);
        buf.put_u16(self.payload_len());
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum());
        buf.put_u8(FRAME_END);
        buf.freeze()
    }
}

/// Low byte of the sum of the given bytes.
pub fn checksum<'a>(bytes: impl IntoIterator<Item = &'a u8>) -> u8 {
    bytes.into_iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_command_encodes_to_reader_bytes() {
        let frame = Frame::command(0x28, &[]);
        assert_eq!(frame.encode().as_ref(), &[0xBB, 0x00, 0x28, 0x00, 0x00, 0x28, 0x7E]);
    }

    #[test]
    fn power_command_checksum_wraps() {
        // 0x00 + 0xB6 + 0x00 + 0x02 + 0x0A + 0x28 = 0xEA
        let frame = Frame::command(0xB6, &[0x0A, 0x28]);
        assert_eq!(frame.checksum(), 0xEA);
        assert_eq!(frame.wire_len(), 9);

        // 0x27 + 0x03 + 0x22 + 0xFF + 0xFF = 0x24A, low byte 0x4A
        let read = Frame::command(0x27, &[0x22, 0xFF, 0xFF]);
        assert_eq!(read.checksum(), 0x4A);
    }

    #[test]
    fn frame_type_round_trips_unknown_bytes() {
        assert_eq!(FrameType::from_byte(0x02), FrameType::Notice);
        assert_eq!(FrameType::from_byte(0xFF), FrameType::Other(0xFF));
        assert_eq!(FrameType::Other(0x42).as_byte(), 0x42);
    }
}
