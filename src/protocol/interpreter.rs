//! Tag-read notice interpretation
//!
//! Maps a validated [`Frame`] to a [`TagReading`]. Only notices carrying the
//! continuous-read result command are interpreted; everything else (command
//! echoes, acknowledgements, other notices) is ignored.
//!
//! Payload layout of a tag-read notice, sliced from the declared payload:
//!
//! ```text
//! RSSI(1) | PC(2) | EPC(12) | CRC(2)
//! ```

use super::frame::{Frame, FrameType};
use crate::types::{CaptureTime, PortId, Rssi, TagId, TagReading};

/// Command code of the continuous-read result notice
pub const CMD_TAG_READ: u8 = 0x22;

/// EPC length in bytes
pub const EPC_LEN: usize = 12;

const RSSI_OFFSET: usize = 0;
const EPC_OFFSET: usize = 3;

/// Interpret a frame as a tag reading from `port`, stamped with `captured`.
///
/// Returns `None` for frames that are not tag-read notices or whose payload
/// is too short to hold the RSSI and EPC fields.
pub fn interpret(frame: &Frame, port: &PortId, captured: CaptureTime) -> Option<TagReading> {
    if frame.frame_type() != FrameType::Notice || frame.command_code() != CMD_TAG_READ {
        return None;
    }

    let payload = frame.payload();
    let epc = payload.get(EPC_OFFSET..EPC_OFFSET + EPC_LEN)?;
    let rssi = Rssi::from_raw(payload[RSSI_OFFSET]);

    Some(TagReading { tag: TagId::from_epc(epc), rssi, port: port.clone(), captured })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameDecoder;
    use crate::test_utils::tag_notice_bytes;

    const EPC: [u8; 12] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn decode_one(bytes: &[u8]) -> Frame {
        let mut frames = FrameDecoder::new().feed(bytes);
        assert_eq!(frames.len(), 1, "expected exactly one frame");
        frames.remove(0)
    }

    #[test]
    fn tag_notice_yields_reading() {
        let frame = decode_one(&tag_notice_bytes(0xC8, EPC));
        let port = PortId::from("/dev/ttyUSB0");

        let reading = interpret(&frame, &port, CaptureTime::now()).expect("tag notice");

        assert_eq!(reading.tag.as_str(), "AABBCCDDEEFF001122334455");
        assert_eq!(reading.rssi.dbm(), -56);
        assert_eq!(reading.port, port);
    }

    #[test]
    fn interpretation_is_idempotent() {
        let frame = decode_one(&tag_notice_bytes(0x9C, EPC));
        let port = PortId::from("COM4");
        let captured = CaptureTime::now();

        let first = interpret(&frame, &port, captured);
        let second = interpret(&frame, &port, captured);

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn command_echo_is_ignored() {
        let frame = Frame::command(CMD_TAG_READ, &[0x22, 0xFF, 0xFF]);
        assert!(interpret(&frame, &PortId::from("p"), CaptureTime::now()).is_none());
    }

    #[test]
    fn other_notice_commands_are_ignored() {
        let mut bytes = tag_notice_bytes(0xC8, EPC);
        // Swap the command code to 0xFF and fix up the checksum
        bytes[2] = 0xFF;
        let end = bytes.len() - 2;
        bytes[end] = crate::protocol::checksum(&bytes[1..end]);

        let frame = decode_one(&bytes);
        assert!(interpret(&frame, &PortId::from("p"), CaptureTime::now()).is_none());
    }

    #[test]
    fn short_payload_is_ignored() {
        let frame = Frame::validated(FrameType::Notice, CMD_TAG_READ, vec![0xC8, 0x30, 0x00, 0xAA].into());
        assert!(interpret(&frame, &PortId::from("p"), CaptureTime::now()).is_none());
    }
}
