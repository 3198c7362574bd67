//! Byte-stream frame resynchronizer
//!
//! Serial reads deliver arbitrary slices of the reader's output: partial
//! frames, several frames at once, or line noise. [`FrameDecoder`] buffers
//! whatever has not been consumed yet and hands back every frame that passes
//! trailer and checksum validation.
//!
//! Resynchronization rules:
//! - bytes before the first start marker are discarded
//! - a buffer without any start marker is discarded entirely
//! - a short header or short frame waits for more input
//! - a candidate with a bad trailer or checksum, or a length field above
//!   [`MAX_PAYLOAD_LEN`], discards only its start marker and scanning resumes
//!   with the next byte, so a corrupted length never swallows the frames
//!   behind it

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use super::frame::{
    FRAME_END, FRAME_START, Frame, FrameType, HEADER_LEN, MAX_PAYLOAD_LEN, TRAILER_LEN, checksum,
};

/// Diagnostic counters for one decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed validation
    pub frames: u64,
    /// Candidates discarded for a bad checksum, bad trailer or impossible length
    pub rejected: u64,
    /// Bytes dropped while searching for a start marker
    pub noise_bytes: u64,
}

/// Stateful frame decoder owned by a single port.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame that is now complete and valid.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.buffer.iter().position(|&b| b == FRAME_START) {
                None => {
                    self.stats.noise_bytes += self.buffer.len() as u64;
                    self.buffer.clear();
                    return None;
                }
                Some(0) => {}
                Some(start) => {
                    trace!(skipped = start, "Skipping bytes before start marker");
                    self.stats.noise_bytes += start as u64;
                    self.buffer.advance(start);
                }
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let payload_len = u16::from_be_bytes([self.buffer[3], self.buffer[4]]) as usize;
            if payload_len > MAX_PAYLOAD_LEN {
                debug!(payload_len, "Implausible payload length, dropping start marker");
                self.stats.rejected += 1;
                self.buffer.advance(1);
                continue;
            }

            let total = HEADER_LEN + payload_len + TRAILER_LEN;
            if self.buffer.len() < total {
                return None;
            }

            let expected = checksum(&self.buffer[1..total - TRAILER_LEN]);
            let actual = self.buffer[total - TRAILER_LEN];
            let trailer = self.buffer[total - 1];

            if trailer != FRAME_END || actual != expected {
                // The length field is unverified; only the start marker is known bad
                debug!(
                    payload_len,
                    expected_checksum = expected,
                    actual_checksum = actual,
                    trailer,
                    "Discarding invalid frame candidate"
                );
                self.stats.rejected += 1;
                self.buffer.advance(1);
                continue;
            }

            let candidate = self.buffer.split_to(total);
            let frame_type = FrameType::from_byte(candidate[1]);
            let command = candidate[2];
            let payload = candidate.freeze().slice(HEADER_LEN..HEADER_LEN + payload_len);

            self.stats.frames += 1;
            return Some(Frame::validated(frame_type, command, payload));
        }
    }
}
