//! Reader wire protocol
//!
//! - [`frame`]: the validated [`Frame`] type and checksum
//! - [`decoder`]: [`FrameDecoder`], the byte-stream resynchronizer
//! - [`interpreter`]: [`interpret`], tag-read notice to [`TagReading`](crate::TagReading)
//! - [`commands`]: outbound configuration and read-control frames

pub mod commands;
pub mod decoder;
pub mod frame;
pub mod interpreter;

pub use commands::{Region, ReaderSetup};
pub use decoder::{DecoderStats, FrameDecoder};
pub use frame::{FRAME_END, FRAME_START, Frame, FrameType, MAX_PAYLOAD_LEN, checksum};
pub use interpreter::{CMD_TAG_READ, EPC_LEN, interpret};
