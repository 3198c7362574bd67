//! Reader command frames
//!
//! The reader has to be configured and put into continuous-read mode before
//! its link produces tag notices. These builders produce the exact frames the
//! reader expects; link implementations send them at start-up and shutdown.

use serde::{Deserialize, Serialize};

use super::frame::Frame;

pub const CMD_SET_REGION: u8 = 0x07;
pub const CMD_SET_CHANNEL: u8 = 0xAB;
pub const CMD_SET_TX_POWER: u8 = 0xB6;
pub const CMD_START_MULTI_POLL: u8 = 0x27;
pub const CMD_STOP_MULTI_POLL: u8 = 0x28;

/// Regulatory region codes understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    China900,
    Us,
    Europe,
    China800,
    Korea,
}

impl Region {
    pub fn code(self) -> u8 {
        match self {
            Region::China900 => 0x01,
            Region::Us => 0x02,
            Region::Europe => 0x03,
            Region::China800 => 0x04,
            Region::Korea => 0x06,
        }
    }
}

pub fn set_region(region: Region) -> Frame {
    Frame::command(CMD_SET_REGION, &[region.code()])
}

pub fn set_channel(index: u8) -> Frame {
    Frame::command(CMD_SET_CHANNEL, &[index])
}

/// Transmit power in hundredths of a dBm (2600 = 26 dBm)
pub fn set_tx_power(centi_dbm: u16) -> Frame {
    Frame::command(CMD_SET_TX_POWER, &centi_dbm.to_be_bytes())
}

/// Start continuous inventory (poll count 0xFFFF = until stopped)
pub fn start_continuous_read() -> Frame {
    Frame::command(CMD_START_MULTI_POLL, &[0x22, 0xFF, 0xFF])
}

pub fn stop_continuous_read() -> Frame {
    Frame::command(CMD_STOP_MULTI_POLL, &[])
}

/// Start-up configuration sent to every reader before capture begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSetup {
    pub region: Region,
    pub channel: u8,
    pub tx_power_centi_dbm: u16,
    /// Delay between consecutive set-up commands
    pub settle_ms: u64,
}

impl Default for ReaderSetup {
    fn default() -> Self {
        Self { region: Region::Us, channel: 0x1A, tx_power_centi_dbm: 2600, settle_ms: 100 }
    }
}

impl ReaderSetup {
    /// Commands in the order they must be sent, ending with the read start.
    pub fn frames(&self) -> Vec<Frame> {
        vec![
            set_region(self.region),
            set_channel(self.channel),
            set_tx_power(self.tx_power_centi_dbm),
            start_continuous_read(),
        ]
    }
}
