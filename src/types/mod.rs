//! Core types for tag readings and sightings.
//!
//! - [`TagId`] is the uppercase hex EPC of a tag
//! - [`PortId`] names the serial port a reading arrived on
//! - [`Rssi`] wraps the reader's raw signal-strength byte
//! - [`TagReading`] is one decoded tag-read notification
//! - [`FinalizedSighting`] is the immutable summary of a closed session
//!
//! ## Usage Example
//!
//! ```rust
//! use tagwall::types::{Rssi, TagId};
//!
//! let tag = TagId::from_epc(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
//! assert_eq!(tag.as_str(), "AABBCCDDEEFF001122334455");
//!
//! assert_eq!(Rssi::from_raw(0xC8).dbm(), -56);
//! assert_eq!(Rssi::from_raw(0x20).dbm(), 32);
//! ```

mod reading;
mod sighting;

pub use reading::{CaptureTime, TagReading};
pub use sighting::FinalizedSighting;

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// Tag identifier: uppercase hexadecimal rendering of the EPC bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(Arc<str>);

impl TagId {
    /// Render EPC bytes as an uppercase hex identifier.
    pub fn from_epc(epc: &[u8]) -> Self {
        let mut hex = String::with_capacity(epc.len() * 2);
        for byte in epc {
            // Writing to a String cannot fail
            let _ = write!(hex, "{:02X}", byte);
        }
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagId {
    fn from(value: &str) -> Self {
        Self(value.to_ascii_uppercase().into())
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the port (serial device) a reading came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(Arc<str>);

impl PortId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PortId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Received signal strength as reported by the reader.
///
/// The raw byte is a two's complement dBm value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rssi(u8);

impl Rssi {
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Signal strength in dBm (`raw - 256` for raw values above 127)
    pub fn dbm(self) -> i16 {
        if self.0 > 127 { self.0 as i16 - 256 } else { self.0 as i16 }
    }
}
