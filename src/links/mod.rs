//! Concrete [`Link`](crate::Link) implementations

mod replay;
#[cfg(feature = "serial")]
mod serial;

pub use replay::ReplayLink;
#[cfg(feature = "serial")]
pub use serial::{SerialLink, discover_ports};
