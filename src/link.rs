//! Link trait for reader byte sources

use crate::Result;
use crate::types::PortId;

/// A byte source attached to one reader.
///
/// Links abstract over serial ports, recorded captures and test doubles.
/// Implementations bound every read by a short timeout so the capture loop
/// can notice a stop request promptly.
#[async_trait::async_trait]
pub trait Link: Send + 'static {
    /// Read whatever bytes are available into `buf`.
    ///
    /// Returns:
    /// - `Ok(Some(n))` with `n > 0` - `n` bytes were read
    /// - `Ok(Some(0))` - the read timed out with no data
    /// - `Ok(None)` - the source ended (normal termination)
    /// - `Err(e)` - link failure; the capture loop for this port stops
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Port this link reads from
    fn port(&self) -> &PortId;

    /// Release the link. Called once when the capture loop exits.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl Link for Box<dyn Link> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        (**self).read_chunk(buf).await
    }

    fn port(&self) -> &PortId {
        (**self).port()
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
