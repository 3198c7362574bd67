//! Serial link to a physical reader
//!
//! Opening a port configures the reader (region, channel, transmit power)
//! and starts continuous multi-tag reading. Closing it stops reading again,
//! so the reader is left idle for the next session.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Duration, sleep, timeout};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::{debug, info, trace, warn};

use crate::config::SerialSettings;
use crate::link::Link;
use crate::protocol::commands::stop_continuous_read;
use crate::types::PortId;
use crate::{IngestError, Result};

/// Serial device paths whose name contains `pattern`, sorted
pub fn discover_ports(pattern: &str) -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(|e| IngestError::Link {
        port: "<enumeration>".to_string(),
        reason: "failed to enumerate serial ports".to_string(),
        source: Some(Box::new(e)),
    })?;

    let mut paths: Vec<String> = ports
        .into_iter()
        .inspect(|p| {
            if let SerialPortType::UsbPort(usb) = &p.port_type {
                trace!(port = %p.port_name, vid = usb.vid, pid = usb.pid, "Found USB serial port");
            }
        })
        .map(|p| p.port_name)
        .filter(|name| name.contains(pattern))
        .collect();
    paths.sort();

    debug!(pattern, found = paths.len(), "Serial port discovery");
    Ok(paths)
}

/// Reader attached over a serial port
pub struct SerialLink {
    port: PortId,
    stream: SerialStream,
    read_timeout: Duration,
    stopped: bool,
}

impl SerialLink {
    /// Open `path`, configure the reader and start continuous reading.
    pub async fn open(path: &str, settings: &SerialSettings, read_timeout: Duration) -> Result<Self> {
        let stream = tokio_serial::new(path, settings.baud_rate).open_native_async().map_err(|e| {
            IngestError::Link {
                port: path.to_string(),
                reason: "failed to open serial port".to_string(),
                source: Some(Box::new(e)),
            }
        })?;

        let mut link = Self { port: PortId::new(path), stream, read_timeout, stopped: false };

        let settle = Duration::from_millis(settings.setup.settle_ms);
        for frame in settings.setup.frames() {
            link.send(&frame.encode()).await?;
            trace!(port = %link.port, command = frame.command_code(), "Sent set-up command");
            sleep(settle).await;
        }

        info!(port = %link.port, baud = settings.baud_rate, "Reader configured, continuous read started");
        Ok(link)
    }

    /// Discover and open every port matching `settings.port_pattern`.
    ///
    /// Ports that fail to open are logged and skipped. Fails with
    /// [`IngestError::NoHardware`] when nothing could be opened.
    pub async fn open_all(settings: &SerialSettings, read_timeout: Duration) -> Result<Vec<Self>> {
        let mut links = Vec::new();
        for path in discover_ports(&settings.port_pattern)? {
            match Self::open(&path, settings, read_timeout).await {
                Ok(link) => links.push(link),
                Err(e) => warn!(port = %path, "Skipping reader: {}", e),
            }
        }

        if links.is_empty() {
            return Err(IngestError::NoHardware);
        }
        Ok(links)
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(|e| IngestError::link_io(self.port.to_string(), e))?;
        self.stream.flush().await.map_err(|e| IngestError::link_io(self.port.to_string(), e))
    }
}

#[async_trait::async_trait]
impl Link for SerialLink {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        match timeout(self.read_timeout, self.stream.read(buf)).await {
            Err(_) => Ok(Some(0)),
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(Some(0)),
            Ok(Err(e)) => Err(IngestError::link_io(self.port.to_string(), e)),
        }
    }

    fn port(&self) -> &PortId {
        &self.port
    }

    async fn close(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.send(&stop_continuous_read().encode()).await?;
        info!(port = %self.port, "Continuous read stopped");
        Ok(())
    }
}
