//! Multi-reader UHF RFID tag ingestion.
//!
//! Tagwall reads the byte streams of one or more serial RFID readers,
//! recovers protocol frames from noisy input, and folds tag readings from all
//! readers into per-tag sightings: one [`FinalizedSighting`] per tag per
//! presence, followed by an exclusion window in which the same tag is ignored.
//!
//! # Features
//!
//! - **Resynchronizing decoder**: survives noise, split reads and corrupt frames
//! - **Non-blocking capture**: a full queue drops readings instead of stalling a port
//! - **Configurable finalization**: per-tag idle timeout or global quiet period
//! - **Replay**: recorded captures run through the same pipeline as live readers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tagwall::{ChannelSink, PipelineConfig, Tagwall};
//!
//! #[tokio::main]
//! async fn main() -> tagwall::Result<()> {
//!     let config = PipelineConfig::from_file("tagwall.yaml").await?;
//!     let (sink, mut sightings) = ChannelSink::new(config.sighting_channel_capacity);
//!
//!     let pipeline = Tagwall::replay(config, ["gate-a.bin", "gate-b.bin"], sink).await?;
//!
//!     while let Some(sighting) = sightings.next().await {
//!         println!("{} seen {} times on {} ports", sighting.tag, sighting.reading_count, sighting.port_count());
//!     }
//!
//!     let report = pipeline.shutdown().await?;
//!     println!("dropped {} readings", report.stats.queue.dropped);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod config;
pub mod protocol;

// Ingestion pipeline
pub mod capture;
pub mod link;
pub mod links;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod sweeper;
pub mod tracker;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{FinalizationPolicy, PipelineConfig, SerialSettings};
pub use link::Link;
pub use links::ReplayLink;
#[cfg(feature = "serial")]
pub use links::SerialLink;
pub use pipeline::{Pipeline, PipelineHandle, PipelineReport, PipelineStats};
pub use sink::{ChannelSink, LogSink, SightingSink, SightingStream};
pub use tracker::TagSessionTracker;

/// Unified entry point for starting a pipeline.
///
/// Live readers and recorded captures produce identical sightings; only the
/// link type differs.
pub struct Tagwall;

impl Tagwall {
    /// Configure every attached reader and start ingesting.
    ///
    /// Readers are discovered by matching serial device paths against
    /// `config.serial.port_pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - No matching reader could be opened ([`IngestError::NoHardware`])
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tagwall::{LogSink, PipelineConfig, Tagwall};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> tagwall::Result<()> {
    /// let pipeline = Tagwall::connect(PipelineConfig::default(), LogSink).await?;
    /// tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    /// pipeline.shutdown().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "serial")]
    pub async fn connect<S: SightingSink>(config: PipelineConfig, sink: S) -> Result<PipelineHandle> {
        config.validate()?;
        let links = SerialLink::open_all(&config.serial, config.read_timeout()).await?;
        Pipeline::start(config, links, sink)
    }

    /// Replay recorded captures, one file per reader.
    ///
    /// Each file becomes a port named after its path. The pipeline drains on
    /// its own once every file has been read; see
    /// [`PipelineHandle::wait_drained`].
    pub async fn replay<P, I, S>(config: PipelineConfig, paths: I, sink: S) -> Result<PipelineHandle>
    where
        P: AsRef<std::path::Path>,
        I: IntoIterator<Item = P>,
        S: SightingSink,
    {
        let mut links = Vec::new();
        for path in paths {
            links.push(ReplayLink::open(path).await?.with_chunk_size(config.read_chunk_size));
        }
        Pipeline::start(config, links, sink)
    }
}
