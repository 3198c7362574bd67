//! Error types for the ingestion pipeline.
//!
//! Protocol-level anomalies (bad checksums, truncated frames, uninteresting
//! frame types) never surface here: the decoder and interpreter absorb them.
//! Only conditions an operator has to act on cross the pipeline boundary.
//!
//! ## Error Categories
//!
//! - **Link Errors**: I/O failures on a reader's serial link (fatal to that port only)
//! - **File Errors**: Problems reading recorded captures or configuration files
//! - **Config Errors**: Invalid or unparseable pipeline configuration
//! - **Start-up Errors**: No reader hardware available when the pipeline starts
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use tagwall::IngestError;
//!
//! let error = IngestError::link_failed("/dev/ttyUSB0", "device unplugged");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Main error type for ingestion operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IngestError {
    #[error("Link failure on port {port}: {reason}")]
    Link {
        port: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("No RFID reader hardware detected")]
    NoHardware,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Pipeline task '{task}' failed: {details}")]
    Task { task: String, details: String },
}

impl IngestError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Link { .. } => true,
            IngestError::Timeout { .. } => true,
            IngestError::NoHardware => true,
            IngestError::File { .. } => false,
            IngestError::Config { .. } => false,
            IngestError::Task { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            IngestError::Link { .. } => vec![
                "Check the USB cable and serial adapter",
                "Verify the reader is powered",
                "Restart the pipeline to reopen the port",
            ],
            IngestError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            IngestError::Config { .. } => vec![
                "Check configuration field names and units",
                "Compare against the default configuration",
            ],
            IngestError::NoHardware => vec![
                "Connect at least one reader",
                "Check the device node pattern used for discovery",
                "Check permissions on serial devices (dialout group)",
            ],
            IngestError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check system load",
            ],
            IngestError::Task { .. } => vec![
                "Check logs for the panic message",
                "Restart the pipeline",
            ],
        }
    }

    /// Helper constructor for link failures.
    pub fn link_failed(port: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::Link { port: port.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for link failures with the underlying I/O error.
    pub fn link_io(port: impl Into<String>, source: std::io::Error) -> Self {
        IngestError::Link {
            port: port.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        IngestError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        IngestError::Config { context: context.into(), details: details.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            port in "[a-zA-Z0-9/]{1,20}",
            reason in ".*",
            details in ".*",
            duration_ms in 1u64..60000u64
          ) {
            let link = IngestError::link_failed(port.clone(), reason.clone());
            let msg = link.to_string();
            prop_assert!(msg.contains(&port));
            prop_assert!(msg.contains(&reason));

            let config = IngestError::config("policy", details.clone());
            prop_assert!(config.to_string().contains(&details));

            let timeout = IngestError::Timeout { duration: Duration::from_millis(duration_ms) };
            prop_assert!(!timeout.to_string().is_empty());
          }
        }
    }

    #[test]
    fn link_io_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled");
        let err = IngestError::link_io("/dev/ttyUSB1", io);

        let source = std::error::Error::source(&err).expect("io error should be chained");
        assert_eq!(source.to_string(), "cable pulled");
        assert!(err.to_string().contains("/dev/ttyUSB1"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<IngestError>();
    }

    #[test]
    fn recovery_methods_work() {
        let link = IngestError::link_failed("COM3", "test");
        let config = IngestError::config("queue_capacity", "must be positive");

        assert!(link.is_retryable());
        assert!(IngestError::NoHardware.is_retryable());
        assert!(!config.is_retryable());

        for suggestion in link.recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
        assert!(!config.recovery_suggestions().is_empty());
    }

    #[test]
    fn from_io_error_maps_to_file_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "capture.bin");
        let err: IngestError = io_err.into();

        match err {
            IngestError::File { source, .. } => assert_eq!(source.to_string(), "capture.bin"),
            _ => panic!("Expected File error variant"),
        }
    }
}
