//! Error types for the write-ahead log.

use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WalError>;

/// Errors surfaced by the WAL.
///
/// End-of-log is not an error: the codec and the reader report it as
/// `Ok(None)` so that a truncated tail after a crash reads as a clean stop
/// rather than a failure.
#[derive(Debug, Error)]
pub enum WalError {
    /// The writer has been shut down; the submission was rejected.
    #[error("WAL is closed")]
    Closed,

    /// The encoded frame exceeds the entry cap or the segment size.
    #[error("entry too large: {size} bytes (max {max})")]
    EntryTooLarge {
        /// Size that was requested.
        size: u64,
        /// Largest size the rejecting component accepts.
        max: u64,
    },

    /// The decoder detected a checksum mismatch, an implausible length,
    /// or a bounds violation inside a frame.
    #[error("corrupt WAL record: {0}")]
    Corrupt(&'static str),

    /// An underlying file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The segment directory does not form a dense 1-based id range.
    #[error("inconsistent segment directory: {0}")]
    StartupInconsistent(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
