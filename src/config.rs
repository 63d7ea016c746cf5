//! WAL configuration.

use crate::error::{Result, WalError};

/// Configuration for a WAL instance.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Maximum segment size in bytes (default: 16 MiB).
    ///
    /// When the next record would push the active segment past this size,
    /// the store rotates to a new segment first. A single write larger
    /// than this is rejected outright.
    pub segment_size: u64,

    /// Capacity of the writer's submission queue (default: 1024).
    ///
    /// Producers block once this many submissions are waiting for the
    /// worker, which is how back-pressure reaches callers.
    pub submission_queue_size: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_size: 16 * 1024 * 1024, // 16 MiB
            submission_queue_size: 1024,
        }
    }
}

impl WalConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segment rotation threshold (builder pattern).
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Set the submission queue capacity (builder pattern).
    pub fn with_submission_queue_size(mut self, capacity: usize) -> Self {
        self.submission_queue_size = capacity;
        self
    }

    /// Validate the configuration.
    ///
    /// There is deliberately no lower bound on `segment_size` beyond
    /// nonzero: tiny caps are how rotation gets exercised.
    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            return Err(WalError::InvalidConfig("segment_size must be nonzero"));
        }
        if self.submission_queue_size == 0 {
            return Err(WalError::InvalidConfig(
                "submission_queue_size must be nonzero",
            ));
        }
        Ok(())
    }

    /// Configuration with a small segment size, for fast rotation in tests.
    pub fn for_testing() -> Self {
        WalConfig {
            segment_size: 4 * 1024, // 4 KiB
            submission_queue_size: 16,
        }
    }
}
