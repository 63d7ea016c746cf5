//! WAL reader: a sequential scan over all segments.
//!
//! The reader walks segments in ascending id order and decodes one record
//! at a time. A clean end of data in a non-final segment (rotated files
//! end exactly at a record boundary) moves on to the next segment; the
//! final segment's durable tail ends the scan. Corruption is surfaced to
//! the caller — replay decides whether to halt or skip, the reader never
//! does it silently.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, WalError};
use crate::record::LogRecord;
use crate::segments::{scan_segments, segment_path};

/// Sequential reader over a WAL directory.
///
/// Yields records lazily; the stream is finite and not restartable
/// (except for [`reset`](WalReader::reset) within the open segment).
pub struct WalReader {
    dir: PathBuf,
    ids: Vec<u64>,
    /// Index into `ids` of the next segment to open.
    next: usize,
    current: Option<BufReader<File>>,
}

impl WalReader {
    /// Enumerate the segments of `dir` and prepare to read them in order.
    ///
    /// The directory must satisfy the same dense-id invariant the store
    /// enforces. An empty directory yields an immediately empty stream.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let ids = scan_segments(&dir)?;
        Ok(WalReader {
            dir,
            ids,
            next: 0,
            current: None,
        })
    }

    /// Decode the next record, or `Ok(None)` at the end of the log.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        loop {
            let Some(segment) = self.current.as_mut() else {
                if self.next >= self.ids.len() {
                    return Ok(None);
                }
                let id = self.ids[self.next];
                self.next += 1;
                debug!(target: "flashlog::reader", id, "reading segment");
                let file = File::open(segment_path(&self.dir, id))?;
                self.current = Some(BufReader::new(file));
                continue;
            };

            match LogRecord::decode(segment) {
                Ok(Some(record)) => return Ok(Some(record)),
                // Durable tail of this segment; move to the next one.
                Ok(None) => self.current = None,
                Err(err) => {
                    if matches!(err, WalError::Corrupt(_)) {
                        warn!(target: "flashlog::reader", %err, "stopping at corrupt record");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Seek back to the beginning of the currently open segment.
    ///
    /// A no-op when no segment is open.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(segment) = self.current.as_mut() {
            segment.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }
}

impl Iterator for WalReader {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
