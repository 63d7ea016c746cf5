//! # flashlog
//!
//! A segmented write-ahead log for a key-value storage engine: a durable,
//! append-only record of mutations that survives crashes and lets the
//! engine rebuild its state on restart.
//!
//! Once [`WalWriter::write`] returns success, the record is encoded,
//! checksummed, and fsync'd to the active segment file. On boot, the
//! engine replays the stream from [`WalReader`] into its memtable.
//!
//! # Quick start
//!
//! ```no_run
//! use flashlog::{LogRecord, WalConfig, WalReader, WalWriter};
//!
//! fn main() -> flashlog::Result<()> {
//!     let writer = WalWriter::open("./wal", WalConfig::default())?;
//!     writer.write(LogRecord::put("user:1", "alice"))?;
//!     writer.write(LogRecord::delete("user:0"))?;
//!     writer.close()?;
//!
//!     for record in WalReader::open("./wal")? {
//!         let record = record?;
//!         // replay into the memtable
//!         let _ = (record.op, record.key, record.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! - [`record`]: binary framing with a length prefix and CRC32 checksum,
//!   plus corruption/truncation detection on read.
//! - [`segments`]: an append-only sequence of size-bounded files with
//!   deterministic naming and crash-tolerant reopen.
//! - [`writer`]: a single-worker dispatcher that serializes concurrent
//!   submissions into one ordered, fsync'd stream.
//! - [`reader`]: a sequential scanner that stops cleanly at the durable
//!   tail.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod reader;
pub mod record;
pub mod segments;
pub mod writer;

pub use config::WalConfig;
pub use error::{Result, WalError};
pub use reader::WalReader;
pub use record::{LogRecord, Operation, INVALID_CRC, MAX_ENTRY_SIZE};
pub use segments::SegmentStore;
pub use writer::WalWriter;
