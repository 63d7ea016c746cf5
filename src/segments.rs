//! Segment store: rotating, size-bounded log files.
//!
//! A log is a directory of `segment-NNNN.log` files with dense 1-based
//! ids. Exactly one segment is active at a time; records append to it and
//! the store rotates to a fresh file before a write that would push the
//! active segment past the configured cap.
//!
//! Callers never see file handles directly: [`SegmentStore::write`] hands
//! a closure the active file, then fsyncs it, so a successful return means
//! the closure's bytes are durable.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::WalConfig;
use crate::error::{Result, WalError};

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".log";

/// Path of the segment file with the given id.
///
/// Ids are zero-padded to at least four digits; larger ids widen the name.
pub(crate) fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{:04}{}", SEGMENT_PREFIX, id, SEGMENT_SUFFIX))
}

/// Parse a segment id out of a file name, accepting any digit count ≥ 1.
fn parse_segment_id(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Enumerate segment ids in `dir`, ascending.
///
/// Unrelated files and subdirectories are ignored. The ids must form the
/// dense range `{1..M}`; anything else (gaps, an id 0, two spellings of
/// the same id) is a startup error.
pub(crate) fn scan_segments(dir: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) = parse_segment_id(name) {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    for (i, &id) in ids.iter().enumerate() {
        if id != i as u64 + 1 {
            return Err(WalError::StartupInconsistent(format!(
                "segment ids must form a dense range starting at 1, found {} where {} was expected",
                id,
                i + 1
            )));
        }
    }

    Ok(ids)
}

struct ActiveSegment {
    file: File,
    id: u64,
    size: u64,
}

struct StoreInner {
    /// `None` once the store has been closed.
    active: Option<ActiveSegment>,
    segment_size: u64,
}

/// Append-only store over a directory of rotating segment files.
pub struct SegmentStore {
    dir: PathBuf,
    inner: Mutex<StoreInner>,
}

impl SegmentStore {
    /// Open (or initialize) the segment directory and its active segment.
    ///
    /// A missing or empty directory gets a fresh, empty `segment-0001.log`.
    /// Otherwise the ids are validated as dense and the highest-id file is
    /// opened for appending.
    pub fn open(dir: impl Into<PathBuf>, config: &WalConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.into();

        if !dir.is_dir() {
            if dir.exists() {
                return Err(WalError::StartupInconsistent(format!(
                    "{} exists but is not a directory",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir)?;
        }

        let ids = scan_segments(&dir)?;
        let active = match ids.last() {
            Some(&id) => open_active(&dir, id)?,
            None => create_segment(&dir, 1)?,
        };

        Ok(SegmentStore {
            dir,
            inner: Mutex::new(StoreInner {
                active: Some(active),
                segment_size: config.segment_size,
            }),
        })
    }

    /// Append `n` bytes through `f`, rotating first if the active segment
    /// cannot take them, then fsync the active file.
    ///
    /// `n` must be the exact byte count `f` writes; it drives the rotation
    /// check. A write of exactly `segment_size` bytes is accepted. The
    /// closure runs under the store mutex, so it must not block on
    /// anything but the file it is handed.
    pub fn write<F>(&self, n: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        let mut inner = self.inner.lock();

        let cap = inner.segment_size;
        if n > cap {
            return Err(WalError::EntryTooLarge { size: n, max: cap });
        }

        let current_size = inner
            .active
            .as_ref()
            .ok_or(WalError::Closed)?
            .size;
        if current_size + n > cap {
            rotate(&self.dir, &mut inner)?;
        }

        let active = inner.active.as_mut().ok_or(WalError::Closed)?;
        let written = f(&mut active.file);

        // The closure may have failed partway through; re-derive the size
        // from the file itself so the rotation math stays exact.
        active.size = active.file.metadata()?.len();

        let synced = active.file.sync_all();
        written.and_then(|()| synced.map_err(WalError::from))
    }

    /// Fsync the active segment.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock();
        let active = inner.active.as_ref().ok_or(WalError::Closed)?;
        active.file.sync_all()?;
        Ok(())
    }

    /// Fsync and close the active segment. Idempotent; later writes fail.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.active.take() {
            active.file.sync_all()?;
        }
        Ok(())
    }

    /// Id of the active segment, or `None` after close.
    pub fn active_id(&self) -> Option<u64> {
        self.inner.lock().active.as_ref().map(|a| a.id)
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn open_active(dir: &Path, id: u64) -> Result<ActiveSegment> {
    // Read/write with an explicit seek to the end rather than O_APPEND:
    // append mode would redirect the codec's CRC back-patch to the tail.
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(segment_path(dir, id))?;
    let size = file.seek(SeekFrom::End(0))?;
    debug!(target: "flashlog::segments", id, size, "opened active segment");
    Ok(ActiveSegment { file, id, size })
}

fn create_segment(dir: &Path, id: u64) -> Result<ActiveSegment> {
    let path = segment_path(dir, id);
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .open(&path)?;
    debug!(target: "flashlog::segments", id, "created segment");
    Ok(ActiveSegment { file, id, size: 0 })
}

fn rotate(dir: &Path, inner: &mut StoreInner) -> Result<()> {
    let old = inner.active.as_ref().ok_or(WalError::Closed)?;
    old.file.sync_all()?;

    let next_id = old.id + 1;
    let next = create_segment(dir, next_id)?;
    debug!(target: "flashlog::segments", from = next_id - 1, to = next_id, "rotated segment");

    // Replacing the active segment drops (closes) the previous file.
    inner.active = Some(next);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn store_with_cap(dir: &Path, cap: u64) -> SegmentStore {
        let config = WalConfig::new().with_segment_size(cap);
        SegmentStore::open(dir, &config).unwrap()
    }

    fn write_bytes(store: &SegmentStore, bytes: &[u8]) {
        store
            .write(bytes.len() as u64, |f| {
                f.write_all(bytes)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_fresh_directory_gets_first_segment() {
        let dir = tempdir().unwrap();
        let wal_dir = dir.path().join("wal");

        let store = store_with_cap(&wal_dir, 1024);
        assert_eq!(store.active_id(), Some(1));
        assert!(segment_path(&wal_dir, 1).exists());
        assert_eq!(fs::metadata(segment_path(&wal_dir, 1)).unwrap().len(), 0);
    }

    #[test]
    fn test_segment_path_padding() {
        let dir = Path::new("/wal");
        assert_eq!(
            segment_path(dir, 1),
            PathBuf::from("/wal/segment-0001.log")
        );
        assert_eq!(
            segment_path(dir, 12345),
            PathBuf::from("/wal/segment-12345.log")
        );
    }

    #[test]
    fn test_parse_accepts_any_digit_count() {
        assert_eq!(parse_segment_id("segment-1.log"), Some(1));
        assert_eq!(parse_segment_id("segment-0001.log"), Some(1));
        assert_eq!(parse_segment_id("segment-10000.log"), Some(10000));
        assert_eq!(parse_segment_id("segment-.log"), None);
        assert_eq!(parse_segment_id("segment-12.sst"), None);
        assert_eq!(parse_segment_id("segment-1x.log"), None);
        assert_eq!(parse_segment_id("checkpoint-1.log"), None);
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("segment-0001.log"), b"").unwrap();
        fs::write(dir.path().join("MANIFEST"), b"x").unwrap();
        fs::write(dir.path().join("segment-x.log"), b"x").unwrap();
        fs::create_dir(dir.path().join("segment-0002.log")).unwrap(); // a dir, not a file

        assert_eq!(scan_segments(dir.path()).unwrap(), vec![1]);
    }

    #[test]
    fn test_non_dense_ids_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("segment-0001.log"), b"").unwrap();
        fs::write(dir.path().join("segment-0003.log"), b"").unwrap();

        let result = SegmentStore::open(dir.path(), &WalConfig::default());
        assert!(matches!(result, Err(WalError::StartupInconsistent(_))));
    }

    #[test]
    fn test_ids_must_start_at_one() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("segment-0002.log"), b"").unwrap();

        let result = SegmentStore::open(dir.path(), &WalConfig::default());
        assert!(matches!(result, Err(WalError::StartupInconsistent(_))));
    }

    #[test]
    fn test_duplicate_id_spellings_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("segment-0001.log"), b"").unwrap();
        fs::write(dir.path().join("segment-1.log"), b"").unwrap();

        let result = SegmentStore::open(dir.path(), &WalConfig::default());
        assert!(matches!(result, Err(WalError::StartupInconsistent(_))));
    }

    #[test]
    fn test_reopen_appends_to_highest_segment() {
        let dir = tempdir().unwrap();

        {
            let store = store_with_cap(dir.path(), 1024);
            write_bytes(&store, b"first");
            store.close().unwrap();
        }

        let store = store_with_cap(dir.path(), 1024);
        assert_eq!(store.active_id(), Some(1));
        write_bytes(&store, b"second");
        store.close().unwrap();

        let contents = fs::read(segment_path(dir.path(), 1)).unwrap();
        assert_eq!(contents, b"firstsecond");
    }

    #[test]
    fn test_rotation_before_overflow() {
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 10);

        write_bytes(&store, b"aaaaa"); // segment 1: 5 bytes
        write_bytes(&store, b"bbbbb"); // segment 1: 10 bytes (exactly at cap)
        assert_eq!(store.active_id(), Some(1));

        write_bytes(&store, b"ccccc"); // would exceed: rotates first
        assert_eq!(store.active_id(), Some(2));

        assert_eq!(fs::read(segment_path(dir.path(), 1)).unwrap(), b"aaaaabbbbb");
        assert_eq!(fs::read(segment_path(dir.path(), 2)).unwrap(), b"ccccc");
    }

    #[test]
    fn test_write_of_exactly_cap_accepted() {
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 10);

        write_bytes(&store, b"0123456789");
        assert_eq!(store.active_id(), Some(1));
        assert_eq!(
            fs::metadata(segment_path(dir.path(), 1)).unwrap().len(),
            10
        );
    }

    #[test]
    fn test_oversized_write_rejected() {
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 10);

        let result = store.write(11, |_| Ok(()));
        assert!(matches!(
            result,
            Err(WalError::EntryTooLarge { size: 11, max: 10 })
        ));
        // Nothing changed; the active segment is still fresh.
        assert_eq!(store.active_id(), Some(1));
    }

    #[test]
    fn test_rotation_count_matches_fixed_size_writes() {
        // 50 writes of 5 bytes with a 10-byte cap: two writes per segment.
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 10);

        for _ in 0..50 {
            write_bytes(&store, b"xxxxx");
        }
        store.close().unwrap();

        let ids = scan_segments(dir.path()).unwrap();
        assert_eq!(ids.len(), 25);
        for id in ids {
            assert!(fs::metadata(segment_path(dir.path(), id)).unwrap().len() <= 10);
        }
    }

    #[test]
    fn test_closure_error_propagates_and_worker_can_continue() {
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 1024);

        let result = store.write(4, |f| {
            f.write_all(b"ab")?;
            Err(WalError::Corrupt("synthetic failure"))
        });
        assert!(matches!(result, Err(WalError::Corrupt(_))));

        // The partial bytes are on disk (readers treat them as tail), and
        // the store keeps accepting writes.
        write_bytes(&store, b"cd");
        let contents = fs::read(segment_path(dir.path(), 1)).unwrap();
        assert_eq!(contents, b"abcd");
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let store = store_with_cap(dir.path(), 1024);

        store.close().unwrap();
        store.close().unwrap(); // idempotent

        let result = store.write(1, |f| {
            f.write_all(b"x")?;
            Ok(())
        });
        assert!(matches!(result, Err(WalError::Closed)));
        assert!(store.active_id().is_none());
    }

    #[test]
    fn test_path_that_is_a_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal");
        fs::write(&path, b"not a directory").unwrap();

        let result = SegmentStore::open(&path, &WalConfig::default());
        assert!(matches!(result, Err(WalError::StartupInconsistent(_))));
    }
}
