//! Per-market book store
//!
//! [`BookStore`] is the seam the exchange writes through: one journal and one
//! snapshot directory per market. [`FileStore`] lays them out under a data
//! directory:
//!
//! ```text
//! <data_dir>/<market>/journal/journal-NNNNNN.bin
//! <data_dir>/<market>/snapshots/snapshot-NNNNNNNNNNNN.snap[.zst]
//! ```

use crate::journal::{FlushPolicy, FsyncPolicy, JournalConfig, JournalError, JournalWriter};
use crate::reader::{JournalReader, ReaderError, TornTail};
use crate::recovery::{LoadedState, RecoveryEngine, RecoveryError};
use crate::snapshot::{
    Snapshot, SnapshotCleanupPolicy, SnapshotError, SnapshotLoader, SnapshotWriter,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Journal read error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable storage for one market's book.
pub trait BookStore: Send + Sync {
    /// Append an event, returning the sequence assigned to it.
    fn append_entry(
        &mut self,
        timestamp: i64,
        event_type: &str,
        payload: Vec<u8>,
    ) -> Result<u64, StoreError>;

    /// Persist `state` as covering every entry appended so far.
    ///
    /// Returns the sequence the snapshot covers.
    fn write_snapshot(&mut self, timestamp: i64, state: Vec<u8>) -> Result<u64, StoreError>;

    /// Latest snapshot plus the journal entries after it.
    fn load_state(&mut self) -> Result<LoadedState, StoreError>;
}

/// Opens the store of a market by name.
pub trait StoreProvider: Send + Sync {
    fn open(&self, market: &str) -> Result<Box<dyn BookStore>, StoreError>;
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// zstd-compress snapshots
    pub compress_snapshots: bool,
    /// Snapshots kept on disk, newest first
    pub snapshots_retained: usize,
    /// Drop journal files covered by a fresh snapshot
    pub compact_journal: bool,
    pub max_journal_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            compress_snapshots: false,
            snapshots_retained: 1,
            compact_journal: true,
            max_journal_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── File Store ──────────────────────────────────────────────────────

/// Provider backed by the local file system.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: StoreConfig,
}

impl FileStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl StoreProvider for FileStore {
    fn open(&self, market: &str) -> Result<Box<dyn BookStore>, StoreError> {
        Ok(Box::new(FileBookStore::open(market, &self.config)?))
    }
}

/// Journal and snapshots of one market on disk.
pub struct FileBookStore {
    market: String,
    journal_dir: PathBuf,
    snapshot_dir: PathBuf,
    journal: JournalWriter,
    snapshot_writer: SnapshotWriter,
    cleanup: SnapshotCleanupPolicy,
    compact_journal: bool,
    /// Torn entry cut off while opening
    repaired_tail: Option<TornTail>,
}

impl FileBookStore {
    /// Open the market's directories, truncating a torn journal tail.
    ///
    /// Fails on journal corruption anywhere else.
    pub fn open(market: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        let root = config.data_dir.join(market);
        let journal_dir = root.join("journal");
        let snapshot_dir = root.join("snapshots");
        fs::create_dir_all(&journal_dir)?;
        fs::create_dir_all(&snapshot_dir)?;

        let mut reader = JournalReader::open(&journal_dir)?;
        reader.read_all()?;
        let last_journaled = reader.last_sequence().unwrap_or(0);

        let repaired_tail = reader.torn_tail().cloned();
        if let Some(tail) = &repaired_tail {
            warn!(
                market,
                file = %tail.file.display(),
                valid_len = tail.valid_len,
                torn_bytes = tail.torn_bytes,
                "truncating torn journal tail"
            );
            truncate(&tail.file, tail.valid_len)?;
        }

        let last_snapshot = SnapshotLoader::new(&snapshot_dir)
            .list_snapshots()?
            .last()
            .map(|(seq, _)| *seq)
            .unwrap_or(0);

        let mut journal = JournalWriter::open(JournalConfig {
            dir: journal_dir.clone(),
            max_file_size: config.max_journal_file_size,
            flush_policy: config.flush_policy,
            fsync_policy: config.fsync_policy,
        })?;
        journal.set_next_sequence(last_journaled.max(last_snapshot) + 1);

        debug!(
            market,
            next_sequence = journal.next_sequence(),
            "book store opened"
        );

        Ok(Self {
            market: market.to_string(),
            journal_dir,
            snapshot_dir: snapshot_dir.clone(),
            journal,
            snapshot_writer: SnapshotWriter::new(snapshot_dir, config.compress_snapshots),
            cleanup: SnapshotCleanupPolicy::new(config.snapshots_retained),
            compact_journal: config.compact_journal,
            repaired_tail,
        })
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn journal_dir(&self) -> &Path {
        &self.journal_dir
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Torn entry removed by [`open`](Self::open), if there was one.
    pub fn repaired_tail(&self) -> Option<&TornTail> {
        self.repaired_tail.as_ref()
    }

    fn compact(&mut self) -> Result<(), StoreError> {
        self.journal.rotate()?;
        let removed = self.journal.remove_older_files()?;
        if !removed.is_empty() {
            info!(
                market = %self.market,
                removed = removed.len(),
                "journal compacted"
            );
        }
        Ok(())
    }
}

impl BookStore for FileBookStore {
    fn append_entry(
        &mut self,
        timestamp: i64,
        event_type: &str,
        payload: Vec<u8>,
    ) -> Result<u64, StoreError> {
        let entry = self
            .journal
            .write_event(timestamp, event_type.to_string(), payload)?;
        Ok(entry.sequence)
    }

    fn write_snapshot(&mut self, timestamp: i64, state: Vec<u8>) -> Result<u64, StoreError> {
        // Everything the snapshot claims to cover must be on disk first
        self.journal.sync()?;
        let sequence = self.journal.next_sequence() - 1;

        let snapshot = Snapshot::new(self.market.clone(), sequence, timestamp, state);
        let path = self.snapshot_writer.write(&snapshot)?;
        info!(
            market = %self.market,
            sequence,
            path = %path.display(),
            "snapshot written"
        );

        self.cleanup.cleanup(&self.snapshot_dir)?;
        if self.compact_journal {
            self.compact()?;
        }
        Ok(sequence)
    }

    fn load_state(&mut self) -> Result<LoadedState, StoreError> {
        let mut engine = RecoveryEngine::new(&self.market, &self.snapshot_dir, &self.journal_dir);
        let mut loaded = engine.recover()?;
        if let Some(tail) = &self.repaired_tail {
            loaded.metrics.torn_tail_bytes = tail.torn_bytes;
        }
        self.journal.set_next_sequence(loaded.next_sequence());
        Ok(loaded)
    }
}

fn truncate(path: &Path, len: u64) -> Result<(), StoreError> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
