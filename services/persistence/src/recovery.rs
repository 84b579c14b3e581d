//! Recovery Flow: Boot from snapshot + journal tail
//!
//! Recovery process:
//! 1. Find latest snapshot (if any) and verify it
//! 2. Read every journal entry, validating checksums
//! 3. Drop entries the snapshot already covers
//! 4. Require the remaining entries to continue gaplessly from the snapshot
//!
//! The returned entries are applied by the caller; this module never
//! interprets payloads.

use crate::journal::JournalEntry;
use crate::reader::{JournalReader, ReaderError, TornTail};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotLoader};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Journal does not continue the snapshot: expected sequence {expected}, found {found}")]
    Discontinuity { expected: u64, found: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Recovery Metrics ────────────────────────────────────────────────

/// Metrics collected during the recovery process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryMetrics {
    /// Time to load the snapshot (if any).
    pub snapshot_load_time_ms: u64,
    /// Sequence number of the loaded snapshot (0 if none).
    pub snapshot_sequence: u64,
    /// Journal entries handed back for replay.
    pub replay_count: u64,
    /// Entries skipped because the snapshot already covers them.
    pub skipped_count: u64,
    /// Time spent reading the journal.
    pub journal_read_time_ms: u64,
    /// Total recovery time.
    pub total_recovery_time_ms: u64,
    /// Last sequence covered by snapshot plus replay.
    pub final_sequence: u64,
    /// Bytes of a torn final entry, if one was found.
    pub torn_tail_bytes: u64,
    pub success: bool,
}

// ── Recovery Log Entry ──────────────────────────────────────────────

/// Structured recovery log entry for diagnostics.
#[derive(Debug, Clone)]
pub struct RecoveryLogEntry {
    pub stage: RecoveryStage,
    pub message: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStage {
    Start,
    SnapshotSearch,
    SnapshotLoad,
    JournalRead,
    Validation,
    Complete,
    Error,
}

// ── Recovered State ─────────────────────────────────────────────────

/// Everything needed to rebuild a market: the newest snapshot and the
/// journal entries written after it, in sequence order.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub snapshot: Option<Snapshot>,
    pub entries: Vec<JournalEntry>,
    pub metrics: RecoveryMetrics,
}

impl LoadedState {
    /// Sequence the next journal entry must carry.
    pub fn next_sequence(&self) -> u64 {
        self.metrics.final_sequence + 1
    }
}

// ── Recovery Engine ─────────────────────────────────────────────────

/// Orchestrates snapshot loading and journal reading for one market.
pub struct RecoveryEngine {
    market: String,
    snapshot_dir: PathBuf,
    journal_dir: PathBuf,
    torn_tail: Option<TornTail>,
    log: Vec<RecoveryLogEntry>,
}

impl RecoveryEngine {
    pub fn new(
        market: impl Into<String>,
        snapshot_dir: impl Into<PathBuf>,
        journal_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            market: market.into(),
            snapshot_dir: snapshot_dir.into(),
            journal_dir: journal_dir.into(),
            torn_tail: None,
            log: Vec::new(),
        }
    }

    /// Load the latest snapshot and the journal entries that follow it.
    pub fn recover(&mut self) -> Result<LoadedState, RecoveryError> {
        let total_start = Instant::now();
        let mut metrics = RecoveryMetrics::default();
        self.log_stage(RecoveryStage::Start, "Recovery started", 0);

        let snapshot = match self.load_snapshot(&mut metrics) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.log_stage(RecoveryStage::Error, &format!("Snapshot error: {}", e), 0);
                return Err(e);
            }
        };
        let covered = snapshot.as_ref().map(|s| s.sequence).unwrap_or(0);

        let read_start = Instant::now();
        self.log_stage(RecoveryStage::JournalRead, "Reading journal", 0);
        let mut reader = JournalReader::open(&self.journal_dir)?;
        let all = reader.read_all().inspect_err(|e| {
            self.log.push(RecoveryLogEntry {
                stage: RecoveryStage::Error,
                message: format!("Journal error: {}", e),
                elapsed_ms: read_start.elapsed().as_millis() as u64,
            });
        })?;
        self.torn_tail = reader.torn_tail().cloned();
        metrics.torn_tail_bytes = self.torn_tail.as_ref().map(|t| t.torn_bytes).unwrap_or(0);
        metrics.journal_read_time_ms = read_start.elapsed().as_millis() as u64;

        let total = all.len() as u64;
        let entries: Vec<JournalEntry> = all.into_iter().filter(|e| e.sequence > covered).collect();
        metrics.skipped_count = total - entries.len() as u64;

        self.log_stage(RecoveryStage::Validation, "Validating sequence continuity", 0);
        if let Err(e) = Self::check_continuity(covered, &entries) {
            self.log_stage(RecoveryStage::Error, &e.to_string(), 0);
            return Err(e);
        }

        metrics.replay_count = entries.len() as u64;
        metrics.final_sequence = entries.last().map(|e| e.sequence).unwrap_or(covered);
        metrics.total_recovery_time_ms = total_start.elapsed().as_millis() as u64;
        metrics.success = true;

        debug!(
            market = %self.market,
            snapshot_sequence = metrics.snapshot_sequence,
            replay_count = metrics.replay_count,
            skipped = metrics.skipped_count,
            "journal tail loaded"
        );
        self.log_stage(
            RecoveryStage::Complete,
            &format!(
                "Recovery complete: {} entries to replay, final seq={}",
                metrics.replay_count, metrics.final_sequence
            ),
            metrics.total_recovery_time_ms,
        );

        Ok(LoadedState {
            snapshot,
            entries,
            metrics,
        })
    }

    /// Torn tail noticed by the last [`recover`](Self::recover) call.
    pub fn torn_tail(&self) -> Option<&TornTail> {
        self.torn_tail.as_ref()
    }

    /// Get recovery log entries.
    pub fn log(&self) -> &[RecoveryLogEntry] {
        &self.log
    }

    // ── Internal ────────────────────────────────────────────────────

    fn load_snapshot(
        &mut self,
        metrics: &mut RecoveryMetrics,
    ) -> Result<Option<Snapshot>, RecoveryError> {
        self.log_stage(RecoveryStage::SnapshotSearch, "Searching for snapshots", 0);
        let loader = SnapshotLoader::new(&self.snapshot_dir);

        let start = Instant::now();
        match loader.load_latest() {
            Ok(snapshot) => {
                if snapshot.market != self.market {
                    return Err(SnapshotError::WrongMarket {
                        expected: self.market.clone(),
                        found: snapshot.market,
                    }
                    .into());
                }
                metrics.snapshot_load_time_ms = start.elapsed().as_millis() as u64;
                metrics.snapshot_sequence = snapshot.sequence;
                self.log_stage(
                    RecoveryStage::SnapshotLoad,
                    &format!(
                        "Snapshot loaded: seq={}, hash={}",
                        snapshot.sequence,
                        &snapshot.checksum[..16]
                    ),
                    metrics.snapshot_load_time_ms,
                );
                Ok(Some(snapshot))
            }
            Err(SnapshotError::NoSnapshots) => {
                self.log_stage(
                    RecoveryStage::SnapshotSearch,
                    "No snapshots found, replaying from the first entry",
                    0,
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_continuity(covered: u64, entries: &[JournalEntry]) -> Result<(), RecoveryError> {
        if let Some(first) = entries.first() {
            if first.sequence != covered + 1 {
                return Err(RecoveryError::Discontinuity {
                    expected: covered + 1,
                    found: first.sequence,
                });
            }
        }
        JournalReader::validate_sequences(entries)?;
        Ok(())
    }

    fn log_stage(&mut self, stage: RecoveryStage, message: &str, elapsed_ms: u64) {
        self.log.push(RecoveryLogEntry {
            stage,
            message: message.to_string(),
            elapsed_ms,
        });
    }
}

// ── Tests ───────────────────────────────────────────────────────────
