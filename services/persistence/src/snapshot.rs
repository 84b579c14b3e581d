//! Snapshot System: State snapshots with integrity and compression
//!
//! Features:
//! - Opaque per-market state bytes, produced and consumed by the caller
//! - SHA-256 integrity hash over the state
//! - Optional zstd compression
//! - Snapshot versioning for forward compatibility
//! - Atomic writes (tmp file, fsync, rename)
//! - Interval policy (every N operations)
//! - Cleanup policy (keep last N snapshots)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Snapshot belongs to market {found}, expected {expected}")]
    WrongMarket { expected: String, found: String },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No snapshots found")]
    NoSnapshots,
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A point-in-time copy of one market's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version for forward compatibility.
    pub version: u32,
    /// Market the state belongs to.
    pub market: String,
    /// Last journal sequence the state includes.
    pub sequence: u64,
    /// Unix nanosecond timestamp when snapshot was taken.
    pub timestamp: i64,
    /// Serialized book state; opaque to this crate.
    pub state: Vec<u8>,
    /// SHA-256 hex digest of `state`.
    pub checksum: String,
}

impl Snapshot {
    /// Create a new snapshot with computed integrity hash.
    pub fn new(market: impl Into<String>, sequence: u64, timestamp: i64, state: Vec<u8>) -> Self {
        let checksum = compute_hash(&state);
        Self {
            version: SNAPSHOT_VERSION,
            market: market.into(),
            sequence,
            timestamp,
            state,
            checksum,
        }
    }

    /// Verify the snapshot's integrity hash.
    pub fn verify_integrity(&self) -> bool {
        self.checksum == compute_hash(&self.state)
    }
}

/// SHA-256 hex digest of `bytes`
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ── Snapshot Writer ─────────────────────────────────────────────────

/// Writes snapshots to disk with optional zstd compression.
pub struct SnapshotWriter {
    dir: PathBuf,
    compress: bool,
}

impl SnapshotWriter {
    /// Create a new writer. `compress` enables zstd compression.
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    /// Write a snapshot atomically: serialize → compress → write tmp → fsync → rename.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let (final_data, ext) = if self.compress {
            let compressed = zstd::encode_all(data.as_slice(), 3)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (data, "snap")
        };

        let filename = format!("snapshot-{:012}.{}", snapshot.sequence, ext);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&final_data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        // Make the rename itself durable
        File::open(&self.dir)?.sync_all()?;

        Ok(path)
    }
}

// ── Snapshot Loader ─────────────────────────────────────────────────

/// Loads snapshots from disk, verifying integrity.
pub struct SnapshotLoader {
    dir: PathBuf,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load a specific snapshot file, checking version and checksum.
    pub fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        let data = fs::read(path)?;

        let is_compressed = path.extension().map(|e| e == "zst").unwrap_or(false);

        let decompressed = if is_compressed {
            zstd::decode_all(data.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: Snapshot = bincode::deserialize(&decompressed)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        if !snapshot.verify_integrity() {
            return Err(SnapshotError::IntegrityFailure {
                expected: snapshot.checksum.clone(),
                actual: compute_hash(&snapshot.state),
            });
        }

        Ok(snapshot)
    }

    /// Load the latest snapshot (highest sequence number).
    ///
    /// A damaged latest snapshot is an error; older ones are not tried.
    pub fn load_latest(&self) -> Result<Snapshot, SnapshotError> {
        let path = self.find_latest()?;
        self.load(&path)
    }

    /// Find the path to the latest snapshot.
    pub fn find_latest(&self) -> Result<PathBuf, SnapshotError> {
        self.list_snapshots()?
            .pop()
            .map(|(_, path)| path)
            .ok_or(SnapshotError::NoSnapshots)
    }

    /// List all snapshots as (sequence, path) pairs, ascending.
    pub fn list_snapshots(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = Self::parse_sequence(&name) {
                results.push((seq, entry.path()));
            }
        }
        results.sort_by_key(|(seq, _)| *seq);
        Ok(results)
    }

    fn parse_sequence(filename: &str) -> Option<u64> {
        let rest = filename.strip_prefix("snapshot-")?;
        let digits = rest
            .strip_suffix(".snap.zst")
            .or_else(|| rest.strip_suffix(".snap"))?;
        digits.parse::<u64>().ok()
    }
}

// ── Snapshot Interval Policy ────────────────────────────────────────

/// Policy that determines when to create a new snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotIntervalPolicy {
    /// Create a snapshot every N operations.
    pub event_interval: u64,
    /// Operations applied since the last snapshot.
    pub since_last: u64,
}

impl SnapshotIntervalPolicy {
    /// Create with custom interval (at least 1).
    pub fn with_interval(interval: u64) -> Self {
        Self {
            event_interval: interval.max(1),
            since_last: 0,
        }
    }

    /// Count one applied operation.
    pub fn record_operation(&mut self) {
        self.since_last += 1;
    }

    /// Check if enough operations have accumulated for a snapshot.
    pub fn should_snapshot(&self) -> bool {
        self.since_last >= self.event_interval
    }

    /// Record that a snapshot was taken.
    pub fn record_snapshot(&mut self) {
        self.since_last = 0;
    }
}

impl Default for SnapshotIntervalPolicy {
    fn default() -> Self {
        Self::with_interval(100)
    }
}

// ── Snapshot Cleanup Policy ─────────────────────────────────────────

/// Policy for cleaning up old snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotCleanupPolicy {
    /// Maximum number of snapshots to retain.
    pub max_snapshots: usize,
}

impl SnapshotCleanupPolicy {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Remove old snapshots, keeping only the most recent `max_snapshots`.
    pub fn cleanup(&self, dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
        let snapshots = SnapshotLoader::new(dir).list_snapshots()?;

        let mut removed = Vec::new();
        if snapshots.len() > self.max_snapshots {
            let to_remove = snapshots.len() - self.max_snapshots;
            for (_, path) in snapshots.into_iter().take(to_remove) {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> Vec<u8> {
        (0..=255u8).cycle().take(2048).collect()
    }

    #[test]
    fn test_snapshot_write_and_load_uncompressed() {
        let tmp = TempDir::new().unwrap();
        let snapshot = Snapshot::new("BTC-USDC", 5_000, 1_708_123_456_789_000_000, sample_state());

        let writer = SnapshotWriter::new(tmp.path(), false);
        let path = writer.write(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with("snapshot-000000005000.snap"));

        let loaded = SnapshotLoader::new(tmp.path()).load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.market, "BTC-USDC");
    }

    #[test]
    fn test_snapshot_write_and_load_compressed() {
        let tmp = TempDir::new().unwrap();
        let snapshot = Snapshot::new("ETH-USDC", 7, 1_708_123_456_789_000_000, sample_state());

        let path = SnapshotWriter::new(tmp.path(), true).write(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with(".snap.zst"));

        let loaded = SnapshotLoader::new(tmp.path()).load(&path).unwrap();
        assert_eq!(loaded.state, sample_state());
        assert!(loaded.verify_integrity());
    }

    #[test]
    fn test_snapshot_integrity_hash() {
        let hash1 = compute_hash(&sample_state());
        let hash2 = compute_hash(&sample_state());
        assert_eq!(hash1, hash2, "Hash must be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hex digest is 64 chars");
    }

    #[test]
    fn test_snapshot_integrity_detects_tamper() {
        let mut snapshot = Snapshot::new("BTC-USDC", 100, 1000, sample_state());
        snapshot.state[10] ^= 0x01;
        assert!(!snapshot.verify_integrity());
    }

    #[test]
    fn test_tampered_file_fails_to_load() {
        let tmp = TempDir::new().unwrap();
        let snapshot = Snapshot::new("BTC-USDC", 3, 1000, sample_state());
        let path = SnapshotWriter::new(tmp.path(), false).write(&snapshot).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        // Flip a byte inside the state body, well past the header fields
        let idx = bytes.len() / 2;
        bytes[idx] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let result = SnapshotLoader::new(tmp.path()).load_latest();
        assert!(matches!(result, Err(SnapshotError::IntegrityFailure { .. })));
    }

    #[test]
    fn test_future_version_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut snapshot = Snapshot::new("BTC-USDC", 1, 1000, vec![1, 2, 3]);
        snapshot.version = SNAPSHOT_VERSION + 1;
        let path = SnapshotWriter::new(tmp.path(), false).write(&snapshot).unwrap();

        let result = SnapshotLoader::new(tmp.path()).load(&path);
        assert!(matches!(result, Err(SnapshotError::UnsupportedVersion(v)) if v == SNAPSHOT_VERSION + 1));
    }

    #[test]
    fn test_snapshot_interval_policy() {
        let mut policy = SnapshotIntervalPolicy::with_interval(3);
        policy.record_operation();
        policy.record_operation();
        assert!(!policy.should_snapshot());
        policy.record_operation();
        assert!(policy.should_snapshot());

        policy.record_snapshot();
        assert!(!policy.should_snapshot());
        assert_eq!(SnapshotIntervalPolicy::default().event_interval, 100);
    }

    #[test]
    fn test_snapshot_cleanup_policy() {
        let tmp = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(tmp.path(), false);

        for i in 1..=5u64 {
            let snap = Snapshot::new("BTC-USDC", i * 1000, i as i64 * 1_000_000, vec![i as u8]);
            writer.write(&snap).unwrap();
        }

        let removed = SnapshotCleanupPolicy::new(2).cleanup(tmp.path()).unwrap();
        assert_eq!(removed.len(), 3, "Should remove 3 of 5 snapshots");

        let remaining = SnapshotLoader::new(tmp.path()).list_snapshots().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].0, 4000);
        assert_eq!(remaining[1].0, 5000);
    }

    #[test]
    fn test_load_latest_snapshot() {
        let tmp = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(tmp.path(), false);

        for i in [100u64, 500, 300] {
            writer.write(&Snapshot::new("BTC-USDC", i, i as i64, vec![])).unwrap();
        }

        let latest = SnapshotLoader::new(tmp.path()).load_latest().unwrap();
        assert_eq!(latest.sequence, 500);
    }

    #[test]
    fn test_ignores_leftover_tmp_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("snapshot-000000000009.snap.tmp"), b"partial").unwrap();

        let loader = SnapshotLoader::new(tmp.path());
        assert!(loader.list_snapshots().unwrap().is_empty());
        assert!(matches!(loader.load_latest(), Err(SnapshotError::NoSnapshots)));
    }
}
