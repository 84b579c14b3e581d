//! Journal Writer: Append-only event journal with checksums
//!
//! One journal per market. Entries carry a gapless sequence assigned by the
//! store and an opaque payload produced by the matching engine.
//!
//! # Binary Format (per entry)
//! ```text
//! [total_len: u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [event_type_len: u16][event_type: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum: u32]  // CRC32C over sequence+timestamp+event_type+payload
//! ```

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Largest body length accepted when decoding; anything above is corruption
const MAX_BODY_LEN: usize = 100_000_000;

/// Smallest possible body: seq + ts + et_len + pl_len + crc
const MIN_BODY_LEN: usize = 8 + 8 + 2 + 4 + 4;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The buffer ends before the entry does (a torn write at end of file)
    #[error("Incomplete entry: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },

    #[error("Event type too long: {0} bytes")]
    EventTypeTooLong(usize),
}

// ── Journal Entry ───────────────────────────────────────────────────

/// A single journal entry representing one persisted book operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Per-market gapless sequence number, starting at 1
    pub sequence: u64,
    /// Unix nanosecond timestamp of the operation
    pub timestamp: i64,
    /// Event label, e.g. `OrderPlaced`
    pub event_type: String,
    /// Opaque event payload
    pub payload: Vec<u8>,
    /// CRC32C checksum over (sequence ++ timestamp ++ event_type ++ payload)
    pub checksum: u32,
}

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum automatically.
    pub fn new(sequence: u64, timestamp: i64, event_type: String, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, &event_type, &payload);
        Self {
            sequence,
            timestamp,
            event_type,
            payload,
            checksum,
        }
    }

    /// Compute CRC32C over the concatenation of (sequence, timestamp, event_type, payload).
    pub fn compute_checksum(
        sequence: u64,
        timestamp: i64,
        event_type: &str,
        payload: &[u8],
    ) -> u32 {
        let mut buf = Vec::with_capacity(8 + 8 + event_type.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(event_type.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    /// Validate the stored checksum against recomputed value.
    pub fn verify_checksum(&self) -> bool {
        let expected =
            Self::compute_checksum(self.sequence, self.timestamp, &self.event_type, &self.payload);
        self.checksum == expected
    }

    /// Serialize entry to the binary wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, JournalError> {
        let event_type_bytes = self.event_type.as_bytes();
        let event_type_len = u16::try_from(event_type_bytes.len())
            .map_err(|_| JournalError::EventTypeTooLong(event_type_bytes.len()))?;
        let body_len = MIN_BODY_LEN + event_type_bytes.len() + self.payload.len();
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Entry body of {body_len} bytes exceeds {MAX_BODY_LEN}"
            )));
        }

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&event_type_len.to_le_bytes());
        buf.extend_from_slice(event_type_bytes);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        Ok(buf)
    }

    /// Deserialize entry from the binary wire format.
    ///
    /// Returns `(entry, bytes_consumed)` on success. A buffer that ends
    /// before the entry does yields [`JournalError::Incomplete`]; any other
    /// malformed frame is a `Serialization` error.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        if data.len() < 4 {
            return Err(JournalError::Incomplete {
                needed: 4,
                available: data.len(),
            });
        }

        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let total = 4 + body_len;

        if data.len() < total {
            return Err(JournalError::Incomplete {
                needed: total,
                available: data.len(),
            });
        }

        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {} (likely corruption)",
                body_len
            )));
        }

        if body_len < MIN_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Body too small: {} bytes, minimum is {}",
                body_len, MIN_BODY_LEN
            )));
        }

        let mut cursor = Cursor::new(&data[4..total]);
        let sequence = u64::from_le_bytes(cursor.take_array()?);
        let timestamp = i64::from_le_bytes(cursor.take_array()?);

        let event_type_len = u16::from_le_bytes(cursor.take_array()?) as usize;
        let event_type = String::from_utf8(cursor.take(event_type_len)?.to_vec())
            .map_err(|e| JournalError::Serialization(e.to_string()))?;

        let payload_len = u32::from_le_bytes(cursor.take_array()?) as usize;
        let payload = cursor.take(payload_len)?.to_vec();

        let checksum = u32::from_le_bytes(cursor.take_array()?);
        if !cursor.is_empty() {
            return Err(JournalError::Serialization(format!(
                "{} trailing bytes inside entry body",
                cursor.remaining()
            )));
        }

        let entry = Self {
            sequence,
            timestamp,
            event_type,
            payload,
            checksum,
        };

        Ok((entry, total))
    }
}

/// Bounds-checked reader over one entry body
struct Cursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], JournalError> {
        if len > self.remaining() {
            return Err(JournalError::Serialization(format!(
                "field of {} bytes exceeds remaining body ({} bytes)",
                len,
                self.remaining()
            )));
        }
        let slice = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], JournalError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    /// Flush after every write.
    EveryWrite,
    /// Flush every N writes.
    EveryN(usize),
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync after every write.
    EveryWrite,
    /// Fsync every N writes.
    EveryN(usize),
    /// Fsync only on file rotation.
    OnRotation,
}

// ── Journal Writer Configuration ────────────────────────────────────

/// Configuration for the journal writer.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal files.
    pub dir: PathBuf,
    /// Maximum file size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    /// Flush policy.
    pub flush_policy: FlushPolicy,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    /// Create a config with sensible defaults.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024, // 64 MiB
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only journal writer with checksums, rotation, and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
}

impl JournalWriter {
    /// Open a journal writer, creating the directory if needed.
    ///
    /// Appends continue in the highest-numbered existing file.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = list_journal_files(&config.dir)?
            .last()
            .map(|(index, _)| *index)
            .unwrap_or(0);
        let current_file = journal_path(&config.dir, file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence: 1,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
        })
    }

    /// Set the next expected sequence number (used after recovery).
    pub fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }

    /// Get the next expected sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Get the current file path.
    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append a journal entry. Validates sequence continuity.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::SequenceError {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes()?;
        let committed = self.current_file_size;
        if let Err(e) = self.write_entry(&bytes) {
            // The entry is not journaled; drop whatever part of it was written
            if let Err(rollback) = self.truncate_to(committed) {
                warn!(
                    file = %self.current_file.display(),
                    sequence = entry.sequence,
                    error = %rollback,
                    "could not roll back a failed journal append"
                );
            }
            return Err(e);
        }

        self.next_sequence = entry.sequence + 1;
        Ok(())
    }

    /// Create the next entry and append it in one call.
    pub fn write_event(
        &mut self,
        timestamp: i64,
        event_type: String,
        payload: Vec<u8>,
    ) -> Result<JournalEntry, JournalError> {
        let entry = JournalEntry::new(self.next_sequence, timestamp, event_type, payload);
        self.append(&entry)?;
        Ok(entry)
    }

    /// Force flush + fsync (used before shutdown / rotation).
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    /// Close the current file and continue in a fresh one.
    ///
    /// A no-op while the current file is still empty.
    pub fn rotate(&mut self) -> Result<(), JournalError> {
        if self.current_file_size == 0 {
            return Ok(());
        }
        self.sync()?;

        self.file_index += 1;
        self.current_file = journal_path(&self.config.dir, self.file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;

        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }

    /// Delete every journal file older than the one being written.
    ///
    /// Returns the removed paths.
    pub fn remove_older_files(&mut self) -> Result<Vec<PathBuf>, JournalError> {
        let mut removed = Vec::new();
        for (index, path) in list_journal_files(&self.config.dir)? {
            if index < self.file_index {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn write_entry(&mut self, bytes: &[u8]) -> Result<(), JournalError> {
        self.writer.write_all(bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()
    }

    /// Cut the current file back to `len` bytes of entries.
    ///
    /// Entries appended before `len` may still sit in the write buffer, so
    /// the file on disk plus the buffer is what gets cut.
    fn truncate_to(&mut self, len: u64) -> Result<(), JournalError> {
        let reopened = OpenOptions::new().append(true).open(&self.current_file)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(reopened));
        let (file, buffered) = stale.into_parts();
        let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = file.metadata()?.len();
        if len <= on_disk {
            file.set_len(len)?;
        } else {
            let missing = usize::try_from(len - on_disk)
                .unwrap_or(usize::MAX)
                .min(buffered.len());
            self.writer.write_all(&buffered[..missing])?;
            self.writer.flush()?;
        }
        self.current_file_size = len;
        self.writes_since_flush = 0;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), JournalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        // fsync needs the buffer on the OS side first
        if should_flush || self.fsync_due() {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        if self.fsync_due() {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn fsync_due(&self) -> bool {
        match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        }
    }
}

/// Path of journal file `index` inside `dir`
pub fn journal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{:06}.bin", index))
}

/// All journal files in `dir` as `(index, path)`, sorted by index
pub fn list_journal_files(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let index = name
                .strip_prefix("journal-")?
                .strip_suffix(".bin")?
                .parse::<u64>()
                .ok()?;
            Some((index, e.path()))
        })
        .collect();

    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

// ── Tests ───────────────────────────────────────────────────────────
