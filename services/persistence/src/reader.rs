//! Journal Reader: Sequential reader with corruption detection
//!
//! Features:
//! - Sequential entry reading across rotated journal files
//! - CRC32C checksum validation on every read
//! - Corruption detection with file and byte-offset reporting
//! - Torn-tail detection: a partial entry at the end of the last file
//!   ends the journal instead of failing it
//! - Gapless / monotonic sequence validation

use crate::journal::{list_journal_files, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch in {} at byte offset {offset}: entry seq={sequence}", file.display())]
    ChecksumMismatch {
        file: PathBuf,
        offset: u64,
        sequence: u64,
    },

    #[error("Corruption detected in {} at byte offset {offset}: {detail}", file.display())]
    Corruption {
        file: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("Sequence not monotonic: prev={prev}, current={current}")]
    NotMonotonic { prev: u64, current: u64 },
}

// ── Corruption Log Entry ────────────────────────────────────────────

/// Structured corruption log entry for diagnostics.
#[derive(Debug, Clone)]
pub struct CorruptionRecord {
    /// File the corruption was found in.
    pub file: PathBuf,
    /// Byte offset in the file where corruption was detected.
    pub byte_offset: u64,
    /// Type of corruption.
    pub kind: CorruptionKind,
    /// Human-readable detail message.
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorruptionKind {
    ChecksumMismatch,
    TruncatedEntry,
    MalformedEntry,
}

/// A partial entry at the end of the newest journal file
#[derive(Debug, Clone, PartialEq)]
pub struct TornTail {
    pub file: PathBuf,
    /// Length of the valid prefix; everything after it is the torn entry
    pub valid_len: u64,
    /// Bytes that could not be parsed
    pub torn_bytes: u64,
}

// ── Journal Reader ──────────────────────────────────────────────────

/// Sequential journal reader with checksum validation and corruption detection.
pub struct JournalReader {
    /// All journal file paths, sorted by index.
    files: Vec<PathBuf>,
    /// Index of the current file being read.
    current_file_idx: usize,
    /// Raw data of the current file.
    data: Vec<u8>,
    /// Current read position within `data`.
    pos: usize,
    /// Last successfully read sequence number.
    last_sequence: Option<u64>,
    torn_tail: Option<TornTail>,
    /// Accumulated corruption records.
    corruption_log: Vec<CorruptionRecord>,
}

impl JournalReader {
    /// Open a reader over all journal files in the given directory.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let files = list_journal_files(dir)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        let mut reader = Self {
            files,
            current_file_idx: 0,
            data: Vec::new(),
            pos: 0,
            last_sequence: None,
            torn_tail: None,
            corruption_log: Vec::new(),
        };
        reader.load_current_file()?;
        Ok(reader)
    }

    /// Read the next valid entry, validating its checksum.
    ///
    /// Returns `None` when all entries have been read, or when the newest
    /// file ends in a torn entry (see [`torn_tail`](Self::torn_tail)).
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        if self.pos >= self.data.len() && !self.advance_file()? {
            return Ok(None);
        }

        let offset = self.pos as u64;
        match JournalEntry::from_bytes(&self.data[self.pos..]) {
            Ok((entry, consumed)) => {
                if !entry.verify_checksum() {
                    let file = self.current_file();
                    self.corruption_log.push(CorruptionRecord {
                        file: file.clone(),
                        byte_offset: offset,
                        kind: CorruptionKind::ChecksumMismatch,
                        detail: format!(
                            "CRC32C mismatch for seq={}, stored={:#010x}",
                            entry.sequence, entry.checksum
                        ),
                    });
                    return Err(ReaderError::ChecksumMismatch {
                        file,
                        offset,
                        sequence: entry.sequence,
                    });
                }

                self.pos += consumed;
                self.last_sequence = Some(entry.sequence);
                Ok(Some(entry))
            }
            Err(JournalError::Incomplete { needed, available }) if self.on_last_file() => {
                let file = self.current_file();
                let torn_bytes = (self.data.len() - self.pos) as u64;
                self.corruption_log.push(CorruptionRecord {
                    file: file.clone(),
                    byte_offset: offset,
                    kind: CorruptionKind::TruncatedEntry,
                    detail: format!(
                        "Torn entry at end of journal: need {needed} bytes, have {available}"
                    ),
                });
                self.torn_tail = Some(TornTail {
                    file,
                    valid_len: offset,
                    torn_bytes,
                });
                self.pos = self.data.len();
                Ok(None)
            }
            Err(e) => {
                let file = self.current_file();
                let kind = match e {
                    JournalError::Incomplete { .. } => CorruptionKind::TruncatedEntry,
                    _ => CorruptionKind::MalformedEntry,
                };
                self.corruption_log.push(CorruptionRecord {
                    file: file.clone(),
                    byte_offset: offset,
                    kind,
                    detail: e.to_string(),
                });
                Err(ReaderError::Corruption {
                    file,
                    offset,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Read all valid entries, collecting them into a Vec.
    pub fn read_all(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Read all entries, failing on the first sequence violation.
    pub fn read_all_validated(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let entries = self.read_all()?;
        Self::validate_sequences(&entries)?;
        Ok(entries)
    }

    /// Get the last successfully read sequence number.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// The torn entry that ended the read, if any.
    pub fn torn_tail(&self) -> Option<&TornTail> {
        self.torn_tail.as_ref()
    }

    /// Get all accumulated corruption records.
    pub fn corruption_log(&self) -> &[CorruptionRecord] {
        &self.corruption_log
    }

    /// Validate that a list of entries has gapless, monotonic sequences.
    pub fn validate_sequences(entries: &[JournalEntry]) -> Result<(), ReaderError> {
        for window in entries.windows(2) {
            let prev = &window[0];
            let curr = &window[1];

            if curr.sequence <= prev.sequence {
                return Err(ReaderError::NotMonotonic {
                    prev: prev.sequence,
                    current: curr.sequence,
                });
            }

            if curr.sequence != prev.sequence + 1 {
                return Err(ReaderError::SequenceGap {
                    expected: prev.sequence + 1,
                    got: curr.sequence,
                });
            }
        }
        Ok(())
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn current_file(&self) -> PathBuf {
        self.files
            .get(self.current_file_idx)
            .cloned()
            .unwrap_or_default()
    }

    /// True when no later file holds any data
    fn on_last_file(&self) -> bool {
        self.files
            .iter()
            .skip(self.current_file_idx + 1)
            .all(|path| fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false))
    }

    fn load_current_file(&mut self) -> Result<(), ReaderError> {
        self.data.clear();
        self.pos = 0;
        if let Some(path) = self.files.get(self.current_file_idx) {
            self.data = fs::read(path)?;
        }
        Ok(())
    }

    fn advance_file(&mut self) -> Result<bool, ReaderError> {
        while self.current_file_idx + 1 < self.files.len() {
            self.current_file_idx += 1;
            self.load_current_file()?;
            if !self.data.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
