//! Persistence Service
//!
//! Append-only journal writing, sequential reading with corruption
//! detection, checked state snapshots and crash recovery, exposed to the
//! exchange through the per-market [`BookStore`] seam.
//!
//! Payloads and snapshot state are opaque bytes here; the matching engine
//! owns their encoding.

pub mod journal;
pub mod reader;
pub mod recovery;
pub mod snapshot;
pub mod store;

pub use journal::{FlushPolicy, FsyncPolicy, JournalConfig, JournalEntry, JournalError, JournalWriter};
pub use reader::{JournalReader, ReaderError, TornTail};
pub use recovery::{LoadedState, RecoveryEngine, RecoveryError, RecoveryMetrics};
pub use snapshot::{Snapshot, SnapshotError, SnapshotIntervalPolicy, SnapshotLoader, SnapshotWriter};
pub use store::{BookStore, FileBookStore, FileStore, StoreConfig, StoreError, StoreProvider};
