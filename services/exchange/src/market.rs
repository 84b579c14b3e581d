//! One market: its matching core, its store and its snapshot cadence
//!
//! Every mutation goes through [`MarketState`] while the caller holds the
//! market's write lock, so the book is changed, journaled and (when due)
//! snapshotted as one step.

use matching_engine::{BookEvent, BookState, MatchingConfig, MatchingCore, StateError};
use persistence::{BookStore, SnapshotIntervalPolicy, StoreError};
use serde::Serialize;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{info, warn};
use types::ids::MarketId;

/// Why a market could not be brought back or checkpointed
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("state: {0}")]
    State(#[from] StateError),
}

/// What happened to the persistent record of a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Durability {
    /// Appended to the journal under `sequence`
    Journaled { sequence: u64 },
    /// Persistence is disabled
    Volatile,
    /// The book changed but the journal write failed
    Failed { reason: String },
}

impl Durability {
    pub fn is_failed(&self) -> bool {
        matches!(self, Durability::Failed { .. })
    }
}

/// Summary of what recovery rebuilt
#[derive(Debug, Clone, Default)]
pub struct RecoverySummary {
    pub snapshot_sequence: Option<u64>,
    pub replayed: u64,
    pub torn_tail_bytes: u64,
}

pub(crate) struct MarketState {
    pub(crate) core: MatchingCore,
    store: Option<Box<dyn BookStore>>,
    snapshots: SnapshotIntervalPolicy,
}

impl MarketState {
    /// Rebuild a market from its store, or start empty without one
    pub(crate) fn recover(
        market: MarketId,
        store: Option<Box<dyn BookStore>>,
        matching: MatchingConfig,
        snapshot_interval: u64,
    ) -> Result<(Self, RecoverySummary), MarketError> {
        let snapshots = SnapshotIntervalPolicy::with_interval(snapshot_interval);
        let Some(mut store) = store else {
            let core = MatchingCore::new(market, matching);
            return Ok((
                Self {
                    core,
                    store: None,
                    snapshots,
                },
                RecoverySummary::default(),
            ));
        };

        let loaded = store.load_state()?;
        let mut core = match &loaded.snapshot {
            Some(snapshot) => {
                let state = BookState::decode(&snapshot.state)?;
                MatchingCore::restore(market, state, matching)?
            }
            None => MatchingCore::new(market, matching),
        };
        for entry in &loaded.entries {
            let event = BookEvent::decode(&entry.payload)?;
            core.apply(event, entry.timestamp).map_err(|e| {
                StateError::Replay(format!("journal sequence {}: {}", entry.sequence, e))
            })?;
        }

        let summary = RecoverySummary {
            snapshot_sequence: loaded.snapshot.as_ref().map(|s| s.sequence),
            replayed: loaded.metrics.replay_count,
            torn_tail_bytes: loaded.metrics.torn_tail_bytes,
        };
        let mut state = Self {
            core,
            store: Some(store),
            snapshots,
        };
        // Replayed entries count toward the next snapshot
        state.snapshots.since_last = summary.replayed;
        Ok((state, summary))
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Journal an event that has already been applied to the core
    pub(crate) fn record(&mut self, event: &BookEvent, timestamp: i64) -> Durability {
        let Some(store) = self.store.as_mut() else {
            return Durability::Volatile;
        };

        let appended = event
            .encode()
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                store
                    .append_entry(timestamp, event.event_type(), payload)
                    .map_err(|e| e.to_string())
            });

        match appended {
            Ok(sequence) => {
                self.snapshots.record_operation();
                if self.snapshots.should_snapshot() {
                    if let Err(e) = self.checkpoint(timestamp) {
                        warn!(market = %self.core.market(), error = %e, "periodic snapshot failed");
                    }
                }
                Durability::Journaled { sequence }
            }
            Err(reason) => {
                warn!(
                    market = %self.core.market(),
                    event = event.event_type(),
                    error = %reason,
                    "journal write failed; in-memory book is ahead of disk"
                );
                // The journal dropped the partial entry; a snapshot of the
                // current book covers the missed operation
                match self.checkpoint(timestamp) {
                    Ok(Some(sequence)) => {
                        info!(market = %self.core.market(), sequence, "store re-anchored by snapshot")
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(market = %self.core.market(), error = %e, "re-anchoring snapshot failed")
                    }
                }
                Durability::Failed { reason }
            }
        }
    }

    /// Snapshot the book now; `None` without a store
    pub(crate) fn checkpoint(&mut self, timestamp: i64) -> Result<Option<u64>, MarketError> {
        let Some(store) = self.store.as_mut() else {
            return Ok(None);
        };
        let state = self.core.state().encode()?;
        let sequence = store.write_snapshot(timestamp, state)?;
        self.snapshots.record_snapshot();
        Ok(Some(sequence))
    }
}

pub(crate) enum MarketStatus {
    Available(RwLock<MarketState>),
    Unavailable { reason: String },
}

/// A configured market
pub struct Market {
    pub(crate) id: MarketId,
    pub(crate) numeric_id: u32,
    pub(crate) status: MarketStatus,
}

impl Market {
    pub fn id(&self) -> &MarketId {
        &self.id
    }

    pub fn numeric_id(&self) -> u32 {
        self.numeric_id
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, MarketStatus::Available(_))
    }

    /// Why recovery refused this market
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.status {
            MarketStatus::Available(_) => None,
            MarketStatus::Unavailable { reason } => Some(reason),
        }
    }
}
