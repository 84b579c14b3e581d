//! Exchange node
//!
//! Ties the per-market matching cores to their stores: configuration,
//! startup recovery, the [`MarketRegistry`] that routes operations to
//! markets, and durability reporting for every mutation.

pub mod config;
pub mod market;
pub mod registry;

pub use config::{ConfigError, EngineConfig, MarketConfig, PersistenceConfig};
pub use market::{Durability, Market};
pub use registry::{
    CancelOutcome, ClearOutcome, MarketInfo, MarketRegistry, OpenError, OrderRequest,
    PlaceOutcome,
};
