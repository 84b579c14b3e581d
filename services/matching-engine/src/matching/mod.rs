//! Matching logic module
//!
//! Contains crossing detection, the slippage guard and trade execution.

pub mod crossing;
pub mod executor;

pub use crossing::{can_match, exceeds_slippage};
pub use executor::MatchExecutor;
