//! Matching Engine Service
//!
//! In-memory limit-order matching for one market at a time, implementing
//! price-time priority with partial fills.
//!
//! **Key Invariants:**
//! - Each book side stays sorted by price, then acceptance time
//! - The book is never left crossed when a call returns
//! - Deterministic matching (same events in, same book and trades out)
//! - Conservation of quantity

pub mod book;
pub mod depth;
pub mod engine;
pub mod events;
pub mod matching;
pub mod state;

pub use book::OrderBook;
pub use depth::{DepthView, DEFAULT_DEPTH_LEVELS};
pub use engine::{MatchingConfig, MatchingCore, NewOrder, PartialFill, PlaceResult};
pub use events::BookEvent;
pub use state::{BookState, StateError};
