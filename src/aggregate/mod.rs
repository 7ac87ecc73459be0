//! Streaming ride aggregation.
//!
//! Rides are folded one at a time into an [`AggregationState`], which can be
//! merged with other partial states and finalized into an immutable
//! [`StatisticsSnapshot`].

pub mod bins;
pub mod counter;
pub mod state;
pub mod types;
pub mod utility;

pub use state::{AggregationConfig, AggregationState, NegativeDurationPolicy};
pub use types::StatisticsSnapshot;
