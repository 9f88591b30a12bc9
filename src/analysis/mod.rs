//! Analysis modules.
//!
//! Aggregation shared by every synthesis horizon.

pub mod aggregator;

pub use aggregator::*;
