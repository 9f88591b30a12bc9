//! Report output for final syntheses.

pub mod generator;

pub use generator::*;
