//! Multi-horizon synthesis.
//!
//! Findings are consolidated at four horizons of growing scope: one task
//! (immediate), a batch of pending findings (incremental), a phase, and the
//! whole session (final).

pub mod controller;
pub mod error_log;

pub use controller::{HorizonController, Outcome};
pub use error_log::ErrorLog;
