//! Scan sessions: validation, concurrent per-method pipelines, progress and
//! the terminal-state bookkeeping.

mod manager;
mod pipeline;
mod state;

pub use manager::{ScanManager, SessionSettings};
pub use state::ProgressReporter;
