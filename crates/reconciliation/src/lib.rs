//! Keeps the tracked-ticker table in step with provider data.
//!
//! `ReconciliationController` is the only writer of the table. It owns duplicate
//! prevention, per-ticker failure isolation during refresh and the single bulk
//! rewrite that follows it.

pub mod controller;
pub mod models;

pub use controller::{ControllerConfig, ReconciliationController};
pub use models::{AddOutcome, RefreshSummary, TickerFailure};
