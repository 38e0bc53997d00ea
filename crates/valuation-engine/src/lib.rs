//! Price-to-sales valuation engine.
//!
//! Reduces quarterly revenue into trailing-twelve-month figures, derives a
//! P/S multiple, compounds revenue forward year by year and backs out a
//! target price with its upside against the current price.

pub mod calculator;
pub mod revenue;

pub use calculator::{
    InsufficientData, Valuation, ValuationCalculator, ValuationInputs, ValuationResult,
    ValuationStep,
};
pub use revenue::{RevenueAggregator, QUARTERS_PER_YEAR};
