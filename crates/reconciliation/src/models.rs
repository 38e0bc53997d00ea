use valuation_core::{TickerRecord, TrackerError};

/// What `add_ticker` appended.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Complete provider data and a full valuation
    Valued(TickerRecord),
    /// Complete provider data, but the valuation stopped at some step
    Unvalued { record: TickerRecord, reason: String },
    /// Key and growth rates only; a later refresh fills in the rest
    Placeholder { record: TickerRecord, reason: String },
}

impl AddOutcome {
    pub fn record(&self) -> &TickerRecord {
        match self {
            AddOutcome::Valued(record) => record,
            AddOutcome::Unvalued { record, .. } => record,
            AddOutcome::Placeholder { record, .. } => record,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, AddOutcome::Placeholder { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub ticker: String,
    pub error: TrackerError,
}

/// Per-ticker outcome of a refresh, in storage order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub total: usize,
    /// Rewritten with a full valuation
    pub refreshed: Vec<String>,
    /// Rewritten with fresh facts but empty derived fields
    pub unvalued: Vec<String>,
    pub failures: Vec<TickerFailure>,
    /// False when nothing changed and the table was left untouched
    pub rewritten: bool,
}

impl RefreshSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_tickers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.ticker.as_str()).collect()
    }
}
