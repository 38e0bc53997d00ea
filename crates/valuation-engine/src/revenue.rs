use rust_decimal::Decimal;

use crate::calculator::{InsufficientData, ValuationStep};

pub const QUARTERS_PER_YEAR: usize = 4;

/// Sums quarterly revenue (most recent first) into trailing-twelve-month figures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevenueAggregator;

impl RevenueAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Sum of the four quarters starting at `offset`.
    pub fn ttm(&self, quarterly_revenues: &[Decimal], offset: usize) -> Result<Decimal, InsufficientData> {
        let end = offset + QUARTERS_PER_YEAR;
        if quarterly_revenues.len() < end {
            return Err(InsufficientData::new(
                ValuationStep::Revenue,
                format!(
                    "need {} quarters of revenue for TTM at offset {}, have {}",
                    end,
                    offset,
                    quarterly_revenues.len()
                ),
            ));
        }

        quarterly_revenues[offset..end]
            .iter()
            .try_fold(Decimal::ZERO, |acc, q| acc.checked_add(*q))
            .ok_or_else(|| InsufficientData::new(ValuationStep::Revenue, "TTM revenue overflowed"))
    }

    /// TTM sums for offsets `0..periods`, stopping at the first offset without a
    /// full four-quarter window. At least the current TTM must be available.
    pub fn rolling_ttm(&self, quarterly_revenues: &[Decimal], periods: usize) -> Result<Vec<Decimal>, InsufficientData> {
        let current = self.ttm(quarterly_revenues, 0)?;
        let available = quarterly_revenues.len() + 1 - QUARTERS_PER_YEAR;
        let mut sums = Vec::with_capacity(periods.min(available).max(1));
        sums.push(current);

        for offset in 1..periods.min(available) {
            sums.push(self.ttm(quarterly_revenues, offset)?);
        }

        Ok(sums)
    }
}
