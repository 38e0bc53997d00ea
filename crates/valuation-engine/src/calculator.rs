use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use valuation_core::{GrowthRates, RecordStatus, TickerRecord, TrackerError};

/// The stage of the projection that rejected its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuationStep {
    Revenue,
    PsMultiple,
    Projection,
    TargetPrice,
    Upside,
}

impl ValuationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationStep::Revenue => "revenue",
            ValuationStep::PsMultiple => "p/s multiple",
            ValuationStep::Projection => "projection",
            ValuationStep::TargetPrice => "target price",
            ValuationStep::Upside => "upside",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientData {
    pub step: ValuationStep,
    pub reason: String,
}

impl InsufficientData {
    pub fn new(step: ValuationStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step.as_str(), self.reason)
    }
}

impl From<InsufficientData> for TrackerError {
    fn from(e: InsufficientData) -> Self {
        TrackerError::InsufficientData(e.to_string())
    }
}

/// Raw facts the projection is computed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationInputs {
    pub price: Option<Decimal>,
    pub shares_outstanding: Option<Decimal>,
    /// Falls back to `price * shares_outstanding` when missing
    pub market_cap: Option<Decimal>,
    pub revenue_ttm: Option<Decimal>,
    /// TTM sums for consecutive trailing periods, current first. When non-empty
    /// the multiple is the mean of `market_cap / ttm` over the positive entries.
    pub trailing_ttm: Vec<Decimal>,
}

impl ValuationInputs {
    pub fn from_record(record: &TickerRecord) -> Self {
        Self {
            price: record.price,
            shares_outstanding: record.shares_outstanding,
            market_cap: record.market_cap,
            revenue_ttm: record.revenue_ttm,
            trailing_ttm: Vec::new(),
        }
    }
}

/// Fully derived fields. All or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub ps_ratio: Decimal,
    pub projected_revenue: Decimal,
    pub target_price: Decimal,
    pub upside_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuationResult {
    Complete(Valuation),
    Insufficient(InsufficientData),
}

impl ValuationResult {
    pub fn valuation(&self) -> Option<&Valuation> {
        match self {
            ValuationResult::Complete(v) => Some(v),
            ValuationResult::Insufficient(_) => None,
        }
    }

    pub fn insufficient(&self) -> Option<&InsufficientData> {
        match self {
            ValuationResult::Complete(_) => None,
            ValuationResult::Insufficient(e) => Some(e),
        }
    }

    /// Overwrite every derived field of `record`. Missing data leaves them all empty.
    pub fn apply_to(&self, record: &mut TickerRecord) {
        match self {
            ValuationResult::Complete(v) => {
                record.ps_ratio = Some(v.ps_ratio);
                record.projected_revenue = Some(v.projected_revenue);
                record.target_price = Some(v.target_price);
                record.upside_pct = Some(v.upside_pct);
                record.status = RecordStatus::Valued;
            }
            ValuationResult::Insufficient(e) => {
                record.clear_derived();
                record.status = RecordStatus::Insufficient(e.to_string());
            }
        }
    }
}

impl From<Result<Valuation, InsufficientData>> for ValuationResult {
    fn from(result: Result<Valuation, InsufficientData>) -> Self {
        match result {
            Ok(v) => ValuationResult::Complete(v),
            Err(e) => ValuationResult::Insufficient(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValuationCalculator;

impl ValuationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Run all four steps, stopping at the first one whose inputs are unusable.
    pub fn project(&self, inputs: &ValuationInputs, growth: &GrowthRates) -> ValuationResult {
        let result = self.ps_multiple(inputs).and_then(|ps| {
            self.project_from_multiple(
                ps,
                inputs.revenue_ttm,
                inputs.shares_outstanding,
                inputs.price,
                growth,
            )
        });

        if let Err(e) = &result {
            tracing::debug!("Valuation stopped at {}", e);
        }
        result.into()
    }

    /// Steps 2-4 against an already known multiple.
    pub fn project_with_multiple(
        &self,
        ps: Decimal,
        revenue_ttm: Option<Decimal>,
        shares_outstanding: Option<Decimal>,
        price: Option<Decimal>,
        growth: &GrowthRates,
    ) -> ValuationResult {
        if ps <= Decimal::ZERO {
            return ValuationResult::Insufficient(InsufficientData::new(
                ValuationStep::PsMultiple,
                format!("multiple {} is not positive", ps),
            ));
        }
        self.project_from_multiple(ps, revenue_ttm, shares_outstanding, price, growth)
            .into()
    }

    /// Step 1: market cap over TTM revenue, or the mean over trailing periods.
    pub fn ps_multiple(&self, inputs: &ValuationInputs) -> Result<Decimal, InsufficientData> {
        let step = ValuationStep::PsMultiple;

        let revenue = match inputs.revenue_ttm {
            Some(r) if r > Decimal::ZERO => r,
            Some(r) => {
                return Err(InsufficientData::new(step, format!("TTM revenue {} is not positive", r)))
            }
            None => return Err(InsufficientData::new(step, "TTM revenue unavailable")),
        };

        let market_cap = match (inputs.market_cap, inputs.price, inputs.shares_outstanding) {
            (Some(mc), _, _) => mc,
            (None, Some(price), Some(shares)) => price
                .checked_mul(shares)
                .ok_or_else(|| InsufficientData::new(step, "market cap overflowed"))?,
            _ => return Err(InsufficientData::new(step, "market cap unavailable")),
        };
        if market_cap <= Decimal::ZERO {
            return Err(InsufficientData::new(
                step,
                format!("market cap {} is not positive", market_cap),
            ));
        }

        if inputs.trailing_ttm.is_empty() {
            return market_cap
                .checked_div(revenue)
                .ok_or_else(|| InsufficientData::new(step, "p/s overflowed"));
        }

        let samples: Vec<Decimal> = inputs
            .trailing_ttm
            .iter()
            .filter(|ttm| **ttm > Decimal::ZERO)
            .filter_map(|ttm| market_cap.checked_div(*ttm))
            .collect();

        if samples.is_empty() {
            return Err(InsufficientData::new(
                step,
                format!("none of {} trailing periods has positive revenue", inputs.trailing_ttm.len()),
            ));
        }

        let total = samples
            .iter()
            .try_fold(Decimal::ZERO, |acc, ps| acc.checked_add(*ps))
            .ok_or_else(|| InsufficientData::new(step, "p/s average overflowed"))?;
        total
            .checked_div(Decimal::from(samples.len()))
            .ok_or_else(|| InsufficientData::new(step, "p/s average overflowed"))
    }

    /// Step 2: one multiplicative factor per forecast year, each compounding
    /// on the previous year's figure.
    pub fn compound(&self, revenue_ttm: Decimal, growth: &GrowthRates) -> Result<Decimal, InsufficientData> {
        growth.as_slice().iter().try_fold(revenue_ttm, |projected, rate| {
            let factor = dec!(1) + *rate / dec!(100);
            projected.checked_mul(factor).ok_or_else(|| {
                InsufficientData::new(ValuationStep::Projection, "projected revenue overflowed")
            })
        })
    }

    fn project_from_multiple(
        &self,
        ps: Decimal,
        revenue_ttm: Option<Decimal>,
        shares_outstanding: Option<Decimal>,
        price: Option<Decimal>,
        growth: &GrowthRates,
    ) -> Result<Valuation, InsufficientData> {
        let revenue = revenue_ttm
            .filter(|r| *r > Decimal::ZERO)
            .ok_or_else(|| InsufficientData::new(ValuationStep::Projection, "TTM revenue unavailable"))?;
        let projected_revenue = self.compound(revenue, growth)?;

        let step = ValuationStep::TargetPrice;
        let shares = match shares_outstanding {
            Some(s) if s > Decimal::ZERO => s,
            Some(s) => {
                return Err(InsufficientData::new(step, format!("shares outstanding {} is not positive", s)))
            }
            None => return Err(InsufficientData::new(step, "shares outstanding unavailable")),
        };
        let target_price = projected_revenue
            .checked_div(shares)
            .and_then(|per_share| per_share.checked_mul(ps))
            .ok_or_else(|| InsufficientData::new(step, "target price overflowed"))?;

        let step = ValuationStep::Upside;
        let price = match price {
            Some(p) if p > Decimal::ZERO => p,
            Some(p) => return Err(InsufficientData::new(step, format!("price {} is not positive", p))),
            None => return Err(InsufficientData::new(step, "price unavailable")),
        };
        let upside_pct = (target_price - price)
            .checked_div(price)
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .ok_or_else(|| InsufficientData::new(step, "upside overflowed"))?;

        Ok(Valuation {
            ps_ratio: ps,
            projected_revenue,
            target_price,
            upside_pct,
        })
    }
}
