use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::TickerRecord;

pub const MONEY_DP: u32 = 2;
pub const PERCENT_DP: u32 = 1;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_percent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PERCENT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// A record rounded for output. Stored values keep full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub ticker: String,
    pub name: String,
    pub currency: String,
    pub price: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub revenue_ttm: Option<Decimal>,
    pub ps_ratio: Option<Decimal>,
    pub growth: String,
    pub projected_revenue: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub upside_pct: Option<Decimal>,
    pub status: String,
}

impl From<&TickerRecord> for DisplayRow {
    fn from(record: &TickerRecord) -> Self {
        Self {
            ticker: record.ticker.clone(),
            name: record.name.clone().unwrap_or_default(),
            currency: record.currency.clone().unwrap_or_default(),
            price: record.price.map(round_money),
            market_cap: record.market_cap.map(round_money),
            revenue_ttm: record.revenue_ttm.map(round_money),
            ps_ratio: record.ps_ratio.map(round_money),
            growth: record.growth_rates.to_string(),
            projected_revenue: record.projected_revenue.map(round_money),
            target_price: record.target_price.map(round_money),
            upside_pct: record.upside_pct.map(round_percent),
            status: record.status.as_cell(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GrowthRates, RecordStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn test_rounding() {
        assert_eq!(round_money(dec!(133.105)), dec!(133.11));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_percent(dec!(12.25)), dec!(12.3));
    }

    #[test]
    fn test_display_row_rounds_only_output() {
        let mut record = TickerRecord::placeholder("AAPL", GrowthRates::default());
        record.price = Some(dec!(187.456));
        record.target_price = Some(dec!(201.3333333));
        record.upside_pct = Some(dec!(7.40272));
        record.status = RecordStatus::Valued;

        let row = DisplayRow::from(&record);
        assert_eq!(row.price, Some(dec!(187.46)));
        assert_eq!(row.target_price, Some(dec!(201.33)));
        assert_eq!(row.upside_pct, Some(dec!(7.4)));
        assert_eq!(row.ps_ratio, None);
        assert_eq!(row.status, "ok");
        assert_eq!(record.target_price, Some(dec!(201.3333333)));
    }
}
