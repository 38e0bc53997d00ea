use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use valuation_core::{GrowthRates, RecordStatus, TickerRecord, MAX_FORECAST_YEARS};

/// Fixed header, in storage order.
pub const COLUMNS: [&str; 16] = [
    "Ticker",
    "Name",
    "Currency",
    "Price",
    "SharesOutstanding",
    "MarketCap",
    "RevenueTTM",
    "PSRatio",
    "Growth1",
    "Growth2",
    "Growth3",
    "ProjectedRevenue",
    "TargetPrice",
    "UpsidePct",
    "Status",
    "UpdatedAt",
];

const TICKER: usize = 0;
const NAME: usize = 1;
const CURRENCY: usize = 2;
const PRICE: usize = 3;
const SHARES: usize = 4;
const MARKET_CAP: usize = 5;
const REVENUE_TTM: usize = 6;
const PS_RATIO: usize = 7;
const GROWTH_FIRST: usize = 8;
const PROJECTED_REVENUE: usize = 11;
const TARGET_PRICE: usize = 12;
const UPSIDE_PCT: usize = 13;
const STATUS: usize = 14;
const UPDATED_AT: usize = 15;

pub fn header() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

pub fn header_matches(row: &[String]) -> bool {
    row.len() >= COLUMNS.len()
        && row.iter().zip(COLUMNS.iter()).all(|(cell, col)| cell.trim() == *col)
        && row[COLUMNS.len()..].iter().all(|cell| cell.trim().is_empty())
}

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map(|d| d.normalize().to_string()).unwrap_or_default()
}

pub fn encode_row(record: &TickerRecord) -> Vec<String> {
    let mut row = vec![String::new(); COLUMNS.len()];
    row[TICKER] = record.ticker.clone();
    row[NAME] = record.name.clone().unwrap_or_default();
    row[CURRENCY] = record.currency.clone().unwrap_or_default();
    row[PRICE] = decimal_cell(record.price);
    row[SHARES] = decimal_cell(record.shares_outstanding);
    row[MARKET_CAP] = decimal_cell(record.market_cap);
    row[REVENUE_TTM] = decimal_cell(record.revenue_ttm);
    row[PS_RATIO] = decimal_cell(record.ps_ratio);
    for (i, rate) in record.growth_rates.as_slice().iter().enumerate() {
        row[GROWTH_FIRST + i] = decimal_cell(Some(*rate));
    }
    row[PROJECTED_REVENUE] = decimal_cell(record.projected_revenue);
    row[TARGET_PRICE] = decimal_cell(record.target_price);
    row[UPSIDE_PCT] = decimal_cell(record.upside_pct);
    row[STATUS] = record.status.as_cell();
    row[UPDATED_AT] = record.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default();
    row
}

struct RowReader<'a> {
    ticker: &'a str,
    cells: &'a [String],
}

impl<'a> RowReader<'a> {
    fn text(&self, idx: usize) -> &'a str {
        self.cells.get(idx).map(|c| c.trim()).unwrap_or("")
    }

    fn optional_text(&self, idx: usize) -> Option<String> {
        Some(self.text(idx)).filter(|s| !s.is_empty()).map(str::to_string)
    }

    fn decimal(&self, idx: usize) -> Option<Decimal> {
        let cell = self.text(idx);
        if cell.is_empty() {
            return None;
        }
        match Decimal::from_str(cell).or_else(|_| Decimal::from_scientific(cell)) {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::warn!("{}: column {} holds '{}', reading it as empty", self.ticker, COLUMNS[idx], cell);
                None
            }
        }
    }

    /// Growth1..3 read as a contiguous prefix. A filled cell after a blank
    /// one is malformed and falls back to the defaults.
    fn growth(&self, default: &GrowthRates) -> GrowthRates {
        let cells: Vec<Option<Decimal>> = (GROWTH_FIRST..GROWTH_FIRST + MAX_FORECAST_YEARS)
            .map(|idx| self.decimal(idx))
            .collect();
        let filled = cells.iter().take_while(|c| c.is_some()).count();

        if cells[filled..].iter().any(Option::is_some) {
            tracing::warn!("{}: growth columns have a gap, using defaults", self.ticker);
            return default.clone();
        }
        if filled == 0 {
            return default.clone();
        }

        let rates: Vec<Decimal> = cells.into_iter().flatten().collect();
        GrowthRates::new(rates).unwrap_or_else(|e| {
            tracing::warn!("{}: stored growth rates rejected ({}), using defaults", self.ticker, e);
            default.clone()
        })
    }

    fn timestamp(&self, idx: usize) -> Option<DateTime<Utc>> {
        let cell = self.text(idx);
        if cell.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(cell)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| tracing::warn!("{}: unreadable timestamp '{}'", self.ticker, cell))
            .ok()
    }
}

/// Read one data row. Rows with a blank ticker cell yield `None`.
pub fn decode_row(cells: &[String], default_growth: &GrowthRates) -> Option<TickerRecord> {
    let ticker = cells.get(TICKER).map(|c| c.trim().to_uppercase()).unwrap_or_default();
    if ticker.is_empty() {
        return None;
    }

    let reader = RowReader { ticker: &ticker, cells };
    Some(TickerRecord {
        name: reader.optional_text(NAME),
        currency: reader.optional_text(CURRENCY),
        price: reader.decimal(PRICE),
        shares_outstanding: reader.decimal(SHARES),
        market_cap: reader.decimal(MARKET_CAP),
        revenue_ttm: reader.decimal(REVENUE_TTM),
        ps_ratio: reader.decimal(PS_RATIO),
        growth_rates: reader.growth(default_growth),
        projected_revenue: reader.decimal(PROJECTED_REVENUE),
        target_price: reader.decimal(TARGET_PRICE),
        upside_pct: reader.decimal(UPSIDE_PCT),
        status: RecordStatus::from_cell(reader.text(STATUS)),
        updated_at: reader.timestamp(UPDATED_AT),
        ticker: ticker.clone(),
    })
}
