use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TrackerError;

/// Number of forecast years a record can carry growth assumptions for.
pub const MAX_FORECAST_YEARS: usize = 3;

/// Trim and upper-case a user supplied symbol. Empty input is rejected.
pub fn normalize_symbol(symbol: &str) -> Result<String, TrackerError> {
    let normalized = symbol.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(TrackerError::InvalidInput("symbol is empty".to_string()));
    }
    if normalized.chars().any(char::is_whitespace) {
        return Err(TrackerError::InvalidInput(format!(
            "symbol '{}' contains whitespace",
            normalized
        )));
    }
    Ok(normalized)
}

/// Point-in-time facts for one symbol. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub shares_outstanding: Option<Decimal>,
    pub market_cap: Option<Decimal>,
}

/// Per-year growth assumptions in percent, applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Decimal>", into = "Vec<Decimal>")]
pub struct GrowthRates(Vec<Decimal>);

impl GrowthRates {
    pub fn new(rates: Vec<Decimal>) -> Result<Self, TrackerError> {
        if rates.is_empty() || rates.len() > MAX_FORECAST_YEARS {
            return Err(TrackerError::InvalidInput(format!(
                "expected 1 to {} growth rates, got {}",
                MAX_FORECAST_YEARS,
                rates.len()
            )));
        }
        if let Some(bad) = rates.iter().find(|g| **g < dec!(-100)) {
            return Err(TrackerError::InvalidInput(format!(
                "growth rate {}% is below -100%",
                bad
            )));
        }
        Ok(Self(rates))
    }

    /// The same rate compounded over `years` forecast years.
    pub fn repeated(rate: Decimal, years: usize) -> Result<Self, TrackerError> {
        Self::new(vec![rate; years])
    }

    pub fn as_slice(&self) -> &[Decimal] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for GrowthRates {
    fn default() -> Self {
        Self(vec![dec!(20)])
    }
}

impl TryFrom<Vec<Decimal>> for GrowthRates {
    type Error = TrackerError;

    fn try_from(rates: Vec<Decimal>) -> Result<Self, Self::Error> {
        Self::new(rates)
    }
}

impl From<GrowthRates> for Vec<Decimal> {
    fn from(rates: GrowthRates) -> Self {
        rates.0
    }
}

impl FromStr for GrowthRates {
    type Err = TrackerError;

    /// Accepts "20", "20,15,10" or "20 15 10"; a trailing '%' is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rates = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let part = part.trim_end_matches('%');
                Decimal::from_str(part).map_err(|_| {
                    TrackerError::InvalidInput(format!("'{}' is not a growth rate", part))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rates)
    }
}

impl fmt::Display for GrowthRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|g| g.normalize().to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Where a record sits in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Key-only row waiting for a refresh to fill it in
    #[default]
    Pending,
    Valued,
    Insufficient(String),
}

impl RecordStatus {
    pub fn as_cell(&self) -> String {
        match self {
            RecordStatus::Pending => "pending".to_string(),
            RecordStatus::Valued => "ok".to_string(),
            RecordStatus::Insufficient(reason) => format!("insufficient: {}", reason),
        }
    }

    pub fn from_cell(cell: &str) -> Self {
        let cell = cell.trim();
        match cell {
            "" | "pending" => RecordStatus::Pending,
            "ok" => RecordStatus::Valued,
            other => RecordStatus::Insufficient(
                other
                    .strip_prefix("insufficient:")
                    .map(str::trim)
                    .unwrap_or(other)
                    .to_string(),
            ),
        }
    }
}

/// One tracked symbol, keyed by `ticker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub price: Option<Decimal>,
    pub shares_outstanding: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub revenue_ttm: Option<Decimal>,
    pub ps_ratio: Option<Decimal>,
    pub growth_rates: GrowthRates,
    pub projected_revenue: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub upside_pct: Option<Decimal>,
    pub status: RecordStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TickerRecord {
    /// A key-only row; a later refresh fills in the rest.
    pub fn placeholder(ticker: impl Into<String>, growth_rates: GrowthRates) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            currency: None,
            price: None,
            shares_outstanding: None,
            market_cap: None,
            revenue_ttm: None,
            ps_ratio: None,
            growth_rates,
            projected_revenue: None,
            target_price: None,
            upside_pct: None,
            status: RecordStatus::Pending,
            updated_at: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// Copy the descriptive and raw numeric facts of a quote onto the record.
    pub fn apply_quote(&mut self, quote: &Quote) {
        self.name = quote.name.clone();
        self.currency = quote.currency.clone();
        self.price = quote.price;
        self.shares_outstanding = quote.shares_outstanding;
        self.market_cap = quote.market_cap;
    }

    pub fn clear_derived(&mut self) {
        self.ps_ratio = None;
        self.projected_revenue = None;
        self.target_price = None;
        self.upside_pct = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("  aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("AA PL").is_err());
    }

    #[test]
    fn test_growth_rates_bounds() {
        assert!(GrowthRates::new(vec![]).is_err());
        assert!(GrowthRates::new(vec![dec!(1); 4]).is_err());
        assert!(GrowthRates::new(vec![dec!(-101)]).is_err());
        assert!(GrowthRates::new(vec![dec!(-100), dec!(0), dec!(35.5)]).is_ok());
    }

    #[test]
    fn test_growth_rates_parse() {
        let rates: GrowthRates = "20, 15%,10".parse().unwrap();
        assert_eq!(rates.as_slice(), &[dec!(20), dec!(15), dec!(10)]);
        assert_eq!(rates.to_string(), "20,15,10");

        let rates: GrowthRates = "12.5 -3".parse().unwrap();
        assert_eq!(rates.as_slice(), &[dec!(12.5), dec!(-3)]);

        assert!("abc".parse::<GrowthRates>().is_err());
        assert!("".parse::<GrowthRates>().is_err());
    }

    #[test]
    fn test_repeated_growth() {
        let rates = GrowthRates::repeated(dec!(10), 3).unwrap();
        assert_eq!(rates.as_slice(), &[dec!(10), dec!(10), dec!(10)]);
    }

    #[test]
    fn test_status_cells() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Valued,
            RecordStatus::Insufficient("only 3 quarters of revenue".to_string()),
        ] {
            assert_eq!(RecordStatus::from_cell(&status.as_cell()), status);
        }
        assert_eq!(RecordStatus::from_cell(""), RecordStatus::Pending);
    }

    #[test]
    fn test_placeholder_has_only_key() {
        let record = TickerRecord::placeholder("NVDA", GrowthRates::default());
        assert!(record.is_placeholder());
        assert!(record.price.is_none());
        assert!(record.target_price.is_none());
        assert_eq!(record.growth_rates.as_slice(), &[dec!(20)]);
    }

    #[test]
    fn test_growth_rates_deserialize_validates() {
        let rates: GrowthRates = serde_json::from_str(r#"["25", "10"]"#).unwrap();
        assert_eq!(rates.as_slice(), &[dec!(25), dec!(10)]);

        assert!(serde_json::from_str::<GrowthRates>(r#"["1", "2", "3", "4"]"#).is_err());
        assert!(serde_json::from_str::<GrowthRates>("[]").is_err());
    }
}
