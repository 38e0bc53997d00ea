use reconciliation::ControllerConfig;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use valuation_core::{GrowthRates, TrackerError};

const DEFAULT_DB_URL: &str = "sqlite:tracker.db?mode=rwc";
const DEFAULT_SHEET: &str = "Blad1";
const DEFAULT_RATE_LIMIT: usize = 500;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub polygon_api_key: Option<String>,
    pub polygon_rate_limit: usize,
    pub db_url: String,
    pub sheet: String,
    pub controller: ControllerConfig,
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, TrackerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TrackerError> {
        let defaults = ControllerConfig::default();

        let default_growth = match lookup("TRACKER_DEFAULT_GROWTH") {
            Some(raw) => raw.parse::<GrowthRates>().map_err(|e| {
                TrackerError::InvalidInput(format!("TRACKER_DEFAULT_GROWTH: {}", e))
            })?,
            None => defaults.default_growth,
        };

        let timeout_secs: u64 = parse_var(&lookup, "TRACKER_PROVIDER_TIMEOUT_SECS", 30)?;
        let controller = ControllerConfig {
            default_growth,
            ps_periods: at_least_one("TRACKER_PS_PERIODS", parse_var(&lookup, "TRACKER_PS_PERIODS", 1)?)?,
            provider_timeout: Duration::from_secs(at_least_one("TRACKER_PROVIDER_TIMEOUT_SECS", timeout_secs)?),
            concurrency: at_least_one("TRACKER_CONCURRENCY", parse_var(&lookup, "TRACKER_CONCURRENCY", 1)?)?,
            placeholder_on_provider_failure: parse_flag(&lookup, "TRACKER_ADD_PLACEHOLDER", true)?,
        };

        Ok(Self {
            polygon_api_key: lookup("POLYGON_API_KEY").filter(|k| !k.trim().is_empty()),
            polygon_rate_limit: at_least_one(
                "POLYGON_RATE_LIMIT",
                parse_var(&lookup, "POLYGON_RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
            )?,
            db_url: lookup("TRACKER_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            sheet: lookup("TRACKER_SHEET").unwrap_or_else(|| DEFAULT_SHEET.to_string()),
            controller,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, TrackerError> {
        self.polygon_api_key
            .as_deref()
            .ok_or_else(|| TrackerError::InvalidInput("POLYGON_API_KEY must be set".to_string()))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, TrackerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TrackerError::InvalidInput(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, TrackerError> {
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(TrackerError::InvalidInput(format!("{}='{}' is not a boolean", key, v))),
        },
    }
}

fn at_least_one<T: PartialOrd + From<u8> + Display>(key: &str, value: T) -> Result<T, TrackerError> {
    if value < T::from(1) {
        return Err(TrackerError::InvalidInput(format!("{} must be at least 1, got {}", key, value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<TrackerConfig, TrackerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        TrackerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.polygon_api_key, None);
        assert_eq!(config.polygon_rate_limit, 500);
        assert_eq!(config.db_url, "sqlite:tracker.db?mode=rwc");
        assert_eq!(config.controller.default_growth.as_slice(), &[dec!(20)]);
        assert_eq!(config.controller.ps_periods, 1);
        assert_eq!(config.controller.provider_timeout, Duration::from_secs(30));
        assert!(config.controller.placeholder_on_provider_failure);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("POLYGON_API_KEY", "abc"),
            ("TRACKER_DEFAULT_GROWTH", "25, 15, 10"),
            ("TRACKER_PS_PERIODS", "4"),
            ("TRACKER_CONCURRENCY", "8"),
            ("TRACKER_ADD_PLACEHOLDER", "no"),
        ])
        .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "abc");
        assert_eq!(config.controller.default_growth.as_slice(), &[dec!(25), dec!(15), dec!(10)]);
        assert_eq!(config.controller.ps_periods, 4);
        assert_eq!(config.controller.concurrency, 8);
        assert!(!config.controller.placeholder_on_provider_failure);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for vars in [
            [("TRACKER_PS_PERIODS", "zero")],
            [("TRACKER_PS_PERIODS", "0")],
            [("TRACKER_CONCURRENCY", "-2")],
            [("TRACKER_DEFAULT_GROWTH", "10,10,10,10")],
            [("TRACKER_ADD_PLACEHOLDER", "maybe")],
            [("POLYGON_RATE_LIMIT", "fast")],
        ] {
            let err = config(&vars).unwrap_err();
            assert!(matches!(err, TrackerError::InvalidInput(_)), "{:?}", vars);
        }
    }
}
