use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use valuation_core::{
    normalize_symbol, GrowthRates, MarketDataProvider, Quote, RowStore, TickerRecord, TrackerError,
};
use valuation_engine::{RevenueAggregator, ValuationCalculator, ValuationInputs, ValuationResult};

use crate::models::{AddOutcome, RefreshSummary, TickerFailure};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Growth rates for tickers added without explicit ones
    pub default_growth: GrowthRates,
    /// Trailing TTM periods averaged into the P/S multiple (1 = current only)
    pub ps_periods: usize,
    /// Upper bound on each provider call
    pub provider_timeout: Duration,
    /// Tickers fetched concurrently during a refresh
    pub concurrency: usize,
    /// When false, an add whose fetch fails is rejected instead of stored as a placeholder
    pub placeholder_on_provider_failure: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_growth: GrowthRates::default(),
            ps_periods: 1,
            provider_timeout: Duration::from_secs(30),
            concurrency: 1,
            placeholder_on_provider_failure: true,
        }
    }
}

/// Provider data for one ticker.
struct Fetched {
    quote: Quote,
    quarterly_revenue: Vec<Decimal>,
}

pub struct ReconciliationController<P, S> {
    provider: P,
    store: S,
    config: ControllerConfig,
    aggregator: RevenueAggregator,
    calculator: ValuationCalculator,
}

impl<P: MarketDataProvider, S: RowStore> ReconciliationController<P, S> {
    pub fn new(provider: P, store: S) -> Self {
        Self::with_config(provider, store, ControllerConfig::default())
    }

    pub fn with_config(provider: P, store: S, config: ControllerConfig) -> Self {
        Self {
            provider,
            store,
            config,
            aggregator: RevenueAggregator::new(),
            calculator: ValuationCalculator::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn list(&self) -> Result<Vec<TickerRecord>, TrackerError> {
        self.store.load_all().await
    }

    /// Start tracking `symbol`. Never touches existing rows.
    pub async fn add_ticker(
        &self,
        symbol: &str,
        growth: Option<GrowthRates>,
    ) -> Result<AddOutcome, TrackerError> {
        let ticker = normalize_symbol(symbol)?;
        let growth = growth.unwrap_or_else(|| self.config.default_growth.clone());

        let existing = self.store.load_all().await?;
        if existing.iter().any(|r| r.ticker == ticker) {
            return Err(TrackerError::DuplicateKey(ticker));
        }

        let placeholder = TickerRecord::placeholder(ticker.clone(), growth);
        let outcome = match self.fetch(&ticker).await {
            Ok(fetched) => match self.evaluate(&placeholder, fetched) {
                Ok((record, ValuationResult::Complete(_))) => AddOutcome::Valued(record),
                Ok((record, ValuationResult::Insufficient(e))) => AddOutcome::Unvalued {
                    record,
                    reason: e.to_string(),
                },
                Err(e) => {
                    tracing::info!("{}: incomplete provider data ({}), adding placeholder", ticker, e);
                    AddOutcome::Placeholder {
                        record: placeholder,
                        reason: e.to_string(),
                    }
                }
            },
            Err(e) if self.config.placeholder_on_provider_failure => {
                tracing::warn!("{}: {}, adding placeholder", ticker, e);
                AddOutcome::Placeholder {
                    record: placeholder,
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        self.store.append_one(outcome.record()).await?;
        tracing::info!("Added {}", ticker);
        Ok(outcome)
    }

    /// Re-fetch and re-value every stored ticker, then rewrite the table once.
    ///
    /// A ticker whose fetch fails or returns incomplete data keeps its stored
    /// row and is listed as a failure. Complete data that cannot be valued
    /// replaces the row with empty derived fields. A store failure aborts
    /// before anything is written.
    pub async fn refresh_all(&self) -> Result<RefreshSummary, TrackerError> {
        let records = self.store.load_all().await?;
        let total = records.len();
        tracing::info!("Refreshing {} tickers (concurrency {})", total, self.config.concurrency);

        let outcomes: Vec<(TickerRecord, Result<(TickerRecord, ValuationResult), TrackerError>)> = stream::iter(records)
            .map(|record| async move {
                let outcome = self.refresh_one(&record).await;
                (record, outcome)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = RefreshSummary {
            total,
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(total);

        for (previous, outcome) in outcomes {
            match outcome {
                Ok((updated, ValuationResult::Complete(_))) => {
                    summary.refreshed.push(updated.ticker.clone());
                    rows.push(updated);
                }
                Ok((updated, ValuationResult::Insufficient(e))) => {
                    tracing::info!("{}: refreshed without a valuation ({})", updated.ticker, e);
                    summary.unvalued.push(updated.ticker.clone());
                    rows.push(updated);
                }
                Err(e) => {
                    tracing::warn!("{}: keeping stored values ({})", previous.ticker, e);
                    summary.failures.push(TickerFailure {
                        ticker: previous.ticker.clone(),
                        error: e,
                    });
                    rows.push(previous);
                }
            }
        }

        if !summary.refreshed.is_empty() || !summary.unvalued.is_empty() {
            self.store.overwrite_all(&rows).await?;
            summary.rewritten = true;
        }

        tracing::info!(
            "Refresh done: {} valued, {} without valuation, {} failed",
            summary.refreshed.len(),
            summary.unvalued.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    pub async fn delete_ticker(&self, symbol: &str) -> Result<(), TrackerError> {
        let ticker = normalize_symbol(symbol)?;
        self.store.delete_by_key(&ticker).await?;
        tracing::info!("Deleted {}", ticker);
        Ok(())
    }

    /// Replace one row's growth rates and re-derive its projection from the
    /// stored multiple. No provider call.
    pub async fn set_growth(&self, symbol: &str, growth: GrowthRates) -> Result<TickerRecord, TrackerError> {
        let ticker = normalize_symbol(symbol)?;
        let mut records = self.store.load_all().await?;

        let record = records
            .iter_mut()
            .find(|r| r.ticker == ticker)
            .ok_or_else(|| TrackerError::NotFound(ticker.clone()))?;
        record.growth_rates = growth;

        // Placeholders have nothing to re-derive yet
        if let Some(ps) = record.ps_ratio {
            let result = self.calculator.project_with_multiple(
                ps,
                record.revenue_ttm,
                record.shares_outstanding,
                record.price,
                &record.growth_rates,
            );
            result.apply_to(record);
        }
        let updated = record.clone();

        self.store.overwrite_all(&records).await?;
        tracing::info!("{}: growth set to {}", ticker, updated.growth_rates);
        Ok(updated)
    }

    /// Fresh facts with recomputed derived fields. A valuation that stops
    /// early still yields a row, with empty derived fields.
    async fn refresh_one(&self, record: &TickerRecord) -> Result<(TickerRecord, ValuationResult), TrackerError> {
        let fetched = self.fetch(&record.ticker).await?;
        self.evaluate(record, fetched)
    }

    async fn fetch(&self, ticker: &str) -> Result<Fetched, TrackerError> {
        let limit = self.config.provider_timeout;
        let (quote, quarterly_revenue) = tokio::join!(
            with_timeout(limit, self.provider.get_quote(ticker)),
            with_timeout(limit, self.provider.get_quarterly_revenue(ticker)),
        );
        Ok(Fetched {
            quote: quote?,
            quarterly_revenue: quarterly_revenue?,
        })
    }

    /// Merge fresh provider data into a copy of `base` and value it with the
    /// copy's growth rates. `Err` means the provider data itself is incomplete.
    fn evaluate(
        &self,
        base: &TickerRecord,
        fetched: Fetched,
    ) -> Result<(TickerRecord, ValuationResult), TrackerError> {
        let Fetched {
            quote,
            quarterly_revenue,
        } = fetched;

        let mut missing = Vec::new();
        if quote.price.is_none() {
            missing.push("price");
        }
        if quote.shares_outstanding.is_none() {
            missing.push("shares outstanding");
        }
        if !missing.is_empty() {
            return Err(TrackerError::InsufficientData(format!("missing {}", missing.join(", "))));
        }

        let revenue_ttm = self.aggregator.ttm(&quarterly_revenue, 0)?;
        let trailing_ttm = if self.config.ps_periods > 1 {
            self.aggregator
                .rolling_ttm(&quarterly_revenue, self.config.ps_periods)?
        } else {
            Vec::new()
        };

        let mut record = base.clone();
        record.apply_quote(&quote);
        record.revenue_ttm = Some(revenue_ttm);

        let inputs = ValuationInputs {
            trailing_ttm,
            ..ValuationInputs::from_record(&record)
        };
        let result = self.calculator.project(&inputs, &record.growth_rates);
        result.apply_to(&mut record);
        record.updated_at = Some(Utc::now());

        tracing::debug!("{}: {:?}", record.ticker, record.status);
        Ok((record, result))
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, TrackerError>>,
) -> Result<T, TrackerError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| TrackerError::ProviderUnavailable(format!("no response within {:?}", limit)))?
}
