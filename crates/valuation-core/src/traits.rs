use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{Quote, TickerRecord, TrackerError};

/// Source of point-in-time financial facts for a symbol.
///
/// A failed call is reported as `TrackerError::ProviderUnavailable`; callers
/// treat it the same as a quote with every field missing.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, TrackerError>;

    /// Quarterly revenue, most recent quarter first. May be empty.
    async fn get_quarterly_revenue(&self, symbol: &str) -> Result<Vec<Decimal>, TrackerError>;
}

/// Durable ordered table of ticker records.
///
/// The store never checks for duplicate keys itself and offers no
/// transactions: `overwrite_all` is a clear followed by a rewrite.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<TickerRecord>, TrackerError>;

    async fn append_one(&self, record: &TickerRecord) -> Result<(), TrackerError>;

    async fn overwrite_all(&self, records: &[TickerRecord]) -> Result<(), TrackerError>;

    /// Removes exactly one row, or returns `TrackerError::NotFound`.
    async fn delete_by_key(&self, ticker: &str) -> Result<(), TrackerError>;
}

#[async_trait]
impl<T: MarketDataProvider + ?Sized> MarketDataProvider for Arc<T> {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, TrackerError> {
        (**self).get_quote(symbol).await
    }

    async fn get_quarterly_revenue(&self, symbol: &str) -> Result<Vec<Decimal>, TrackerError> {
        (**self).get_quarterly_revenue(symbol).await
    }
}

#[async_trait]
impl<T: RowStore + ?Sized> RowStore for Arc<T> {
    async fn load_all(&self) -> Result<Vec<TickerRecord>, TrackerError> {
        (**self).load_all().await
    }

    async fn append_one(&self, record: &TickerRecord) -> Result<(), TrackerError> {
        (**self).append_one(record).await
    }

    async fn overwrite_all(&self, records: &[TickerRecord]) -> Result<(), TrackerError> {
        (**self).overwrite_all(records).await
    }

    async fn delete_by_key(&self, ticker: &str) -> Result<(), TrackerError> {
        (**self).delete_by_key(ticker).await
    }
}
