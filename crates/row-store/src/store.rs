use async_trait::async_trait;
use valuation_core::{GrowthRates, RowStore, TickerRecord, TrackerError};

use crate::schema::{decode_row, encode_row, header, header_matches};
use crate::SheetBackend;

/// `RowStore` over any `SheetBackend`, enforcing the fixed column schema.
pub struct SheetRowStore<B> {
    backend: B,
    default_growth: GrowthRates,
}

impl<B: SheetBackend> SheetRowStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_growth: GrowthRates::default(),
        }
    }

    /// Growth rates given to rows that were stored without any.
    pub fn with_default_growth(mut self, default_growth: GrowthRates) -> Self {
        self.default_growth = default_growth;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn reset_with_header(&self) -> Result<(), TrackerError> {
        self.backend.clear().await?;
        self.backend.append_row(header()).await
    }

    async fn read_sheet(&self) -> Result<SheetState, TrackerError> {
        let mut rows = self.backend.read_all().await?;
        if rows.is_empty() {
            return Ok(SheetState::Empty);
        }

        let header = rows.remove(0);
        if header_matches(&header) {
            Ok(SheetState::Ready(rows))
        } else {
            Ok(SheetState::Mismatched {
                header,
                rows: rows.len(),
            })
        }
    }

    /// Data rows for a read. An unrecognised header reads as an empty table
    /// and is left in place; only an empty sheet gets its header written.
    async fn read_data(&self) -> Result<Vec<Vec<String>>, TrackerError> {
        match self.read_sheet().await? {
            SheetState::Ready(rows) => Ok(rows),
            SheetState::Empty => {
                tracing::info!("Sheet is empty, writing header");
                self.backend.append_row(header()).await?;
                Ok(Vec::new())
            }
            SheetState::Mismatched { header, rows } => {
                tracing::warn!(
                    "Sheet header {:?} does not match the schema, reading {} rows as empty",
                    header,
                    rows
                );
                Ok(Vec::new())
            }
        }
    }

    /// Make the sheet ready for an append. An unrecognised sheet is reinitialized.
    async fn prepare_append(&self) -> Result<(), TrackerError> {
        match self.read_sheet().await? {
            SheetState::Ready(_) => Ok(()),
            SheetState::Empty => self.backend.append_row(header()).await,
            SheetState::Mismatched { header, rows } => {
                tracing::warn!(
                    "Sheet header {:?} does not match the schema, reinitializing ({} rows dropped)",
                    header,
                    rows
                );
                self.reset_with_header().await
            }
        }
    }
}

enum SheetState {
    Empty,
    /// Data rows under a matching header
    Ready(Vec<Vec<String>>),
    Mismatched { header: Vec<String>, rows: usize },
}

#[async_trait]
impl<B: SheetBackend> RowStore for SheetRowStore<B> {
    async fn load_all(&self) -> Result<Vec<TickerRecord>, TrackerError> {
        let rows = self.read_data().await?;
        Ok(rows
            .iter()
            .filter_map(|row| decode_row(row, &self.default_growth))
            .collect())
    }

    async fn append_one(&self, record: &TickerRecord) -> Result<(), TrackerError> {
        self.prepare_append().await?;
        self.backend.append_row(encode_row(record)).await
    }

    async fn overwrite_all(&self, records: &[TickerRecord]) -> Result<(), TrackerError> {
        let mut rows = Vec::with_capacity(records.len() + 1);
        rows.push(header());
        rows.extend(records.iter().map(encode_row));

        self.backend.clear().await?;
        self.backend.append_rows(rows).await
    }

    async fn delete_by_key(&self, ticker: &str) -> Result<(), TrackerError> {
        let rows = self.read_data().await?;
        let key = ticker.trim().to_uppercase();

        let position = rows.iter().position(|row| {
            row.first()
                .map(|cell| cell.trim().eq_ignore_ascii_case(&key))
                .unwrap_or(false)
        });

        match position {
            // +1 skips the header row
            Some(idx) => self.backend.delete_row(idx + 1).await,
            None => Err(TrackerError::NotFound(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySheet, SqliteSheet, COLUMNS};
    use rust_decimal_macros::dec;
    use valuation_core::RecordStatus;

    fn record(ticker: &str) -> TickerRecord {
        TickerRecord::placeholder(ticker, GrowthRates::default())
    }

    fn raw(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_sheet_gets_header() {
        let sheet = MemorySheet::new();
        let store = SheetRowStore::new(sheet.clone());

        assert!(store.load_all().await.unwrap().is_empty());
        assert_eq!(sheet.snapshot().await, vec![header()]);
    }

    #[tokio::test]
    async fn test_mismatched_header_reads_empty_without_writing() {
        let mut extended = header();
        extended.push("Notes".to_string());
        let original = vec![extended, raw(&["AAPL"]), raw(&["MSFT"])];
        let sheet = MemorySheet::from_rows(original.clone());
        let store = SheetRowStore::new(sheet.clone());

        assert!(store.load_all().await.unwrap().is_empty());
        assert!(matches!(store.delete_by_key("AAPL").await, Err(TrackerError::NotFound(_))));
        assert_eq!(sheet.snapshot().await, original);
    }

    #[tokio::test]
    async fn test_append_reinitializes_mismatched_header() {
        let sheet = MemorySheet::from_rows(vec![raw(&["Ticker"]), raw(&["AAPL"]), raw(&["MSFT"])]);
        let store = SheetRowStore::new(sheet.clone());

        store.append_one(&record("EVO")).await.unwrap();
        let rows = sheet.snapshot().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], header());
        assert_eq!(rows[1][0], "EVO");
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SheetRowStore::new(MemorySheet::new());
        for ticker in ["MSFT", "AAPL", "EVO"] {
            store.append_one(&record(ticker)).await.unwrap();
        }

        let tickers: Vec<String> = store.load_all().await.unwrap().into_iter().map(|r| r.ticker).collect();
        assert_eq!(tickers, vec!["MSFT", "AAPL", "EVO"]);
    }

    #[tokio::test]
    async fn test_append_does_not_check_duplicates() {
        let store = SheetRowStore::new(MemorySheet::new());
        store.append_one(&record("AAPL")).await.unwrap();
        store.append_one(&record("AAPL")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_all_replaces_rows() {
        let sheet = MemorySheet::new();
        let store = SheetRowStore::new(sheet.clone());
        store.append_one(&record("OLD")).await.unwrap();

        let mut refreshed = record("NEW");
        refreshed.price = Some(dec!(12.5));
        refreshed.status = RecordStatus::Valued;
        store.overwrite_all(&[refreshed.clone(), record("TWO")]).await.unwrap();

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], refreshed);
        assert_eq!(sheet.snapshot().await[0].len(), COLUMNS.len());
    }

    #[tokio::test]
    async fn test_delete_by_key() {
        let store = SheetRowStore::new(MemorySheet::new());
        for ticker in ["AAPL", "MSFT", "EVO"] {
            store.append_one(&record(ticker)).await.unwrap();
        }

        store.delete_by_key("msft").await.unwrap();
        let tickers: Vec<String> = store.load_all().await.unwrap().into_iter().map(|r| r.ticker).collect();
        assert_eq!(tickers, vec!["AAPL", "EVO"]);

        let err = store.delete_by_key("MSFT").await.unwrap_err();
        assert_eq!(err, TrackerError::NotFound("MSFT".to_string()));
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_rows_are_skipped() {
        let sheet = MemorySheet::from_rows(vec![header(), raw(&["AAPL"]), raw(&[""]), raw(&[]), raw(&["tsla"])]);
        let store = SheetRowStore::new(sheet).with_default_growth(GrowthRates::new(vec![dec!(5)]).unwrap());

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].ticker, "TSLA");
        assert_eq!(records[1].growth_rates.as_slice(), &[dec!(5)]);
    }

    #[tokio::test]
    async fn test_sqlite_backed_store() {
        let sheet = SqliteSheet::connect("sqlite::memory:", "Blad1").await.unwrap();
        let store = SheetRowStore::new(sheet);

        store.append_one(&record("AAPL")).await.unwrap();
        store.append_one(&record("EVO")).await.unwrap();
        store.delete_by_key("AAPL").await.unwrap();

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ticker, "EVO");
    }
}
