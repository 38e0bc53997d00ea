use async_trait::async_trait;
use valuation_core::TrackerError;

/// Row-oriented transport for a remote table of string cells.
///
/// Row 0 is whatever the first stored row is (normally the header). There are
/// no transactions; each call stands alone.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, TrackerError>;

    async fn append_row(&self, row: Vec<String>) -> Result<(), TrackerError>;

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), TrackerError> {
        for row in rows {
            self.append_row(row).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), TrackerError>;

    /// Delete the row at `index` (0-based, header included).
    async fn delete_row(&self, index: usize) -> Result<(), TrackerError>;
}
