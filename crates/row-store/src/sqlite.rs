use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use std::str::FromStr;
use valuation_core::TrackerError;

use crate::SheetBackend;

/// Rows per multi-row INSERT; three bound parameters each.
const INSERT_BATCH: usize = 500;

/// Sheet persisted in SQLite: one table row per grid row, cells as a JSON array.
#[derive(Clone)]
pub struct SqliteSheet {
    pool: SqlitePool,
    sheet: String,
}

fn store_err(e: impl std::fmt::Display) -> TrackerError {
    TrackerError::StoreUnavailable(e.to_string())
}

impl SqliteSheet {
    /// Open (or create) the database and the named sheet.
    pub async fn connect(database_url: &str, sheet: &str) -> Result<Self, TrackerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(store_err)?
            .create_if_missing(true);

        // Each connection to an in-memory database is a separate database
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await.map_err(store_err)?;

        Self::from_pool(pool, sheet).await
    }

    pub async fn from_pool(pool: SqlitePool, sheet: &str) -> Result<Self, TrackerError> {
        let db = Self {
            pool,
            sheet: sheet.to_string(),
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sheet_rows (
                sheet TEXT NOT NULL,
                position INTEGER NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY (sheet, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet
    }
}

#[async_trait]
impl SheetBackend for SqliteSheet {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, TrackerError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT cells FROM sheet_rows WHERE sheet = ? ORDER BY position",
        )
        .bind(&self.sheet)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|(cells,)| serde_json::from_str::<Vec<String>>(&cells).map_err(store_err))
            .collect()
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), TrackerError> {
        let cells = serde_json::to_string(&row).map_err(store_err)?;
        sqlx::query(
            r#"
            INSERT INTO sheet_rows (sheet, position, cells)
            VALUES (?, (SELECT COALESCE(MAX(position), -1) + 1 FROM sheet_rows WHERE sheet = ?), ?)
            "#,
        )
        .bind(&self.sheet)
        .bind(&self.sheet)
        .bind(&cells)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// One multi-row INSERT per batch, positions continuing after the last row.
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), TrackerError> {
        if rows.is_empty() {
            return Ok(());
        }

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM sheet_rows WHERE sheet = ?",
        )
        .bind(&self.sheet)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        let encoded = rows
            .iter()
            .enumerate()
            .map(|(i, row)| -> Result<(i64, String), TrackerError> {
                Ok((next + i as i64, serde_json::to_string(row).map_err(store_err)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for batch in encoded.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO sheet_rows (sheet, position, cells) ");
            builder.push_values(batch, |mut values, (position, cells)| {
                values
                    .push_bind(self.sheet.clone())
                    .push_bind(*position)
                    .push_bind(cells.clone());
            });
            builder.build().execute(&self.pool).await.map_err(store_err)?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), TrackerError> {
        sqlx::query("DELETE FROM sheet_rows WHERE sheet = ?")
            .bind(&self.sheet)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn delete_row(&self, index: usize) -> Result<(), TrackerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sheet_rows
            WHERE sheet = ? AND position = (
                SELECT position FROM sheet_rows WHERE sheet = ? ORDER BY position LIMIT 1 OFFSET ?
            )
            "#,
        )
        .bind(&self.sheet)
        .bind(&self.sheet)
        .bind(index as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(TrackerError::NotFound(format!("row {}", index)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    async fn setup_test_sheet(name: &str) -> SqliteSheet {
        SqliteSheet::connect("sqlite::memory:", name).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_and_read_in_order() {
        let sheet = setup_test_sheet("Sheet1").await;
        sheet.append_row(row(&["Ticker", "Name"])).await.unwrap();
        sheet.append_rows(vec![row(&["AAPL", "Apple"]), row(&["MSFT", ""])]).await.unwrap();

        let rows = sheet.read_all().await.unwrap();
        assert_eq!(rows, vec![row(&["Ticker", "Name"]), row(&["AAPL", "Apple"]), row(&["MSFT", ""])]);
    }

    #[tokio::test]
    async fn test_append_rows_in_batches() {
        let sheet = setup_test_sheet("Sheet1").await;
        sheet.append_row(row(&["header"])).await.unwrap();

        let cells: Vec<String> = (0..INSERT_BATCH + 3).map(|i| format!("T{}", i)).collect();
        sheet
            .append_rows(cells.iter().map(|c| vec![c.clone()]).collect())
            .await
            .unwrap();
        sheet.append_rows(Vec::new()).await.unwrap();
        sheet.append_row(row(&["last"])).await.unwrap();

        let rows = sheet.read_all().await.unwrap();
        assert_eq!(rows.len(), INSERT_BATCH + 5);
        assert_eq!(rows[0], row(&["header"]));
        assert_eq!(rows[1], row(&["T0"]));
        assert_eq!(rows[INSERT_BATCH + 3], vec![format!("T{}", INSERT_BATCH + 2)]);
        assert_eq!(rows[INSERT_BATCH + 4], row(&["last"]));

        let positions: Vec<(i64,)> = sqlx::query_as("SELECT position FROM sheet_rows WHERE sheet = ? ORDER BY position")
            .bind("Sheet1")
            .fetch_all(sheet.pool())
            .await
            .unwrap();
        let expected: Vec<(i64,)> = (0..(INSERT_BATCH + 5) as i64).map(|p| (p,)).collect();
        assert_eq!(positions, expected);
    }

    #[tokio::test]
    async fn test_delete_row_keeps_order() {
        let sheet = setup_test_sheet("Sheet1").await;
        sheet
            .append_rows(vec![row(&["h"]), row(&["a"]), row(&["b"]), row(&["c"])])
            .await
            .unwrap();

        sheet.delete_row(2).await.unwrap();
        sheet.append_row(row(&["d"])).await.unwrap();

        let rows = sheet.read_all().await.unwrap();
        assert_eq!(rows, vec![row(&["h"]), row(&["a"]), row(&["c"]), row(&["d"])]);
        assert!(matches!(sheet.delete_row(10).await, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sheets_are_isolated() {
        let first = setup_test_sheet("Blad1").await;
        let second = SqliteSheet::from_pool(first.pool().clone(), "Blad2").await.unwrap();

        first.append_row(row(&["AAPL"])).await.unwrap();
        second.append_row(row(&["EVO"])).await.unwrap();
        second.clear().await.unwrap();

        assert_eq!(first.read_all().await.unwrap(), vec![row(&["AAPL"])]);
        assert!(second.read_all().await.unwrap().is_empty());
    }
}
