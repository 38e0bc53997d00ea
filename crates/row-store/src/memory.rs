use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use valuation_core::TrackerError;

use crate::SheetBackend;

/// Grid held in process memory. Clones share the same grid.
#[derive(Clone, Default)]
pub struct MemorySheet {
    rows: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub async fn snapshot(&self) -> Vec<Vec<String>> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl SheetBackend for MemorySheet {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, TrackerError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), TrackerError> {
        self.rows.lock().await.push(row);
        Ok(())
    }

    async fn clear(&self) -> Result<(), TrackerError> {
        self.rows.lock().await.clear();
        Ok(())
    }

    async fn delete_row(&self, index: usize) -> Result<(), TrackerError> {
        let mut rows = self.rows.lock().await;
        if index >= rows.len() {
            return Err(TrackerError::NotFound(format!("row {}", index)));
        }
        rows.remove(index);
        Ok(())
    }
}
