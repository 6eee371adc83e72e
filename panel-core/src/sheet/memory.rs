//! In-memory implementation of `SheetClient`.
//!
//! All cells are held in memory and lost on restart. Used by tests and for
//! throwaway demo deployments.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{clip_to_range, write_cells, CellRange, CellValue, SheetClient, SheetError};

/// In-memory row store.
pub struct InMemorySheet {
    rows: RwLock<Vec<Vec<CellValue>>>,
    /// Number of upcoming reads that fail with `SheetError::Unavailable`.
    unavailable_reads: AtomicU32,
    reads: AtomicU32,
}

impl InMemorySheet {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            rows: RwLock::new(rows),
            unavailable_reads: AtomicU32::new(0),
            reads: AtomicU32::new(0),
        }
    }

    /// Make the next `count` reads fail as if the service were unavailable.
    pub fn fail_next_reads(&self, count: u32) {
        self.unavailable_reads.store(count, Ordering::SeqCst);
    }

    /// Number of `get_all_values` calls seen so far, failed ones included.
    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> Vec<Vec<CellValue>> {
        self.rows.read().await.clone()
    }
}

impl Default for InMemorySheet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetClient for InMemorySheet {
    async fn get_all_values(&self) -> Result<Vec<Vec<CellValue>>, SheetError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .unavailable_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SheetError::unavailable("get_all_values", "503 Service Unavailable"));
        }
        Ok(self.rows.read().await.clone())
    }

    async fn insert_row(&self, values: Vec<CellValue>, index: usize) -> Result<(), SheetError> {
        if index == 0 {
            return Err(SheetError::InvalidRange(format!("row {}", index)));
        }
        let mut rows = self.rows.write().await;
        let at = (index - 1).min(rows.len());
        rows.insert(at, values);
        Ok(())
    }

    async fn update(&self, range: CellRange, rows: Vec<Vec<CellValue>>) -> Result<(), SheetError> {
        let mut stored = self.rows.write().await;
        for (offset, values) in clip_to_range(&range, rows).into_iter().enumerate() {
            let row_index = range.start.row - 1 + offset;
            if stored.len() <= row_index {
                stored.resize(row_index + 1, Vec::new());
            }
            write_cells(&mut stored[row_index], range.start.column, &values);
        }
        Ok(())
    }

    async fn append_row(&self, values: Vec<CellValue>) -> Result<(), SheetError> {
        self.rows.write().await.push(values);
        Ok(())
    }
}
