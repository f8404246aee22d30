// In-memory stand-in for the expense spreadsheet.
//
// Rows are kept in sheet coordinates (index 0 is sheet row 1) so range
// offsets and row-deletion indices behave like the real API. Used by the
// `memory` backend and by the accounting tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::core::accounting::{ExpenseSheet, SheetRange, SheetRow};
use crate::core::errors::{RemoteOrigin, RemoteServiceError};

#[derive(Default)]
pub struct InMemorySheet {
    rows: RwLock<Vec<SheetRow>>,
    deleted: RwLock<Vec<u32>>,
    writes: AtomicUsize,
}

impl InMemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<SheetRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }

    /// Snapshot of the whole sheet.
    pub async fn rows(&self) -> Vec<SheetRow> {
        self.rows.read().await.clone()
    }

    /// Number of append, overwrite and delete calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Sheet row indices passed to `delete_row`, in call order.
    pub async fn deleted_indices(&self) -> Vec<u32> {
        self.deleted.read().await.clone()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn first_index(range: &SheetRange) -> usize {
    range.first_row.saturating_sub(1) as usize
}

#[async_trait]
impl ExpenseSheet for InMemorySheet {
    async fn list_rows(&self, range: &SheetRange) -> Result<Vec<SheetRow>, RemoteServiceError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().skip(first_index(range)).cloned().collect())
    }

    async fn append_row(&self, range: &SheetRange, row: SheetRow) -> Result<u64, RemoteServiceError> {
        self.record_write();
        let mut rows = self.rows.write().await;

        // Pad up to the range start so the row lands inside the table.
        while rows.len() < first_index(range) {
            rows.push(Vec::new());
        }

        let cells = row.len() as u64;
        rows.push(row);
        Ok(cells)
    }

    async fn overwrite_rows(&self, range: &SheetRange, new_rows: Vec<SheetRow>) -> Result<(), RemoteServiceError> {
        self.record_write();
        let mut rows = self.rows.write().await;

        let start = first_index(range);
        for (offset, row) in new_rows.into_iter().enumerate() {
            let index = start + offset;
            if index < rows.len() {
                rows[index] = row;
            } else {
                rows.push(row);
            }
        }
        Ok(())
    }

    async fn delete_row(&self, _range: &SheetRange, sheet_row_index: u32) -> Result<(), RemoteServiceError> {
        self.record_write();
        let mut rows = self.rows.write().await;

        let index = sheet_row_index as usize;
        if index >= rows.len() {
            return Err(RemoteServiceError::new(
                RemoteOrigin::Spreadsheet,
                Some(400),
                format!("row index {} is outside the sheet", sheet_row_index),
            ));
        }

        rows.remove(index);
        self.deleted.write().await.push(sheet_row_index);
        Ok(())
    }
}
