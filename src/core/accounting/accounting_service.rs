// Expense tracking on top of a spreadsheet.
//
// The spreadsheet is the only copy of the data. Every query reads the whole
// range, and every update or delete is a read-then-write:
//
//   1. list all rows in the range
//   2. find the first row whose (date, category) matches the key
//   3. overwrite the range (update) or delete that one row (delete)
//
// Known hazard: steps 1 and 3 are separate remote calls and the spreadsheet
// offers no isolation between them. Two concurrent mutations on overlapping
// keys can race (lost update, or a delete hitting a row that shifted). All
// read-modify-write goes through `mutate_first_match`, which is the place to
// add a conditional write once the store supports one.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use super::expense_filter::{filter_expenses, ExpenseFilter};
use super::expense_models::{ExpenseChanges, ExpenseKey, ExpenseRecord, SheetRange, SheetRow};
use crate::core::errors::{AssistantError, RemoteServiceError};
use crate::core::results::MutationAck;

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// The spreadsheet operations the accounting handler needs.
#[async_trait]
pub trait ExpenseSheet: Send + Sync {
    /// All rows in the range, in sheet order.
    async fn list_rows(&self, range: &SheetRange) -> Result<Vec<SheetRow>, RemoteServiceError>;

    /// Appends one row after the table. Returns the number of cells written.
    async fn append_row(&self, range: &SheetRange, row: SheetRow) -> Result<u64, RemoteServiceError>;

    /// Writes `rows` over the range, starting at its first row.
    async fn overwrite_rows(
        &self,
        range: &SheetRange,
        rows: Vec<SheetRow>,
    ) -> Result<(), RemoteServiceError>;

    /// Deletes a single row by its 0-based index in the whole sheet.
    async fn delete_row(&self, range: &SheetRange, sheet_row_index: u32) -> Result<(), RemoteServiceError>;
}

#[async_trait]
impl<T: ExpenseSheet + ?Sized> ExpenseSheet for Arc<T> {
    async fn list_rows(&self, range: &SheetRange) -> Result<Vec<SheetRow>, RemoteServiceError> {
        (**self).list_rows(range).await
    }

    async fn append_row(&self, range: &SheetRange, row: SheetRow) -> Result<u64, RemoteServiceError> {
        (**self).append_row(range, row).await
    }

    async fn overwrite_rows(
        &self,
        range: &SheetRange,
        rows: Vec<SheetRow>,
    ) -> Result<(), RemoteServiceError> {
        (**self).overwrite_rows(range, rows).await
    }

    async fn delete_row(&self, range: &SheetRange, sheet_row_index: u32) -> Result<(), RemoteServiceError> {
        (**self).delete_row(range, sheet_row_index).await
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseAdded {
    pub response: String,
    pub updated_cells: u64,
    pub entry: ExpenseRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseList {
    pub count: usize,
    pub entries: Vec<ExpenseRecord>,
}

/// What to do with the first row matching a key.
enum Mutation {
    Update(ExpenseChanges),
    Delete,
}

impl Mutation {
    fn label(&self) -> &'static str {
        match self {
            Mutation::Update(_) => "update",
            Mutation::Delete => "deletion",
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AccountingService<S: ExpenseSheet> {
    sheet: S,
    range: SheetRange,
}

impl<S: ExpenseSheet> AccountingService<S> {
    pub fn new(sheet: S, range: SheetRange) -> Self {
        Self { sheet, range }
    }

    pub async fn add(&self, record: ExpenseRecord) -> Result<ExpenseAdded, AssistantError> {
        let updated_cells = self.sheet.append_row(&self.range, record.to_row()).await?;

        tracing::info!(
            date = %record.date,
            category = %record.category,
            amount = ?record.amount,
            "Expense added"
        );

        Ok(ExpenseAdded {
            response: format!(
                "Expense added: {} {} {}",
                record.date,
                record.category,
                record.amount.map(|a| a.to_string()).unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            updated_cells,
            entry: record,
        })
    }

    pub async fn query(&self, filter: &ExpenseFilter) -> Result<ExpenseList, AssistantError> {
        let rows = self.sheet.list_rows(&self.range).await?;
        let entries = filter_expenses(&rows, filter);

        Ok(ExpenseList {
            count: entries.len(),
            entries,
        })
    }

    pub async fn update(
        &self,
        key: &ExpenseKey,
        changes: ExpenseChanges,
    ) -> Result<MutationAck, AssistantError> {
        self.mutate_first_match(key, Mutation::Update(changes)).await?;
        Ok(MutationAck::success("Entry updated successfully"))
    }

    pub async fn delete(&self, key: &ExpenseKey) -> Result<MutationAck, AssistantError> {
        self.mutate_first_match(key, Mutation::Delete).await?;
        Ok(MutationAck::success("Entry deleted successfully"))
    }

    /// Read-modify-write on the first row matching `key`. Nothing is written
    /// when no row matches.
    async fn mutate_first_match(
        &self,
        key: &ExpenseKey,
        mutation: Mutation,
    ) -> Result<ExpenseRecord, AssistantError> {
        let mut rows = self.sheet.list_rows(&self.range).await?;

        let (position, current) = rows
            .iter()
            .enumerate()
            .find_map(|(position, row)| {
                ExpenseRecord::from_row(row)
                    .filter(|record| key.matches(record))
                    .map(|record| (position, record))
            })
            .ok_or(AssistantError::EntryNotFound(mutation.label()))?;

        match mutation {
            Mutation::Update(changes) => {
                let updated = changes.apply(&current);
                rows[position] = updated.to_row();
                // The values API has no single-row patch, so the whole range
                // goes back. Only the matched row differs from what was read.
                self.sheet.overwrite_rows(&self.range, rows).await?;
                tracing::info!(%key, position, "Expense updated");
            }
            Mutation::Delete => {
                let sheet_row_index = self.range.sheet_row_index(position);
                self.sheet.delete_row(&self.range, sheet_row_index).await?;
                tracing::info!(%key, position, sheet_row_index, "Expense deleted");
            }
        }

        Ok(current)
    }
}
