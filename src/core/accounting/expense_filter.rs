use super::expense_models::{ExpenseRecord, SheetRow};

/// Optional criteria for an expense query. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    /// Inclusive `[lo, hi]`, compared as strings (ISO dates sort correctly).
    pub date_range: Option<(String, String)>,
    /// Exact match after trimming.
    pub category: Option<String>,
}

impl ExpenseFilter {
    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        if let Some((lo, hi)) = &self.date_range {
            let date = record.date.trim();
            if date < lo.trim() || date > hi.trim() {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if record.category.trim() != category.trim() {
                return false;
            }
        }

        true
    }
}

/// Decodes and filters rows in store order. Rows that do not decode are
/// dropped silently.
pub fn filter_expenses(rows: &[SheetRow], filter: &ExpenseFilter) -> Vec<ExpenseRecord> {
    let mut skipped = 0usize;
    let matches: Vec<ExpenseRecord> = rows
        .iter()
        .filter_map(|row| {
            let record = ExpenseRecord::from_row(row);
            if record.is_none() {
                skipped += 1;
            }
            record
        })
        .filter(|record| filter.matches(record))
        .collect();

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped malformed expense rows");
    }

    matches
}
