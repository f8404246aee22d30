// Expense records and how they map onto spreadsheet rows.
//
// The expense table is a plain rectangle with four columns:
//
//   | date       | category  | amount | note |
//   | 2024-01-20 | breakfast | 50     |      |
//
// The spreadsheet hands rows back as loosely typed cells (strings or numbers,
// trailing empty cells dropped), so decoding is forgiving: a row that lacks a
// date or a category is skipped rather than treated as an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One spreadsheet row as the store returns it.
pub type SheetRow = Vec<Value>;

/// Rows with fewer cells than this (date, category) are never decoded.
pub const MIN_ROW_CELLS: usize = 2;

pub const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub date: String,
    pub category: String,
    pub amount: Option<i64>,
    pub note: String,
}

impl ExpenseRecord {
    /// Encodes the record in column order. A missing amount becomes an empty cell.
    pub fn to_row(&self) -> SheetRow {
        vec![
            Value::String(self.date.clone()),
            Value::String(self.category.clone()),
            self.amount
                .map(Value::from)
                .unwrap_or_else(|| Value::String(String::new())),
            Value::String(self.note.clone()),
        ]
    }

    /// Decodes a row, or `None` when the row is too short or has a blank
    /// date or category.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        if row.len() < MIN_ROW_CELLS {
            return None;
        }

        let date = cell_text(&row[0]);
        let category = cell_text(&row[1]);
        if date.trim().is_empty() || category.trim().is_empty() {
            return None;
        }

        Some(Self {
            date,
            category,
            amount: row.get(2).and_then(cell_amount),
            note: row.get(3).map(cell_text).unwrap_or_default(),
        })
    }
}

/// The `(date, category)` pair that identifies a row for update and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseKey {
    pub date: String,
    pub category: String,
}

impl ExpenseKey {
    pub fn new(date: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            category: category.into(),
        }
    }

    /// Whitespace around either side is ignored.
    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        record.date.trim() == self.date.trim() && record.category.trim() == self.category.trim()
    }
}

impl fmt::Display for ExpenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.date.trim(), self.category.trim())
    }
}

/// New values for a matched row. `note: None` keeps the stored note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseChanges {
    pub amount: i64,
    pub note: Option<String>,
}

impl ExpenseChanges {
    pub fn apply(&self, record: &ExpenseRecord) -> ExpenseRecord {
        ExpenseRecord {
            date: record.date.clone(),
            category: record.category.clone(),
            amount: Some(self.amount),
            note: self.note.clone().unwrap_or_else(|| record.note.clone()),
        }
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_amount(cell: &Value) -> Option<i64> {
    match cell {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<i64>().ok()
        }
        _ => None,
    }
}

// =============================================================================
// SHEET RANGE
// =============================================================================

/// The A1 range holding the expense table, e.g. `Sheet1!A2:D`.
///
/// Row positions returned by a list read are relative to `first_row`; the
/// store's row-deletion call wants a 0-based index into the whole sheet, which
/// `sheet_row_index` computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    /// Sheet (tab) title. `None` means the spreadsheet's first sheet.
    pub sheet: Option<String>,
    pub start_column: String,
    /// 1-based row number the range starts at.
    pub first_row: u32,
    pub end_column: String,
}

impl SheetRange {
    /// Renders the range in A1 notation, quoting the sheet title when needed.
    pub fn a1(&self) -> String {
        let cells = format!("{}{}:{}", self.start_column, self.first_row, self.end_column);
        match &self.sheet {
            Some(sheet) if needs_quotes(sheet) => {
                format!("'{}'!{}", sheet.replace('\'', "''"), cells)
            }
            Some(sheet) => format!("{}!{}", sheet, cells),
            None => cells,
        }
    }

    /// Translates a 0-based position within this range into the 0-based row
    /// index of the whole sheet.
    ///
    /// Position 0 of `A1:D` is sheet row 1, index 0; position 0 of `A2:D`
    /// (a table under a header row) is sheet row 2, index 1.
    pub fn sheet_row_index(&self, position: usize) -> u32 {
        (self.first_row - 1) + position as u32
    }
}

impl Default for SheetRange {
    fn default() -> Self {
        Self {
            sheet: Some("Sheet1".to_string()),
            start_column: "A".to_string(),
            first_row: 1,
            end_column: "D".to_string(),
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.a1())
    }
}

impl FromStr for SheetRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (sheet, cells) = match value.rsplit_once('!') {
            Some((sheet, cells)) => (Some(unquote_sheet(sheet)), cells),
            None => (None, value),
        };

        let (start, end) = cells
            .split_once(':')
            .ok_or_else(|| format!("range '{}' must look like A1:D", value))?;

        let (start_column, first_row) = split_cell(start)
            .ok_or_else(|| format!("invalid start cell '{}' in range '{}'", start, value))?;
        let (end_column, _) = split_cell(end)
            .ok_or_else(|| format!("invalid end cell '{}' in range '{}'", end, value))?;

        Ok(Self {
            sheet: sheet.filter(|s| !s.is_empty()),
            start_column,
            first_row: first_row.unwrap_or(1),
            end_column,
        })
    }
}

/// Splits `B12` into `("B", Some(12))` and `D` into `("D", None)`.
fn split_cell(cell: &str) -> Option<(String, Option<u32>)> {
    let cell = cell.trim();
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<u32>() {
            Ok(row) if row >= 1 => Some(row),
            _ => return None,
        }
    };

    Some((letters.to_ascii_uppercase(), row))
}

fn unquote_sheet(sheet: &str) -> String {
    let sheet = sheet.trim();
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

fn needs_quotes(sheet: &str) -> bool {
    !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
