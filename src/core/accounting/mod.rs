pub mod accounting_service;
pub mod expense_filter;
pub mod expense_models;
pub mod expense_parser;

pub use accounting_service::{AccountingService, ExpenseSheet};
pub use expense_filter::ExpenseFilter;
pub use expense_models::{
    ExpenseChanges, ExpenseKey, ExpenseRecord, SheetRange, SheetRow, DEFAULT_CATEGORY,
};
pub use expense_parser::parse_expense;
