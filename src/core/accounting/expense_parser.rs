// Quick-entry parser for short free-text expenses such as
// "今天早餐 50元" or "lunch $120 yesterday".
//
// Used for accounting requests on the natural-language path when no language
// model is configured. Deterministic and offline.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use super::expense_models::{ExpenseRecord, DEFAULT_CATEGORY};

static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*(\d+)|(\d+)\s*(?:元|塊|\$|dollars?)")
        .expect("amount pattern is valid")
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(今天|昨天|today|yesterday|\d{4}-\d{2}-\d{2})").expect("date pattern is valid")
});

/// (keyword, category stored in the sheet)
const CATEGORIES: &[(&str, &str)] = &[
    ("早餐", "早餐"),
    ("午餐", "午餐"),
    ("晚餐", "晚餐"),
    ("交通", "交通"),
    ("娛樂", "娛樂"),
    ("購物", "購物"),
    ("其他", "其他"),
    ("breakfast", "breakfast"),
    ("lunch", "lunch"),
    ("dinner", "dinner"),
    ("transport", "transport"),
    ("entertainment", "entertainment"),
    ("shopping", "shopping"),
];

/// Extracts date, category and amount. The amount is `None` when the text
/// has no recognisable money amount; the caller decides whether that is an
/// error.
pub fn parse_expense(text: &str, today: NaiveDate) -> ExpenseRecord {
    let amount = AMOUNT.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    });

    let lowered = text.to_lowercase();
    let category = CATEGORIES
        .iter()
        .filter_map(|(keyword, category)| lowered.find(keyword).map(|at| (at, *category)))
        .min_by_key(|(at, _)| *at)
        .map(|(_, category)| category.to_string())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let date = match DATE.find(text).map(|m| m.as_str().to_lowercase()) {
        Some(word) if word == "今天" || word == "today" => today,
        Some(word) if word == "昨天" || word == "yesterday" => today - Duration::days(1),
        Some(iso) => NaiveDate::parse_from_str(&iso, "%Y-%m-%d").unwrap_or(today),
        None => today,
    };

    ExpenseRecord {
        date: date.format("%Y-%m-%d").to_string(),
        category,
        amount,
        note: String::new(),
    }
}
