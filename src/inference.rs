use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::GroupValue;

/// Missing value tokens
pub const MISSING_TOKENS: &[&str] = &[
    "", "NA", "N/A", "na", "n/a", "NULL", "null", "NaN", "nan", ".", "-", "--", "missing",
    "MISSING", "None", "none", "#N/A", "#VALUE!", "#REF!", "#DIV/0!", "#NUM!", "#NAME?", "#NULL!",
];

// Date format patterns
static DATE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // ISO format: 2024-01-15
        (Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap(), "%Y-%m-%d"),
        // European format: 15/01/2024
        (
            Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap(),
            "%d/%m/%Y",
        ),
        // ISO with dots: 2024.01.15
        (Regex::new(r"^\d{4}\.\d{2}\.\d{2}$").unwrap(), "%Y.%m.%d"),
    ]
});

// Timestamps written by dataframe exports, e.g. "2019-01-01 00:00:00"
static DATETIME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ]\d{2}:\d{2}:\d{2}(\.\d+)?Z?$").unwrap());

/// Check if a value represents a missing value
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    MISSING_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// Parse a numeric value
pub fn parse_numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

/// Parse a non-negative integral count ("6" and "6.0" both give 6)
pub fn parse_count(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Some(n);
    }
    match parse_numeric(trimmed) {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Some(f as u64),
        _ => None,
    }
}

/// Parse a calendar date, accepting a time component that is discarded
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = DATETIME_PREFIX.captures(trimmed) {
        return NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok();
    }

    DATE_PATTERNS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(trimmed))
        .find_map(|(_, format)| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Infer a typed group value from a raw cell; `None` for missing cells
pub fn infer_group_value(value: &str) -> Option<GroupValue> {
    if is_missing(value) {
        return None;
    }

    let trimmed = value.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        Some(GroupValue::Integer(i))
    } else if let Some(f) = parse_numeric(trimmed) {
        Some(GroupValue::Float(f))
    } else {
        Some(GroupValue::Text(trimmed.to_string()))
    }
}
