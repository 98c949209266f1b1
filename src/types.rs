use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default small-number suppression threshold
pub const DEFAULT_REDACTION_THRESHOLD: u64 = 5;

/// Default rate multiplier (rate per 1000 registered patients)
pub const DEFAULT_RATE_PER: f64 = 1000.0;

/// Default number of child codes reported
pub const DEFAULT_TOP_CODES: usize = 5;

/// Number of quantile bins requested for IMD breakdowns
pub const IMD_QUANTILES: usize = 5;

/// Column name used for the per-period totals table
pub const TOTAL_GROUP_COLUMN: &str = "total";

/// A breakdown value: practice id, event code, IMD score, category label...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl GroupValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GroupValue::Integer(i) => Some(*i as f64),
            GroupValue::Float(f) => Some(*f),
            GroupValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Integer view of the value; floats must be integral
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            GroupValue::Integer(i) => Some(*i),
            GroupValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            GroupValue::Float(_) => None,
            GroupValue::Text(s) => {
                let trimmed = s.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(|f| GroupValue::Float(f).as_integer())
                })
            }
        }
    }

    pub fn text(s: &str) -> Self {
        GroupValue::Text(s.to_string())
    }
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Integer(i) => write!(f, "{}", i),
            GroupValue::Float(v) => write!(f, "{}", v),
            GroupValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for GroupValue {
    fn from(value: i64) -> Self {
        GroupValue::Integer(value)
    }
}

impl From<&str> for GroupValue {
    fn from(value: &str) -> Self {
        GroupValue::text(value)
    }
}

/// One (period, group) cell of a measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureRow {
    /// First day of the month the counts refer to
    pub period: NaiveDate,

    pub group: Option<GroupValue>,

    /// Event count; `None` once redacted or when missing from the input
    pub numerator: Option<u64>,

    /// Eligible population count; `None` once redacted or when missing
    pub denominator: Option<u64>,

    /// Derived rate; `Some(NaN)` when the denominator is zero
    pub rate: Option<f64>,
}

impl MeasureRow {
    pub fn new(
        period: NaiveDate,
        group: Option<GroupValue>,
        numerator: Option<u64>,
        denominator: Option<u64>,
    ) -> Self {
        Self {
            period,
            group,
            numerator,
            denominator,
            rate: None,
        }
    }

    pub fn with_rate(mut self, rate: Option<f64>) -> Self {
        self.rate = rate;
        self
    }
}

/// Rows of a single measure broken down by one group column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureTable {
    pub group_column: String,
    pub rows: Vec<MeasureRow>,
}

impl MeasureTable {
    pub fn new(group_column: &str, rows: Vec<MeasureRow>) -> Self {
        Self {
            group_column: group_column.to_string(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn numerators(&self) -> Vec<Option<u64>> {
        self.rows.iter().map(|r| r.numerator).collect()
    }

    pub fn denominators(&self) -> Vec<Option<u64>> {
        self.rows.iter().map(|r| r.denominator).collect()
    }

    pub fn rates(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.rate).collect()
    }

    /// Distinct non-missing groups in first-seen order
    pub fn distinct_groups(&self) -> Vec<GroupValue> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|r| r.group.as_ref())
            .filter(|g| seen.insert(g.to_string()))
            .cloned()
            .collect()
    }

    /// Stable sort by period, keeping input order within a period
    pub fn sorted_by_period(mut self) -> Self {
        self.rows.sort_by_key(|r| r.period);
        self
    }

    /// Keep rows with `start <= period <= end`
    pub fn within_window(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.period >= start && r.period <= end)
            .cloned()
            .collect();
        Self::new(&self.group_column, rows)
    }

    /// Remove rows whose group value is missing
    pub fn drop_missing_groups(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.group.is_some())
            .cloned()
            .collect();
        Self::new(&self.group_column, rows)
    }
}

/// A (code, term) pair of a reference codelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodelistEntry {
    pub code: String,
    pub term: String,
}

/// One line of the child-code summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildCodeRow {
    pub code: i64,

    #[serde(rename = "Events")]
    pub events: u64,

    #[serde(rename = "Events (thousands)")]
    pub events_thousands: f64,

    #[serde(rename = "Description")]
    pub description: Option<String>,
}

/// Non-fatal conditions surfaced while processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Quantile binning produced fewer bins than requested
    InsufficientCardinality {
        column: String,
        requested: usize,
        produced: usize,
    },
    /// An annotation date was unusable and has been skipped
    DateParse { value: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::InsufficientCardinality {
                column,
                requested,
                produced,
            } => write!(
                f,
                "Column '{}' has too few distinct values for {} bins; produced {}",
                column, requested, produced
            ),
            Warning::DateParse { value, reason } => {
                write!(f, "Skipping marker date '{}': {}", value, reason)
            }
        }
    }
}

/// Supported input file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Excel,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" | "tab" => Some(FileFormat::Tsv),
            "xlsx" | "xls" | "xlsm" | "xlsb" => Some(FileFormat::Excel),
            _ => None,
        }
    }
}

/// Result type for the application
pub type Result<T> = std::result::Result<T, crate::error::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_group_value_as_integer() {
        assert_eq!(GroupValue::Integer(3).as_integer(), Some(3));
        assert_eq!(GroupValue::Float(3.0).as_integer(), Some(3));
        assert_eq!(GroupValue::Float(3.5).as_integer(), None);
        assert_eq!(GroupValue::text("12").as_integer(), Some(12));
        assert_eq!(GroupValue::text("12.0").as_integer(), Some(12));
        assert_eq!(GroupValue::text("abc").as_integer(), None);
    }

    #[test]
    fn test_file_format_from_extension() {
        assert_eq!(FileFormat::from_extension("CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension("tab"), Some(FileFormat::Tsv));
        assert_eq!(FileFormat::from_extension("xlsx"), Some(FileFormat::Excel));
        assert_eq!(FileFormat::from_extension("sav"), None);
    }

    #[test]
    fn test_group_value_display() {
        assert_eq!(GroupValue::Integer(7).to_string(), "7");
        assert_eq!(GroupValue::Float(2.5).to_string(), "2.5");
        assert_eq!(GroupValue::text("F").to_string(), "F");
    }

    #[test]
    fn test_distinct_groups_first_seen_order() {
        let table = MeasureTable::new(
            "practice",
            vec![
                MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(2)), Some(1), Some(2)),
                MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(1)), Some(1), Some(2)),
                MeasureRow::new(date("2019-02-01"), Some(GroupValue::Integer(2)), Some(1), Some(2)),
                MeasureRow::new(date("2019-02-01"), None, Some(1), Some(2)),
            ],
        );
        assert_eq!(
            table.distinct_groups(),
            vec![GroupValue::Integer(2), GroupValue::Integer(1)]
        );
    }

    #[test]
    fn test_drop_missing_groups() {
        let table = MeasureTable::new(
            "sex",
            vec![
                MeasureRow::new(date("2019-01-01"), Some("F".into()), Some(1), Some(2)),
                MeasureRow::new(date("2019-01-01"), None, Some(3), Some(4)),
            ],
        );
        let filtered = table.drop_missing_groups();
        assert_eq!(filtered.len(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_within_window_inclusive() {
        let table = MeasureTable::new(
            "sex",
            vec![
                MeasureRow::new(date("2019-02-01"), None, Some(1), Some(2)),
                MeasureRow::new(date("2019-03-01"), None, Some(1), Some(2)),
                MeasureRow::new(date("2022-03-01"), None, Some(1), Some(2)),
                MeasureRow::new(date("2022-04-01"), None, Some(1), Some(2)),
            ],
        );
        let windowed = table.within_window(date("2019-03-01"), date("2022-03-01"));
        assert_eq!(windowed.len(), 2);
    }
}
