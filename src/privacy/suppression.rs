use serde::Serialize;
use tracing::debug;

use crate::types::MeasureTable;

/// Counts up to this value are always redacted once a column needs
/// suppression, whatever the configured threshold
pub const SMALL_COUNT_FLOOR: u64 = 5;

/// Reason a count was redacted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressionReason {
    /// Count at or below the redaction limit (the threshold, but never
    /// less than [`SMALL_COUNT_FLOOR`])
    BelowThreshold { threshold: u64 },
    /// Smallest remaining count, redacted so the suppressed total cannot be
    /// recovered by subtraction
    Complementary { suppressed_total: u64 },
}

impl SuppressionReason {
    pub fn to_string(&self) -> String {
        match self {
            SuppressionReason::BelowThreshold { threshold } => {
                format!("Count at or below threshold {}", threshold)
            }
            SuppressionReason::Complementary { suppressed_total } => {
                format!(
                    "Complementary suppression (suppressed total was {})",
                    suppressed_total
                )
            }
        }
    }
}

/// A single redacted cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressedCell {
    pub row: usize,
    pub value: u64,
    #[serde(flatten)]
    pub reason: SuppressionReason,
}

/// A count column after suppression
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SuppressedColumn {
    #[serde(skip)]
    pub values: Vec<Option<u64>>,
    pub cells: Vec<SuppressedCell>,
    /// Running total checked against the threshold: counts at or below the
    /// threshold plus every count absorbed afterwards
    pub suppressed_total: u64,
}

impl SuppressedColumn {
    fn untouched(values: &[Option<u64>]) -> Self {
        Self {
            values: values.to_vec(),
            cells: Vec::new(),
            suppressed_total: 0,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        !self.cells.is_empty()
    }

    /// Redacted row indices in row order
    pub fn redacted_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.cells.iter().map(|c| c.row).collect();
        rows.sort_unstable();
        rows
    }
}

/// Fold state threaded through the complementary suppression steps
#[derive(Debug, Clone)]
struct RedactionState {
    values: Vec<Option<u64>>,
    cells: Vec<SuppressedCell>,
    suppressed_total: u64,
}

impl RedactionState {
    /// Redact every small count; the running total starts from the counts
    /// at or below the threshold only
    fn below_threshold(values: &[Option<u64>], threshold: u64, small_total: u64) -> Self {
        let limit = threshold.max(SMALL_COUNT_FLOOR);
        let mut cells = Vec::new();
        let values = values
            .iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(v) if *v <= limit => {
                    cells.push(SuppressedCell {
                        row,
                        value: *v,
                        reason: SuppressionReason::BelowThreshold { threshold: limit },
                    });
                    None
                }
                other => *other,
            })
            .collect();

        Self {
            values,
            cells,
            suppressed_total: small_total,
        }
    }

    /// Absorb the smallest remaining count (first occurrence on ties), or
    /// `None` once the suppressed total exceeds the threshold or nothing is
    /// left to absorb.
    fn absorb_next(&self, threshold: u64) -> Option<Self> {
        if self.suppressed_total > threshold {
            return None;
        }

        let (row, value) = self
            .values
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.map(|v| (row, v)))
            .min_by_key(|&(row, v)| (v, row))?;

        let mut values = self.values.clone();
        values[row] = None;
        let mut cells = self.cells.clone();
        cells.push(SuppressedCell {
            row,
            value,
            reason: SuppressionReason::Complementary {
                suppressed_total: self.suppressed_total,
            },
        });

        Some(Self {
            values,
            cells,
            suppressed_total: self.suppressed_total.saturating_add(value),
        })
    }
}

impl From<RedactionState> for SuppressedColumn {
    fn from(state: RedactionState) -> Self {
        Self {
            values: state.values,
            cells: state.cells,
            suppressed_total: state.suppressed_total,
        }
    }
}

/// Suppress small counts in one column.
///
/// Columns without any non-zero count at or below `threshold` are returned
/// unchanged. Otherwise every count at or below `threshold`, and every count
/// up to [`SMALL_COUNT_FLOOR`], is redacted. Starting from the sum of the
/// counts at or below `threshold`, the smallest remaining counts are then
/// redacted one at a time until that total exceeds the threshold.
pub fn suppress_column(values: &[Option<u64>], threshold: u64) -> SuppressedColumn {
    let small_total: u64 = values
        .iter()
        .flatten()
        .filter(|v| **v <= threshold)
        .fold(0u64, |acc, v| acc.saturating_add(*v));

    if small_total == 0 {
        return SuppressedColumn::untouched(values);
    }

    let initial = RedactionState::below_threshold(values, threshold, small_total);
    std::iter::successors(Some(initial), |state| state.absorb_next(threshold))
        .last()
        .map(SuppressedColumn::from)
        .unwrap_or_else(|| SuppressedColumn::untouched(values))
}

/// What a redaction pass removed from a table
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RedactionReport {
    pub threshold: u64,
    pub numerator: SuppressedColumn,
    pub denominator: SuppressedColumn,
    /// Rows whose rate was nulled because a count was redacted
    pub rates_redacted: usize,
}

impl RedactionReport {
    pub fn cells_redacted(&self) -> usize {
        self.numerator.cells.len() + self.denominator.cells.len() + self.rates_redacted
    }

    pub fn is_empty(&self) -> bool {
        self.cells_redacted() == 0
    }
}

/// Apply small-number suppression to the numerator and denominator of a
/// table independently, then null the rate of every row that lost a count.
pub fn redact_small_numbers(table: &MeasureTable, threshold: u64) -> (MeasureTable, RedactionReport) {
    let numerator = suppress_column(&table.numerators(), threshold);
    let denominator = suppress_column(&table.denominators(), threshold);

    let mut rates_redacted = 0;
    let rows = table
        .rows
        .iter()
        .zip(numerator.values.iter().zip(denominator.values.iter()))
        .map(|(row, (num, den))| {
            let mut row = row.clone();
            row.numerator = *num;
            row.denominator = *den;
            if num.is_none() || den.is_none() {
                if row.rate.is_some() {
                    rates_redacted += 1;
                }
                row.rate = None;
            }
            row
        })
        .collect();

    debug!(
        group_column = %table.group_column,
        threshold,
        numerator_cells = numerator.cells.len(),
        denominator_cells = denominator.cells.len(),
        rates_redacted,
        "applied small-number suppression"
    );

    let report = RedactionReport {
        threshold,
        numerator,
        denominator,
        rates_redacted,
    };

    (MeasureTable::new(&table.group_column, rows), report)
}
