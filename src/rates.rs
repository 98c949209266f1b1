use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::types::{MeasureRow, MeasureTable, TOTAL_GROUP_COLUMN};

/// Rate for one row: `numerator / (denominator / rate_per)`.
///
/// A zero denominator gives `NaN`; a missing count gives `None`.
pub fn rate_for(numerator: Option<u64>, denominator: Option<u64>, rate_per: f64) -> Option<f64> {
    match (numerator, denominator) {
        (Some(_), Some(0)) => Some(f64::NAN),
        (Some(n), Some(d)) => Some(n as f64 / (d as f64 / rate_per)),
        _ => None,
    }
}

/// Add (or replace) the rate of every row
pub fn calculate_rate(table: &MeasureTable, rate_per: f64) -> MeasureTable {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let rate = rate_for(row.numerator, row.denominator, rate_per);
            row.clone().with_rate(rate)
        })
        .collect();

    MeasureTable::new(&table.group_column, rows)
}

/// Rate as a fraction of the denominator
pub fn calculate_percentage(table: &MeasureTable) -> MeasureTable {
    calculate_rate(table, 1.0)
}

/// Sum counts across groups for each period, then recompute the rate.
///
/// Missing counts are skipped; a period whose counts are all missing keeps
/// a missing total.
pub fn period_totals(table: &MeasureTable, rate_per: f64) -> MeasureTable {
    let mut totals: BTreeMap<NaiveDate, (Option<u64>, Option<u64>)> = BTreeMap::new();
    for row in &table.rows {
        let entry = totals.entry(row.period).or_insert((None, None));
        entry.0 = sum_counts(entry.0, row.numerator);
        entry.1 = sum_counts(entry.1, row.denominator);
    }

    let rows: Vec<MeasureRow> = totals
        .into_iter()
        .map(|(period, (numerator, denominator))| {
            MeasureRow::new(period, None, numerator, denominator)
                .with_rate(rate_for(numerator, denominator, rate_per))
        })
        .collect();

    debug!(
        group_column = %table.group_column,
        periods = rows.len(),
        "computed period totals"
    );

    MeasureTable::new(TOTAL_GROUP_COLUMN, rows)
}

/// Null-skipping sum of two counts
pub(crate) fn sum_counts(acc: Option<u64>, value: Option<u64>) -> Option<u64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.saturating_add(v)),
        (None, v) => v,
        (a, None) => a,
    }
}
