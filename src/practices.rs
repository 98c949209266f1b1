use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::{MeasureRow, MeasureTable};

fn is_truthy(rate: Option<f64>) -> bool {
    matches!(rate, Some(v) if v != 0.0 && !v.is_nan())
}

/// Drop practices with no events during the study period.
///
/// A practice is kept when at least one of its rows has a non-zero rate.
/// Rows without a practice identifier are dropped. Surviving rows keep their
/// original order.
pub fn drop_irrelevant_practices(table: &MeasureTable) -> MeasureTable {
    let mut relevant: HashMap<String, bool> = HashMap::new();
    for row in &table.rows {
        if let Some(group) = &row.group {
            let entry = relevant.entry(group.to_string()).or_insert(false);
            *entry |= is_truthy(row.rate);
        }
    }

    let rows: Vec<MeasureRow> = table
        .rows
        .iter()
        .filter(|row| {
            row.group
                .as_ref()
                .and_then(|g| relevant.get(&g.to_string()))
                .copied()
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let dropped = relevant.values().filter(|keep| !**keep).count();
    debug!(
        group_column = %table.group_column,
        dropped,
        kept = relevant.len() - dropped,
        "dropped practices without events"
    );

    MeasureTable::new(&table.group_column, rows)
}

/// Number of distinct practices in a measure table
pub fn count_practices(table: &MeasureTable) -> usize {
    table.distinct_groups().len()
}

/// Share of registered practices that appear in `table`, as a percentage
/// rounded to two decimals. `None` when no registered practices are known.
pub fn practice_coverage(table: &MeasureTable, registered: &HashSet<String>) -> Option<f64> {
    if registered.is_empty() {
        return None;
    }
    let percentage = count_practices(table) as f64 / registered.len() as f64 * 100.0;
    Some((percentage * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupValue;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn measure_table() -> MeasureTable {
        let events = [0u64, 6, 3, 7];
        let dates = ["2019-01-01", "2019-01-01", "2019-02-01", "2019-02-01"];
        let rows = events
            .iter()
            .zip(dates.iter())
            .enumerate()
            .map(|(i, (e, d))| {
                MeasureRow::new(
                    date(d),
                    Some(GroupValue::Integer(i as i64 + 1)),
                    Some(*e),
                    Some(10),
                )
                .with_rate(Some(*e as f64 / 10.0))
            })
            .collect();
        MeasureTable::new("practice", rows)
    }

    fn practice_ids(table: &MeasureTable) -> Vec<i64> {
        table
            .rows
            .iter()
            .filter_map(|r| r.group.as_ref().and_then(GroupValue::as_integer))
            .collect()
    }

    #[test]
    fn test_irrelevant_practices_dropped() {
        let filtered = drop_irrelevant_practices(&measure_table());
        assert_eq!(practice_ids(&filtered), vec![2, 3, 4]);
    }

    #[test]
    fn test_returns_new_table() {
        let table = measure_table();
        let filtered = drop_irrelevant_practices(&table);
        assert_eq!(table.len(), 4);
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn test_practice_with_any_event_keeps_all_rows() {
        let mut table = measure_table();
        table.rows.push(
            MeasureRow::new(date("2019-03-01"), Some(GroupValue::Integer(2)), Some(0), Some(10))
                .with_rate(Some(0.0)),
        );
        let filtered = drop_irrelevant_practices(&table);
        assert_eq!(practice_ids(&filtered), vec![2, 3, 4, 2]);
    }

    #[test]
    fn test_nan_and_missing_rates_are_not_events() {
        let table = MeasureTable::new(
            "practice",
            vec![
                MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(1)), Some(0), Some(0))
                    .with_rate(Some(f64::NAN)),
                MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(2)), None, Some(10)),
                MeasureRow::new(date("2019-01-01"), None, Some(5), Some(10)).with_rate(Some(0.5)),
            ],
        );
        assert!(drop_irrelevant_practices(&table).is_empty());
    }

    #[test]
    fn test_count_practices() {
        assert_eq!(count_practices(&measure_table()), 4);
    }

    #[test]
    fn test_practice_coverage() {
        let registered: HashSet<String> = (1..=5).map(|i| i.to_string()).collect();
        assert_eq!(practice_coverage(&measure_table(), &registered), Some(80.0));
        assert_eq!(practice_coverage(&measure_table(), &HashSet::new()), None);
    }
}
