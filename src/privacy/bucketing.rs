use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;
use crate::rates::sum_counts;
use crate::stats::{bin_count, bin_index, quantile_edges, WelfordStats};
use crate::types::{GroupValue, MeasureRow, MeasureTable, Result, Warning, IMD_QUANTILES};

/// Label scheme for deprivation quantile bins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImdLabelStyle {
    /// "Most deprived", "2", "3", "4", "Least deprived"
    #[default]
    Descriptive,
    /// "1 - Most deprived", "2", "3", "4", "5 - Least deprived"
    Numbered,
    /// "1" to "5"
    Plain,
}

impl ImdLabelStyle {
    /// Labels for `bins` bins, most deprived first.
    ///
    /// The first and last bins carry the extreme labels; bins in between are
    /// named by their 1-based position.
    pub fn labels(&self, bins: usize) -> Vec<String> {
        (0..bins)
            .map(|i| {
                let position = i + 1;
                match self {
                    ImdLabelStyle::Plain => position.to_string(),
                    ImdLabelStyle::Descriptive if i == 0 => "Most deprived".to_string(),
                    ImdLabelStyle::Descriptive if i + 1 == bins => "Least deprived".to_string(),
                    ImdLabelStyle::Numbered if i == 0 => format!("{} - Most deprived", position),
                    ImdLabelStyle::Numbered if i + 1 == bins => {
                        format!("{} - Least deprived", position)
                    }
                    _ => position.to_string(),
                }
            })
            .collect()
    }
}

/// Equal-frequency bins fitted to a set of values
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileBins {
    edges: Vec<f64>,
}

impl QuantileBins {
    pub fn fit(values: &[f64], bins: usize) -> Self {
        Self {
            edges: quantile_edges(values, bins),
        }
    }

    pub fn len(&self) -> usize {
        bin_count(&self.edges)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn assign(&self, value: f64) -> Option<usize> {
        bin_index(&self.edges, value)
    }
}

/// Output of a quantile regrouping
#[derive(Debug, Clone)]
pub struct BinnedTable {
    pub table: MeasureTable,
    pub bins: usize,
    pub warning: Option<Warning>,
}

#[derive(Debug, Default)]
struct BinAccumulator {
    numerator: Option<u64>,
    denominator: Option<u64>,
    rate: WelfordStats,
}

impl BinAccumulator {
    fn add(&mut self, row: &MeasureRow) {
        self.numerator = sum_counts(self.numerator, row.numerator);
        self.denominator = sum_counts(self.denominator, row.denominator);
        if let Some(rate) = row.rate {
            self.rate.update(rate);
        }
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

// Missing deprivation values sort after every real bin
const MISSING_BIN: usize = usize::MAX;

/// Convert a deprivation score column into quantile bins and regroup.
///
/// Bins are fitted over every row of the table; never more bins are
/// requested than there are distinct scores. Within each (period, bin)
/// the rate is averaged and the counts are summed. Rows with a missing
/// score form their own per-period group with no label.
pub fn calculate_imd_group(table: &MeasureTable, style: ImdLabelStyle) -> Result<BinnedTable> {
    let scores = table
        .rows
        .iter()
        .map(|row| match &row.group {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                Error::MalformedInput(format!(
                    "non-numeric value '{}' in column '{}'",
                    value, table.group_column
                ))
            }),
        })
        .collect::<Result<Vec<Option<f64>>>>()?;

    let present: Vec<f64> = scores.iter().flatten().copied().collect();
    let bins = QuantileBins::fit(&present, IMD_QUANTILES.min(distinct_count(&present)));
    let labels = style.labels(bins.len());

    let warning = if !present.is_empty() && bins.len() < IMD_QUANTILES {
        let warning = Warning::InsufficientCardinality {
            column: table.group_column.clone(),
            requested: IMD_QUANTILES,
            produced: bins.len(),
        };
        warn!("{}", warning);
        Some(warning)
    } else {
        None
    };

    let mut groups: BTreeMap<(NaiveDate, usize), BinAccumulator> = BTreeMap::new();
    for (row, score) in table.rows.iter().zip(scores.iter()) {
        let bin = score
            .and_then(|s| bins.assign(s))
            .unwrap_or(MISSING_BIN);
        groups.entry((row.period, bin)).or_default().add(row);
    }

    let rows = groups
        .into_iter()
        .map(|((period, bin), acc)| MeasureRow {
            period,
            group: labels.get(bin).map(|l| GroupValue::Text(l.clone())),
            numerator: acc.numerator,
            denominator: acc.denominator,
            rate: acc.rate.mean(),
        })
        .collect::<Vec<_>>();

    debug!(
        column = %table.group_column,
        bins = bins.len(),
        rows = rows.len(),
        "regrouped by deprivation quantile"
    );

    Ok(BinnedTable {
        table: MeasureTable::new(&table.group_column, rows),
        bins: bins.len(),
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn imd_table() -> MeasureTable {
        let imd = [1, 2, 3, 4, 5, 1, 2, 3, 4, 5];
        let events = [0u64, 1, 1, 0, 1, 0, 1, 1, 0, 1];
        let rows = imd
            .iter()
            .zip(events.iter())
            .enumerate()
            .map(|(i, (score, event))| {
                let period = if i < 5 { "2019-01-01" } else { "2019-02-01" };
                MeasureRow::new(date(period), Some(GroupValue::Integer(*score)), Some(*event), Some(1))
                    .with_rate(Some(*event as f64))
            })
            .collect();
        MeasureTable::new("imd", rows)
    }

    #[test]
    fn test_labels_descriptive() {
        assert_eq!(
            ImdLabelStyle::Descriptive.labels(5),
            vec!["Most deprived", "2", "3", "4", "Least deprived"]
        );
    }

    #[test]
    fn test_labels_numbered() {
        assert_eq!(
            ImdLabelStyle::Numbered.labels(5),
            vec!["1 - Most deprived", "2", "3", "4", "5 - Least deprived"]
        );
    }

    #[test]
    fn test_labels_fewer_bins() {
        assert_eq!(
            ImdLabelStyle::Descriptive.labels(3),
            vec!["Most deprived", "2", "Least deprived"]
        );
        assert_eq!(ImdLabelStyle::Descriptive.labels(1), vec!["Most deprived"]);
        assert_eq!(ImdLabelStyle::Plain.labels(2), vec!["1", "2"]);
    }

    #[test]
    fn test_calculate_imd_group() {
        let binned = calculate_imd_group(&imd_table(), ImdLabelStyle::Descriptive).unwrap();

        assert_eq!(binned.bins, 5);
        assert!(binned.warning.is_none());
        assert_eq!(binned.table.len(), 10);

        let labels: Vec<String> = binned
            .table
            .rows
            .iter()
            .map(|r| r.group.as_ref().unwrap().to_string())
            .collect();
        let expected = ["Most deprived", "2", "3", "4", "Least deprived"];
        assert_eq!(&labels[..5], &expected[..]);
        assert_eq!(&labels[5..], &expected[..]);

        assert_eq!(
            binned.table.numerators(),
            vec![0u64, 1, 1, 0, 1, 0, 1, 1, 0, 1]
                .into_iter()
                .map(Some)
                .collect::<Vec<_>>()
        );
        assert_eq!(binned.table.denominators(), vec![Some(1); 10]);
        assert_eq!(binned.table.rows[1].rate, Some(1.0));
        assert_eq!(binned.table.rows[5].period, date("2019-02-01"));
    }

    #[test]
    fn test_aggregates_within_bin() {
        let rows = vec![
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(1)), Some(2), Some(10)).with_rate(Some(0.2)),
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(1)), Some(4), Some(10)).with_rate(Some(0.4)),
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(9)), Some(1), Some(10)).with_rate(Some(0.1)),
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(9)), Some(3), Some(10)).with_rate(Some(0.3)),
        ];
        let binned =
            calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Plain).unwrap();

        assert_eq!(binned.bins, 2);
        assert_eq!(binned.table.len(), 2);
        assert_eq!(binned.table.rows[1].group, Some(GroupValue::text("2")));
        assert_eq!(binned.table.rows[1].numerator, Some(4));
        assert_eq!(binned.table.rows[0].numerator, Some(6));
        assert_eq!(binned.table.rows[0].denominator, Some(20));
        assert!((binned.table.rows[0].rate.unwrap() - 0.3).abs() < 1e-10);
    }

    #[test]
    fn test_insufficient_cardinality_warns() {
        let rows = vec![
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(1)), Some(2), Some(10)),
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(2)), Some(4), Some(10)),
        ];
        let binned =
            calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Descriptive).unwrap();

        assert_eq!(binned.bins, 2);
        assert_eq!(binned.table.rows[0].group, Some(GroupValue::text("Most deprived")));
        assert_eq!(binned.table.rows[1].group, Some(GroupValue::text("Least deprived")));
        assert!(matches!(
            binned.warning,
            Some(Warning::InsufficientCardinality { requested: 5, produced: 2, .. })
        ));
    }

    #[test]
    fn test_skewed_scores_drop_duplicate_edges() {
        let scores = [1i64, 1, 1, 1, 1, 1, 1, 1, 2, 3];
        let rows = scores
            .iter()
            .map(|s| MeasureRow::new(date("2019-01-01"), Some((*s).into()), Some(1), Some(10)))
            .collect();
        let binned =
            calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Plain).unwrap();

        assert!(binned.bins < 3);
        assert!(binned.warning.is_some());
    }

    #[test]
    fn test_five_distinct_skewed_scores_give_fewer_bins() {
        // Quantile edges 1, 1, 1, 1, 2.8, 5 collapse to 1, 2.8, 5
        let scores = [1i64, 1, 1, 1, 1, 1, 1, 1, 2, 3, 4, 5];
        let rows = scores
            .iter()
            .map(|s| {
                MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(*s)), Some(1), Some(10))
            })
            .collect();

        let binned =
            calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Descriptive).unwrap();

        assert_eq!(binned.bins, 2);
        assert_eq!(
            binned.warning,
            Some(Warning::InsufficientCardinality {
                column: "imd".to_string(),
                requested: 5,
                produced: 2,
            })
        );
        let groups: Vec<Option<GroupValue>> =
            binned.table.rows.iter().map(|r| r.group.clone()).collect();
        assert_eq!(
            groups,
            vec![
                Some(GroupValue::text("Most deprived")),
                Some(GroupValue::text("Least deprived"))
            ]
        );
        assert_eq!(binned.table.numerators(), vec![Some(9), Some(3)]);
    }

    #[test]
    fn test_constant_scores_single_bin() {
        let rows = vec![
            MeasureRow::new(date("2019-01-01"), Some(GroupValue::Integer(4)), Some(2), Some(10)),
            MeasureRow::new(date("2019-02-01"), Some(GroupValue::Integer(4)), Some(3), Some(10)),
        ];
        let binned =
            calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Descriptive).unwrap();

        assert_eq!(binned.bins, 1);
        assert_eq!(binned.table.len(), 2);
        assert_eq!(binned.table.rows[0].group, Some(GroupValue::text("Most deprived")));
    }

    #[test]
    fn test_missing_scores_kept_after_bins() {
        let mut table = imd_table();
        table.rows.push(MeasureRow::new(date("2019-01-01"), None, Some(3), Some(8)));
        let binned = calculate_imd_group(&table, ImdLabelStyle::Descriptive).unwrap();

        assert_eq!(binned.table.len(), 11);
        assert_eq!(binned.table.rows[5].group, None);
        assert_eq!(binned.table.rows[5].numerator, Some(3));
        assert_eq!(binned.table.rows[5].rate, None);
    }

    #[test]
    fn test_non_numeric_score_is_error() {
        let rows = vec![MeasureRow::new(
            date("2019-01-01"),
            Some(GroupValue::text("high")),
            Some(2),
            Some(10),
        )];
        let result = calculate_imd_group(&MeasureTable::new("imd", rows), ImdLabelStyle::Descriptive);
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_empty_table() {
        let binned =
            calculate_imd_group(&MeasureTable::new("imd", Vec::new()), ImdLabelStyle::Descriptive)
                .unwrap();
        assert!(binned.table.is_empty());
        assert!(binned.warning.is_none());
    }
}
