use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bucketing::{calculate_imd_group, ImdLabelStyle};
use crate::types::{GroupValue, MeasureTable, Result, Warning};

/// Ethnicity category (6-group classification, coded 1 to 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ethnicity {
    White,
    Mixed,
    Asian,
    Black,
    Other,
    Unknown,
}

impl Ethnicity {
    /// Map a coded value; anything outside 1..=5, including missing, is `Unknown`
    pub fn from_code(value: Option<&GroupValue>) -> Self {
        match value.and_then(GroupValue::as_integer) {
            Some(1) => Ethnicity::White,
            Some(2) => Ethnicity::Mixed,
            Some(3) => Ethnicity::Asian,
            Some(4) => Ethnicity::Black,
            Some(5) => Ethnicity::Other,
            _ => Ethnicity::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Ethnicity::White => "White",
            Ethnicity::Mixed => "Mixed",
            Ethnicity::Asian => "Asian",
            Ethnicity::Black => "Black",
            Ethnicity::Other => "Other",
            Ethnicity::Unknown => "unknown",
        }
    }
}

/// State of a 0/1 flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFlag {
    Negative,
    Positive,
}

impl BinaryFlag {
    pub fn from_value(value: &GroupValue) -> Option<Self> {
        match value.as_integer() {
            Some(0) => Some(BinaryFlag::Negative),
            Some(1) => Some(BinaryFlag::Positive),
            _ => None,
        }
    }
}

/// How a breakdown column is turned into readable categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CategoryRecoder {
    /// 0 and 1 become the negative and positive labels; other values pass through
    Binary { positive: String, negative: String },
    /// Codes 1 to 5 become ethnicity names, everything else "unknown"
    Ethnicity,
    /// Deprivation scores become quantile bins, regrouped per period
    ImdQuantiles { labels: ImdLabelStyle },
}

/// A recoded table and any non-fatal warnings raised on the way
#[derive(Debug, Clone)]
pub struct Recoded {
    pub table: MeasureTable,
    pub warnings: Vec<Warning>,
}

impl CategoryRecoder {
    pub fn binary(positive: &str, negative: &str) -> Self {
        CategoryRecoder::Binary {
            positive: positive.to_string(),
            negative: negative.to_string(),
        }
    }

    pub fn care_home_status() -> Self {
        Self::binary(
            "Record of positive care home status",
            "No record of positive care home status",
        )
    }

    pub fn learning_disability() -> Self {
        Self::binary(
            "Record of learning disability",
            "No record of learning disability",
        )
    }

    /// Recode the group column of `table`, returning a new table
    pub fn apply(&self, table: &MeasureTable) -> Result<Recoded> {
        match self {
            CategoryRecoder::Binary { positive, negative } => {
                Ok(Recoded {
                    table: convert_binary(table, positive, negative),
                    warnings: Vec::new(),
                })
            }
            CategoryRecoder::Ethnicity => Ok(Recoded {
                table: convert_ethnicity(table),
                warnings: Vec::new(),
            }),
            CategoryRecoder::ImdQuantiles { labels } => {
                let binned = calculate_imd_group(table, *labels)?;
                Ok(Recoded {
                    table: binned.table,
                    warnings: binned.warning.into_iter().collect(),
                })
            }
        }
    }
}

/// Replace 0/1 flags with readable labels
pub fn convert_binary(table: &MeasureTable, positive: &str, negative: &str) -> MeasureTable {
    let mut unmapped = 0usize;
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.group = row.group.map(|value| match BinaryFlag::from_value(&value) {
                Some(BinaryFlag::Positive) => GroupValue::text(positive),
                Some(BinaryFlag::Negative) => GroupValue::text(negative),
                None => {
                    unmapped += 1;
                    value
                }
            });
            row
        })
        .collect();

    debug!(column = %table.group_column, unmapped, "converted binary flag");
    MeasureTable::new(&table.group_column, rows)
}

/// Replace ethnicity codes with category names
pub fn convert_ethnicity(table: &MeasureTable) -> MeasureTable {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.group = Some(GroupValue::text(
                Ethnicity::from_code(row.group.as_ref()).label(),
            ));
            row
        })
        .collect();

    MeasureTable::new(&table.group_column, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeasureRow;
    use chrono::NaiveDate;

    fn table(column: &str, groups: Vec<Option<GroupValue>>) -> MeasureTable {
        let period = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let rows = groups
            .into_iter()
            .map(|g| MeasureRow::new(period, g, Some(10), Some(100)))
            .collect();
        MeasureTable::new(column, rows)
    }

    fn groups(table: &MeasureTable) -> Vec<Option<String>> {
        table
            .rows
            .iter()
            .map(|r| r.group.as_ref().map(|g| g.to_string()))
            .collect()
    }

    #[test]
    fn test_ethnicity_from_code() {
        assert_eq!(Ethnicity::from_code(Some(&GroupValue::Integer(1))), Ethnicity::White);
        assert_eq!(Ethnicity::from_code(Some(&GroupValue::Float(4.0))), Ethnicity::Black);
        assert_eq!(Ethnicity::from_code(Some(&GroupValue::text("3"))), Ethnicity::Asian);
        assert_eq!(Ethnicity::from_code(Some(&GroupValue::Integer(0))), Ethnicity::Unknown);
        assert_eq!(Ethnicity::from_code(Some(&GroupValue::Integer(6))), Ethnicity::Unknown);
        assert_eq!(Ethnicity::from_code(None), Ethnicity::Unknown);
    }

    #[test]
    fn test_convert_ethnicity() {
        let input = table(
            "ethnicity",
            vec![
                Some(GroupValue::Integer(1)),
                Some(GroupValue::Integer(2)),
                Some(GroupValue::Integer(5)),
                None,
            ],
        );
        let output = convert_ethnicity(&input);
        assert_eq!(
            groups(&output),
            vec![
                Some("White".to_string()),
                Some("Mixed".to_string()),
                Some("Other".to_string()),
                Some("unknown".to_string()),
            ]
        );
    }

    #[test]
    fn test_convert_binary() {
        let input = table(
            "care_home_status",
            vec![
                Some(GroupValue::Integer(0)),
                Some(GroupValue::Integer(1)),
                Some(GroupValue::Integer(2)),
                None,
            ],
        );
        let output = convert_binary(&input, "yes", "no");
        assert_eq!(
            groups(&output),
            vec![
                Some("no".to_string()),
                Some("yes".to_string()),
                Some("2".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_recoder_apply_learning_disability() {
        let input = table("learning_disability", vec![Some(GroupValue::Integer(1))]);
        let recoded = CategoryRecoder::learning_disability().apply(&input).unwrap();
        assert_eq!(
            groups(&recoded.table),
            vec![Some("Record of learning disability".to_string())]
        );
        assert!(recoded.warnings.is_empty());
    }

    #[test]
    fn test_recoder_apply_imd_reports_warning() {
        let input = table(
            "imd",
            vec![Some(GroupValue::Integer(1)), Some(GroupValue::Integer(2))],
        );
        let recoded = CategoryRecoder::ImdQuantiles {
            labels: ImdLabelStyle::Descriptive,
        }
        .apply(&input)
        .unwrap();
        assert_eq!(recoded.warnings.len(), 1);
        assert_eq!(recoded.table.len(), 2);
    }

    #[test]
    fn test_recoder_deserialize() {
        let recoder: CategoryRecoder =
            serde_json::from_str(r#"{"policy": "binary", "positive": "Y", "negative": "N"}"#)
                .unwrap();
        assert_eq!(recoder, CategoryRecoder::binary("Y", "N"));
    }
}
