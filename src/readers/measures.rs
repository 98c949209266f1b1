//! Typed loading of measure tables, codelists and practice registers.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::Error;
use crate::inference::{infer_group_value, is_missing, parse_count, parse_date};
use crate::types::{CodelistEntry, MeasureRow, MeasureTable, Result};

use super::{read_table, RawTable};

static MEASURE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^measure_(.+)\.csv$").unwrap());

static PRACTICE_COUNT_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^input_practice_count.*\.csv$").unwrap());

/// Column holding the practice identifier in practice-count extracts
pub const PRACTICE_COLUMN: &str = "practice";

/// Column names of a measure file. Any pre-computed rate column (`value`)
/// is ignored; rates are always derived from the counts.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureColumns {
    pub group: String,
    pub numerator: String,
    pub denominator: String,
    pub period: String,
}

impl MeasureColumns {
    pub fn new(group: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            group: group.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            period: "date".to_string(),
        }
    }
}

fn optional_cell<T>(
    raw: &RawTable,
    row: usize,
    column: usize,
    what: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    let cell = raw.cell(row, column);
    if is_missing(cell) {
        return Ok(None);
    }
    parse(cell).map(Some).ok_or_else(|| {
        Error::MalformedInput(format!(
            "{}: row {} has invalid {} '{}'",
            raw.name,
            row + 1,
            what,
            cell.trim()
        ))
    })
}

/// Build a measure table from raw cells. Missing counts become `None`;
/// a cell that is present but unparseable is an error.
pub fn measure_table_from_raw(raw: &RawTable, columns: &MeasureColumns) -> Result<MeasureTable> {
    let group_idx = raw.column_index(&columns.group)?;
    let numerator_idx = raw.column_index(&columns.numerator)?;
    let denominator_idx = raw.column_index(&columns.denominator)?;
    let period_idx = raw.column_index(&columns.period)?;

    let rows = (0..raw.rows.len())
        .map(|i| -> Result<MeasureRow> {
            let period = optional_cell(raw, i, period_idx, "date", parse_date)?.ok_or_else(|| {
                Error::MalformedInput(format!("{}: row {} has no date", raw.name, i + 1))
            })?;
            let numerator = optional_cell(raw, i, numerator_idx, &columns.numerator, parse_count)?;
            let denominator =
                optional_cell(raw, i, denominator_idx, &columns.denominator, parse_count)?;

            Ok(MeasureRow::new(
                period,
                infer_group_value(raw.cell(i, group_idx)),
                numerator,
                denominator,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MeasureTable::new(&columns.group, rows))
}

/// Load a measure file (CSV, TSV or Excel)
pub fn load_measure_table(path: &Path, columns: &MeasureColumns) -> Result<MeasureTable> {
    let raw = read_table(path)?;
    let table = measure_table_from_raw(&raw, columns)?;
    debug!(
        file = %path.display(),
        group_column = %columns.group,
        rows = table.len(),
        "loaded measure table"
    );
    Ok(table)
}

/// Load a codelist; rows with a missing code are skipped
pub fn load_codelist(path: &Path, code_column: &str, term_column: &str) -> Result<Vec<CodelistEntry>> {
    let raw = read_table(path)?;
    let code_idx = raw.column_index(code_column)?;
    let term_idx = raw.column_index(term_column)?;

    let entries: Vec<CodelistEntry> = (0..raw.rows.len())
        .filter(|&i| !is_missing(raw.cell(i, code_idx)))
        .map(|i| CodelistEntry {
            code: raw.cell(i, code_idx).trim().to_string(),
            term: raw.cell(i, term_idx).trim().to_string(),
        })
        .collect();

    debug!(file = %path.display(), entries = entries.len(), "loaded codelist");
    Ok(entries)
}

fn list_matching(dir: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| pattern.is_match(n))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Measure files in `dir`, keyed by measure id (`measure_<id>.csv`)
pub fn discover_measure_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let files = list_matching(dir, &MEASURE_FILE)?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let id = MEASURE_FILE.captures(name)?.get(1)?.as_str().to_string();
            Some((id, path))
        })
        .collect();
    Ok(files)
}

/// Practice-count extracts in `dir`
pub fn practice_count_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_matching(dir, &PRACTICE_COUNT_FILE)
}

/// Distinct practice identifiers across every `input_practice_count*.csv`
/// in `dir`. Identifiers are normalised so `"12"` and `"12.0"` match.
pub fn load_registered_practices(dir: &Path) -> Result<HashSet<String>> {
    let mut practices = HashSet::new();
    for path in practice_count_files(dir)? {
        let raw = read_table(&path)?;
        let idx = raw.column_index(PRACTICE_COLUMN)?;
        practices.extend(
            (0..raw.rows.len()).filter_map(|i| infer_group_value(raw.cell(i, idx)).map(|g| g.to_string())),
        );
    }
    debug!(dir = %dir.display(), practices = practices.len(), "loaded registered practices");
    Ok(practices)
}
