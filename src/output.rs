use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::types::{ChildCodeRow, MeasureTable, Result};

/// Output file name for a rate table broken down by `group_column`
pub fn rate_table_file_name(group_column: &str) -> String {
    format!("rate_table_{}.csv", group_column)
}

fn format_count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// NaN and missing rates are both written as empty cells
fn format_rate(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => String::new(),
    }
}

/// Write a measure table to any writer as `<group>,numerator,denominator,rate,date`
pub fn write_measure_table<W: Write>(table: &MeasureTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        table.group_column.as_str(),
        "numerator",
        "denominator",
        "rate",
        "date",
    ])?;

    for row in &table.rows {
        csv_writer.write_record([
            row.group.as_ref().map(|g| g.to_string()).unwrap_or_default(),
            format_count(row.numerator),
            format_count(row.denominator),
            format_rate(row.rate),
            row.period.format("%Y-%m-%d").to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write a measure table to a CSV file
pub fn write_measure_csv(table: &MeasureTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_measure_table(table, BufWriter::new(file))
}

/// Write the child-code summary to a CSV file
pub fn write_child_code_csv(rows: &[ChildCodeRow], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in rows {
        csv_writer.serialize(row)?;
    }
    // Header only, for an empty summary
    if rows.is_empty() {
        csv_writer.write_record(["code", "Events", "Events (thousands)", "Description"])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write a serializable value to a pretty-printed JSON file
pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Serialize a value to a pretty-printed JSON string
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write a value as JSON to stdout
pub fn write_json_stdout<T: Serialize>(value: &T) -> Result<()> {
    let json = to_json_string(value)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", json)?;
    Ok(())
}
