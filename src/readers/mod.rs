pub mod csv;
pub mod excel;
pub mod measures;

use std::path::Path;

use crate::error::Error;
use crate::types::{FileFormat, Result};

pub use measures::{
    discover_measure_files, load_codelist, load_measure_table, load_registered_practices,
    MeasureColumns,
};

/// Header plus string cells, as read from any supported file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// File or sheet name, used in error messages
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Position of a named column, or a missing-column error
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| Error::MissingColumn {
                column: column.to_string(),
                table: self.name.clone(),
            })
    }

    /// Cell at (row, column); short rows read as empty
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Common trait for data file readers
pub trait DataReader {
    /// Read the first table of the file
    fn read(&mut self) -> Result<RawTable>;
}

/// Create a reader for the given file path
pub fn create_reader(path: &Path) -> Result<Box<dyn DataReader>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let format = FileFormat::from_extension(ext).ok_or_else(|| {
        Error::UnsupportedFormat(format!("Unsupported file extension: .{}", ext))
    })?;

    match format {
        FileFormat::Csv => Ok(Box::new(csv::CsvReader::new(path)?)),
        FileFormat::Tsv => Ok(Box::new(csv::CsvReader::new_tsv(path)?)),
        FileFormat::Excel => Ok(Box::new(excel::ExcelReader::new(path)?)),
    }
}

/// Read a whole file into a [`RawTable`]
pub fn read_table(path: &Path) -> Result<RawTable> {
    create_reader(path)?.read()
}
