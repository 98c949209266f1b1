use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::Error;
use crate::types::Result;

use super::{DataReader, RawTable};

/// Excel file reader (supports .xlsx, .xls, .xlsm, .xlsb); reads the first sheet
pub struct ExcelReader {
    path: PathBuf,
}

impl ExcelReader {
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Convert Excel Data to string representation
    fn data_to_string(dt: &Data) -> String {
        match dt {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::Bool(b) => b.to_string(),
            Data::DateTime(d) => Self::excel_serial_to_date_string(d.as_f64()),
            Data::DateTimeIso(s) => s.clone(),
            Data::DurationIso(s) => s.clone(),
            Data::Error(_) => String::new(),
        }
    }

    /// Convert Excel serial date to ISO date string
    fn excel_serial_to_date_string(serial: f64) -> String {
        // Excel epoch is 1899-12-30 (with the 1900 leap year bug)
        let days = serial as i64;
        chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
            .and_then(|base| base.checked_add_signed(chrono::Duration::days(days)))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| serial.to_string())
    }
}

impl DataReader for ExcelReader {
    fn read(&mut self) -> Result<RawTable> {
        let mut workbook = open_workbook_auto(&self.path)?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::MalformedInput(format!(
                "workbook {} has no sheets",
                self.path.display()
            )))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(Error::Excel)?;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(Self::data_to_string).collect())
            .unwrap_or_default();

        let rows = rows
            .map(|row| row.iter().map(Self::data_to_string).collect())
            .collect();

        Ok(RawTable {
            name: sheet_name,
            headers,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_serial_date() {
        assert_eq!(ExcelReader::excel_serial_to_date_string(43466.0), "2019-01-01");
    }

    #[test]
    fn test_data_to_string() {
        assert_eq!(ExcelReader::data_to_string(&Data::Float(6.0)), "6");
        assert_eq!(ExcelReader::data_to_string(&Data::Int(7)), "7");
        assert_eq!(ExcelReader::data_to_string(&Data::Empty), "");
        assert_eq!(
            ExcelReader::data_to_string(&Data::String("Code 1".to_string())),
            "Code 1"
        );
    }

    #[test]
    fn test_missing_workbook() {
        let mut reader = ExcelReader::new(Path::new("/nonexistent/codelist.xlsx")).unwrap();
        assert!(reader.read().is_err());
    }
}
