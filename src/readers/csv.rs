use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder};

use crate::types::Result;

use super::{DataReader, RawTable};

/// CSV/TSV file reader
pub struct CsvReader {
    path: PathBuf,
    delimiter: u8,
}

impl CsvReader {
    /// Create a new CSV reader
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            delimiter: b',',
        })
    }

    /// Create a new TSV reader
    pub fn new_tsv(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            delimiter: b'\t',
        })
    }

    fn create_reader(&self) -> Result<Reader<BufReader<File>>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let csv_reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        Ok(csv_reader)
    }
}

impl DataReader for CsvReader {
    fn read(&mut self) -> Result<RawTable> {
        let mut reader = self.create_reader()?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let rows = reader
            .records()
            .map(|record| -> Result<Vec<String>> {
                Ok(record?.iter().map(|f| f.to_string()).collect())
            })
            .collect::<Result<Vec<_>>>()?;

        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(RawTable {
            name,
            headers,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_basic_csv_read() {
        let file = create_test_file(
            "practice,event,population,value,date\n1,0,10,0,2019-01-01\n2,6,10,0.6,2019-01-01\n",
            ".csv",
        );

        let table = CsvReader::new(file.path()).unwrap().read().unwrap();

        assert_eq!(table.headers.len(), 5);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][1], "6");
    }

    #[test]
    fn test_tsv_read() {
        let file = create_test_file("code\tterm\n1\tCode 1\n", ".tsv");

        let table = CsvReader::new_tsv(file.path()).unwrap().read().unwrap();

        assert_eq!(table.headers, vec!["code", "term"]);
        assert_eq!(table.rows[0][1], "Code 1");
    }

    #[test]
    fn test_ragged_rows_allowed() {
        let file = create_test_file("a,b,c\n1,2\n1,2,3\n", ".csv");

        let table = CsvReader::new(file.path()).unwrap().read().unwrap();

        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.cell(0, 2), "");
    }

    #[test]
    fn test_missing_file() {
        let mut reader = CsvReader::new(Path::new("/nonexistent/measure.csv")).unwrap();
        assert!(reader.read().is_err());
    }
}
