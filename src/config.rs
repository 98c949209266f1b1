use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::inference::parse_date;
use crate::privacy::ImdLabelStyle;
use crate::types::{
    Result, Warning, DEFAULT_RATE_PER, DEFAULT_REDACTION_THRESHOLD, DEFAULT_TOP_CODES,
};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// First month of the study window (inclusive)
    pub start_date: NaiveDate,

    /// Last month of the study window (inclusive)
    pub end_date: NaiveDate,

    /// Numerator column of every measure file
    pub numerator: String,

    /// Denominator column of every measure file
    pub denominator: String,

    /// Rate multiplier, e.g. 1000 for "per 1000 patients"
    pub rate_per: f64,

    /// Counts at or below this value are suppressed
    pub redaction_threshold: u64,

    /// Number of child codes reported
    pub top_codes: usize,

    /// Codelist used to describe event codes
    pub codelist: Option<PathBuf>,

    pub code_column: String,
    pub term_column: String,

    /// Demographic breakdowns, each read from `measure_<name>_rate.csv`
    pub demographics: Vec<String>,

    /// Breakdowns whose counts are suppressed before writing
    pub redacted_breakdowns: Vec<String>,

    pub imd_labels: ImdLabelStyle,

    /// Dates of interest carried into the run summary
    pub markers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2019, 3, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap_or_default(),
            numerator: "event".to_string(),
            denominator: "population".to_string(),
            rate_per: DEFAULT_RATE_PER,
            redaction_threshold: DEFAULT_REDACTION_THRESHOLD,
            top_codes: DEFAULT_TOP_CODES,
            codelist: None,
            code_column: "code".to_string(),
            term_column: "term".to_string(),
            demographics: [
                "age_band",
                "sex",
                "region",
                "imd",
                "ethnicity",
                "care_home_status",
                "learning_disability",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            redacted_breakdowns: vec!["imd".to_string()],
            imd_labels: ImdLabelStyle::default(),
            markers: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file; absent fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: u64) -> Result<Self> {
        self.redaction_threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn with_rate_per(mut self, rate_per: f64) -> Result<Self> {
        self.rate_per = rate_per;
        self.validate()?;
        Ok(self)
    }

    pub fn with_top_codes(mut self, top_codes: usize) -> Result<Self> {
        self.top_codes = top_codes;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(Error::InvalidConfig(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if !self.rate_per.is_finite() || self.rate_per <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "rate_per must be a positive number, got {}",
                self.rate_per
            )));
        }
        if self.top_codes == 0 {
            return Err(Error::InvalidConfig("top_codes must be at least 1".to_string()));
        }

        let columns = [
            ("numerator", &self.numerator),
            ("denominator", &self.denominator),
            ("code_column", &self.code_column),
            ("term_column", &self.term_column),
        ];
        for (field, value) in columns {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", field)));
            }
        }
        if self.numerator == self.denominator {
            return Err(Error::InvalidConfig(
                "numerator and denominator must be different columns".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for demographic in &self.demographics {
            if demographic.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "demographic names must not be empty".to_string(),
                ));
            }
            if !seen.insert(demographic.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "demographic '{}' listed more than once",
                    demographic
                )));
            }
        }

        Ok(())
    }

    /// Marker dates inside the study window. Unusable markers are skipped
    /// with a warning.
    pub fn marker_dates(&self) -> (Vec<NaiveDate>, Vec<Warning>) {
        let mut dates = Vec::new();
        let mut warnings = Vec::new();

        for marker in &self.markers {
            let reason = match parse_date(marker) {
                Some(date) if date >= self.start_date && date <= self.end_date => {
                    dates.push(date);
                    continue;
                }
                Some(_) => format!(
                    "outside the study window {} to {}",
                    self.start_date, self.end_date
                ),
                None => "not a recognised date".to_string(),
            };

            let warning = Warning::DateParse {
                value: marker.clone(),
                reason,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        (dates, warnings)
    }
}
