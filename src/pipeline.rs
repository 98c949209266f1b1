//! End-to-end run over a directory of measure extracts.
//!
//! Each measure goes through the same stages: load, sort by period, clip to
//! the study window, drop missing groups, recode, compute rates, suppress
//! small numbers, write. Breakdown-specific steps are chosen by
//! [`Breakdown`].

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::child_codes::summarise_child_codes;
use crate::config::PipelineConfig;
use crate::output::{rate_table_file_name, write_child_code_csv, write_json_file, write_measure_csv};
use crate::practices::{count_practices, drop_irrelevant_practices, practice_coverage};
use crate::privacy::{redact_small_numbers, CategoryRecoder, RedactionReport};
use crate::rates::{calculate_rate, period_totals};
use crate::readers::measures::practice_count_files;
use crate::readers::{
    discover_measure_files, load_codelist, load_measure_table, load_registered_practices,
    MeasureColumns,
};
use crate::types::{MeasureTable, Result, Warning, TOTAL_GROUP_COLUMN};

pub const CHILD_CODE_FILE: &str = "child_code_table.csv";
pub const SUMMARY_FILE: &str = "pipeline_summary.json";

/// What a measure is broken down by, and so which stages it gets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Breakdown {
    Practice,
    EventCode,
    Imd,
    Ethnicity,
    CareHomeStatus,
    LearningDisability,
    Other(String),
}

impl Breakdown {
    pub fn from_column(column: &str) -> Self {
        match column {
            "practice" => Breakdown::Practice,
            "event_code" => Breakdown::EventCode,
            "imd" => Breakdown::Imd,
            "ethnicity" => Breakdown::Ethnicity,
            "care_home_status" => Breakdown::CareHomeStatus,
            "learning_disability" => Breakdown::LearningDisability,
            other => Breakdown::Other(other.to_string()),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Breakdown::Practice => "practice",
            Breakdown::EventCode => "event_code",
            Breakdown::Imd => "imd",
            Breakdown::Ethnicity => "ethnicity",
            Breakdown::CareHomeStatus => "care_home_status",
            Breakdown::LearningDisability => "learning_disability",
            Breakdown::Other(column) => column,
        }
    }

    /// Measure id, as in `measure_<id>.csv`
    pub fn measure_id(&self) -> String {
        format!("{}_rate", self.column())
    }

    /// Recoding applied before rates are computed
    fn pre_rate_recoder(&self) -> Option<CategoryRecoder> {
        match self {
            Breakdown::Ethnicity => Some(CategoryRecoder::Ethnicity),
            _ => None,
        }
    }

    /// Recoding applied to the rated table
    fn post_rate_recoder(&self, config: &PipelineConfig) -> Option<CategoryRecoder> {
        match self {
            Breakdown::Imd => Some(CategoryRecoder::ImdQuantiles {
                labels: config.imd_labels,
            }),
            Breakdown::CareHomeStatus => Some(CategoryRecoder::care_home_status()),
            Breakdown::LearningDisability => Some(CategoryRecoder::learning_disability()),
            _ => None,
        }
    }

    fn is_redacted(&self, config: &PipelineConfig) -> bool {
        *self == Breakdown::Imd || config.redacted_breakdowns.iter().any(|b| b == self.column())
    }
}

/// A measure after every in-memory stage
#[derive(Debug, Clone)]
pub struct ProcessedMeasure {
    pub table: MeasureTable,
    /// Population totals per period; practice measure only
    pub totals: Option<MeasureTable>,
    pub redaction: Option<RedactionReport>,
    pub warnings: Vec<Warning>,
}

/// Counts-only view of a redaction pass, safe to publish
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactionSummary {
    pub threshold: u64,
    pub numerator_cells: usize,
    pub denominator_cells: usize,
    pub rates_redacted: usize,
}

impl From<&RedactionReport> for RedactionSummary {
    fn from(report: &RedactionReport) -> Self {
        Self {
            threshold: report.threshold,
            numerator_cells: report.numerator.cells.len(),
            denominator_cells: report.denominator.cells.len(),
            rates_redacted: report.rates_redacted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFile {
    pub file_name: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureSummary {
    pub id: String,
    pub group_column: String,
    pub rows_read: usize,
    pub rows_written: usize,
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction: Option<RedactionSummary>,
}

/// Written next to the rate tables as `pipeline_summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub inputs: Vec<InputFile>,
    pub measures: Vec<MeasureSummary>,
    /// Measures whose input file was not found
    pub skipped: Vec<String>,
    pub practice_count: Option<usize>,
    /// Percentage of registered practices with at least one event
    pub practice_coverage: Option<f64>,
    pub child_codes: Option<usize>,
    pub markers: Vec<NaiveDate>,
    pub warnings: Vec<Warning>,
}

impl PipelineSummary {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            config: config.clone(),
            inputs: Vec::new(),
            measures: Vec::new(),
            skipped: Vec::new(),
            practice_count: None,
            practice_coverage: None,
            child_codes: None,
            markers: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Run every in-memory stage for one measure.
///
/// `table` must already be restricted to its group column; loading is left
/// to the caller so this can be driven from tests or other front ends.
pub fn process_measure(
    breakdown: &Breakdown,
    table: MeasureTable,
    config: &PipelineConfig,
) -> Result<ProcessedMeasure> {
    let mut warnings = Vec::new();

    let mut table = table
        .sorted_by_period()
        .within_window(config.start_date, config.end_date)
        .drop_missing_groups();

    if let Some(recoder) = breakdown.pre_rate_recoder() {
        let recoded = recoder.apply(&table)?;
        warnings.extend(recoded.warnings);
        table = recoded.table;
    }

    table = calculate_rate(&table, config.rate_per);

    if let Some(recoder) = breakdown.post_rate_recoder(config) {
        let recoded = recoder.apply(&table)?;
        warnings.extend(recoded.warnings);
        table = recoded.table;
    }

    let mut redaction = None;
    if breakdown.is_redacted(config) {
        let (redacted, report) = redact_small_numbers(&table, config.redaction_threshold);
        table = redacted;
        redaction = Some(report);
    }

    let mut totals = None;
    if *breakdown == Breakdown::Practice {
        table = drop_irrelevant_practices(&table);
        totals = Some(period_totals(&table, config.rate_per));
    }

    Ok(ProcessedMeasure {
        table,
        totals,
        redaction,
        warnings,
    })
}

/// Streaming SHA-256 of a file, as lowercase hex
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn input_file(path: &Path) -> Result<InputFile> {
    Ok(InputFile {
        file_name: path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string(),
        sha256: compute_file_hash(path)?,
    })
}

/// Rate tables for every configured measure found in an input directory
pub struct Pipeline {
    config: PipelineConfig,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, input_dir: &Path, output_dir: &Path) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Practice and event-code measures first, then one per demographic
    pub fn breakdowns(&self) -> Vec<Breakdown> {
        let mut breakdowns = vec![Breakdown::EventCode, Breakdown::Practice];
        breakdowns.extend(self.config.demographics.iter().map(|d| Breakdown::from_column(d)));
        breakdowns
    }

    fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Process every measure, write outputs and the run summary
    pub fn run(&self) -> Result<PipelineSummary> {
        fs::create_dir_all(&self.output_dir)?;
        let mut summary = PipelineSummary::new(&self.config);

        info!(
            input = %self.input_dir.display(),
            output = %self.output_dir.display(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            "starting pipeline"
        );

        let (markers, marker_warnings) = self.config.marker_dates();
        summary.markers = markers;
        summary.warnings.extend(marker_warnings);

        let available = discover_measure_files(&self.input_dir)?;
        let breakdowns = self.breakdowns();

        let configured: HashSet<String> = breakdowns.iter().map(Breakdown::measure_id).collect();
        for id in available.keys().filter(|id| !configured.contains(*id)) {
            debug!(measure = %id, "measure not configured, ignoring");
        }

        for breakdown in &breakdowns {
            let Some(path) = available.get(&breakdown.measure_id()) else {
                warn!(measure = %breakdown.measure_id(), "measure file not found, skipping");
                summary.skipped.push(breakdown.measure_id());
                continue;
            };
            summary.inputs.push(input_file(path)?);
            let measure = self.run_measure(breakdown, path, &mut summary)?;
            summary.measures.push(measure);
        }

        let summary_path = self.output_path(SUMMARY_FILE);
        write_json_file(&summary, &summary_path)?;
        info!(
            measures = summary.measures.len(),
            skipped = summary.skipped.len(),
            warnings = summary.warnings.len(),
            summary = %summary_path.display(),
            "pipeline finished"
        );

        Ok(summary)
    }

    fn run_measure(
        &self,
        breakdown: &Breakdown,
        path: &Path,
        summary: &mut PipelineSummary,
    ) -> Result<MeasureSummary> {
        let columns = MeasureColumns::new(
            breakdown.column(),
            &self.config.numerator,
            &self.config.denominator,
        );
        let table = load_measure_table(path, &columns)?;
        let rows_read = table.len();

        info!(measure = %breakdown.measure_id(), rows = rows_read, "processing measure");
        let processed = process_measure(breakdown, table, &self.config)?;

        for warning in &processed.warnings {
            warn!(measure = %breakdown.measure_id(), "{}", warning);
        }
        summary.warnings.extend(processed.warnings.iter().cloned());

        let file_name = rate_table_file_name(breakdown.column());
        write_measure_csv(&processed.table, &self.output_path(&file_name))?;
        let mut outputs = vec![file_name];

        if let Some(totals) = &processed.totals {
            let totals_name = rate_table_file_name(TOTAL_GROUP_COLUMN);
            write_measure_csv(totals, &self.output_path(&totals_name))?;
            outputs.push(totals_name);
        }

        match breakdown {
            Breakdown::Practice => self.record_practices(&processed.table, summary)?,
            Breakdown::EventCode => {
                if let Some(written) = self.write_child_codes(&processed.table, summary)? {
                    outputs.push(written);
                }
            }
            _ => {}
        }

        debug!(
            measure = %breakdown.measure_id(),
            rows = processed.table.len(),
            "wrote rate table"
        );

        Ok(MeasureSummary {
            id: breakdown.measure_id(),
            group_column: breakdown.column().to_string(),
            rows_read,
            rows_written: processed.table.len(),
            outputs,
            redaction: processed.redaction.as_ref().map(RedactionSummary::from),
        })
    }

    fn record_practices(&self, table: &MeasureTable, summary: &mut PipelineSummary) -> Result<()> {
        summary.practice_count = Some(count_practices(table));

        let files = practice_count_files(&self.input_dir)?;
        if files.is_empty() {
            debug!("no practice count files, skipping coverage");
            return Ok(());
        }
        for path in &files {
            summary.inputs.push(input_file(path)?);
        }

        let registered: HashSet<String> = load_registered_practices(&self.input_dir)?;
        summary.practice_coverage = practice_coverage(table, &registered);
        info!(
            practices = summary.practice_count.unwrap_or(0),
            registered = registered.len(),
            "computed practice coverage"
        );
        Ok(())
    }

    fn write_child_codes(
        &self,
        table: &MeasureTable,
        summary: &mut PipelineSummary,
    ) -> Result<Option<String>> {
        let Some(codelist_path) = &self.config.codelist else {
            debug!("no codelist configured, skipping child code table");
            return Ok(None);
        };
        if !codelist_path.is_file() {
            warn!(codelist = %codelist_path.display(), "codelist not found, skipping child code table");
            return Ok(None);
        }

        summary.inputs.push(input_file(codelist_path)?);
        let codelist = load_codelist(
            codelist_path,
            &self.config.code_column,
            &self.config.term_column,
        )?;
        let rows = summarise_child_codes(table, &codelist, self.config.top_codes)?;
        write_child_code_csv(&rows, &self.output_path(CHILD_CODE_FILE))?;
        summary.child_codes = Some(rows.len());

        Ok(Some(CHILD_CODE_FILE.to_string()))
    }
}
