use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::types::{DEFAULT_RATE_PER, DEFAULT_REDACTION_THRESHOLD, DEFAULT_TOP_CODES};

/// Disclosure-safe rate tables from monthly measure extracts
#[derive(Parser, Debug)]
#[command(name = "qof-measures")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every measure file in a directory
    Run {
        /// Directory holding measure_<id>.csv files
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (defaults to the input directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Small-number suppression threshold
        #[arg(long)]
        threshold: Option<u64>,

        /// Rate multiplier
        #[arg(long)]
        rate_per: Option<f64>,

        /// Number of child codes to report
        #[arg(long)]
        top_codes: Option<usize>,
    },

    /// Suppress small numbers in a single measure file
    Redact {
        /// Measure file
        #[arg(short, long)]
        input: PathBuf,

        /// Breakdown column
        #[arg(short, long)]
        group: String,

        #[arg(long, default_value = "event")]
        numerator: String,

        #[arg(long, default_value = "population")]
        denominator: String,

        #[arg(short = 'k', long, default_value_t = DEFAULT_REDACTION_THRESHOLD)]
        threshold: u64,

        #[arg(long, default_value_t = DEFAULT_RATE_PER)]
        rate_per: f64,

        /// Output CSV path (stdout if not specified)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Summarise the most frequent child codes of an event-code measure
    ChildCodes {
        /// Event-code measure file
        #[arg(short, long)]
        input: PathBuf,

        /// Codelist file
        #[arg(long)]
        codelist: PathBuf,

        #[arg(long, default_value = "code")]
        code_column: String,

        #[arg(long, default_value = "term")]
        term_column: String,

        #[arg(long, default_value = "event")]
        numerator: String,

        #[arg(long, default_value = "population")]
        denominator: String,

        /// Number of codes to report
        #[arg(long, default_value_t = DEFAULT_TOP_CODES)]
        top: usize,

        /// Output CSV path (JSON to stdout if not specified)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
