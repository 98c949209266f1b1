//! Per-period clinical indicator rates with demographic breakdowns and
//! small-number suppression.

pub mod child_codes;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod practices;
pub mod privacy;
pub mod rates;
pub mod readers;
pub mod stats;
pub mod types;

pub use config::PipelineConfig;
pub use error::Error;
pub use pipeline::{Pipeline, PipelineSummary};
pub use types::{GroupValue, MeasureRow, MeasureTable, Result};
