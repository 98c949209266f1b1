use std::io::BufWriter;

use clap::Parser;
use tracing::{error, info};

use qof_measures::child_codes::summarise_child_codes;
use qof_measures::cli::{Cli, Commands};
use qof_measures::config::PipelineConfig;
use qof_measures::logging::{init_logging, LogConfig};
use qof_measures::output;
use qof_measures::pipeline::Pipeline;
use qof_measures::privacy::redact_small_numbers;
use qof_measures::rates::calculate_rate;
use qof_measures::readers::{load_codelist, load_measure_table, MeasureColumns};
use qof_measures::types::Result;

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_log_file(cli.log_file.clone());
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    if let Err(e) = run(cli.command) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            input,
            output,
            config,
            threshold,
            rate_per,
            top_codes,
        } => {
            let mut pipeline_config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(threshold) = threshold {
                pipeline_config = pipeline_config.with_threshold(threshold)?;
            }
            if let Some(rate_per) = rate_per {
                pipeline_config = pipeline_config.with_rate_per(rate_per)?;
            }
            if let Some(top_codes) = top_codes {
                pipeline_config = pipeline_config.with_top_codes(top_codes)?;
            }

            let output_dir = output.unwrap_or_else(|| input.clone());
            let summary = Pipeline::new(pipeline_config, &input, &output_dir)?.run()?;
            eprintln!(
                "Wrote {} rate tables to: {}",
                summary.measures.len(),
                output_dir.display()
            );
        }
        Commands::Redact {
            input,
            group,
            numerator,
            denominator,
            threshold,
            rate_per,
            out,
        } => {
            let columns = MeasureColumns::new(&group, &numerator, &denominator);
            let table = calculate_rate(&load_measure_table(&input, &columns)?, rate_per);
            let (redacted, report) = redact_small_numbers(&table, threshold);
            info!(cells = report.cells_redacted(), "redaction complete");

            match out {
                Some(path) => {
                    output::write_measure_csv(&redacted, &path)?;
                    eprintln!("Redacted table written to: {}", path.display());
                }
                None => {
                    let stdout = std::io::stdout();
                    output::write_measure_table(&redacted, BufWriter::new(stdout.lock()))?;
                }
            }
        }
        Commands::ChildCodes {
            input,
            codelist,
            code_column,
            term_column,
            numerator,
            denominator,
            top,
            out,
        } => {
            let columns = MeasureColumns::new("event_code", &numerator, &denominator);
            let table = load_measure_table(&input, &columns)?;
            let codelist = load_codelist(&codelist, &code_column, &term_column)?;
            let rows = summarise_child_codes(&table, &codelist, top)?;

            match out {
                Some(path) => {
                    output::write_child_code_csv(&rows, &path)?;
                    eprintln!("Child code table written to: {}", path.display());
                }
                None => output::write_json_stdout(&rows)?,
            }
        }
    }

    Ok(())
}
