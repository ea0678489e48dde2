#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the trauma-desert analysis.
//!
//! `run` loads the four input files, runs every stage of the pipeline and
//! writes the output tables. `show-config` prints the embedded default
//! configuration as a starting point for a custom one, and `check-config`
//! validates a configuration file without running anything.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trauma_desert_pipeline::{
    AnalysisConfig, AnalysisInputs, AnalysisOutput, CheckStatus, DEFAULT_CONFIG, InputPaths, run,
    write_tables,
};

/// Classify area units by violence burden and trauma care access.
#[derive(Parser)]
#[command(name = "trauma_desert")]
#[command(about = "Classify area units by violence burden and trauma care access")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write every output table.
    Run {
        /// `GeoJSON` area unit boundaries.
        #[arg(long)]
        boundaries: PathBuf,

        /// Demographic CSV keyed by `GEOID`.
        #[arg(long)]
        demographics: PathBuf,

        /// Incident CSV.
        #[arg(long)]
        incidents: PathBuf,

        /// `GeoJSON` drive-time isochrones.
        #[arg(long)]
        isochrones: PathBuf,

        /// Analysis configuration (TOML). Defaults to the embedded one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the output tables.
        #[arg(long, default_value = "data/output")]
        output_dir: PathBuf,
    },

    /// Print the embedded default configuration.
    ShowConfig,

    /// Validate a configuration file.
    CheckConfig {
        /// Configuration file to check.
        path: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::embedded()?,
    })
}

/// Prints the headline numbers of a finished run.
fn print_summary(output: &AnalysisOutput, config: &AnalysisConfig) {
    let assignment = &output.assignment;

    println!("=== Trauma Desert Analysis ===");
    println!();
    println!(
        "Incidents:        {} assigned of {} ({} invalid, {} outside envelope, {} unassigned)",
        assignment.assigned,
        assignment.total,
        assignment.invalid,
        assignment.outside_envelope,
        assignment.unassigned
    );
    println!("Observation:      {:.2} years", output.period.years());
    println!("Area units:       {}", output.classified.len());
    println!(
        "Highest priority: {} units",
        output.priority_ranking.len()
    );
    println!(
        "Golden hour:      {:.1}% of incidents within {} minutes",
        output.golden_hour_share * 100.0,
        config.golden_hour_minutes
    );
    for row in &output.access_by_race {
        println!(
            "  {:<10} {:>6} incidents, {:5.1}% within {} min, mean {:.1} min",
            row.race.as_ref(),
            row.incidents,
            row.pct_within_golden_hour,
            config.golden_hour_minutes,
            row.mean_minutes
        );
    }
    if let Some(overall) = &output.trends.overall {
        let change = overall
            .pct_change
            .map_or_else(|| "-".to_string(), |pct| format!("{pct:+.1}%"));
        println!(
            "Trend:            {change} from {} to {} (peak {} with {})",
            overall.first_year, overall.last_year, overall.peak_year, overall.peak_incidents
        );
        println!(
            "Hotspots:         {} emerging, {} improving",
            output.trends.emerging().count(),
            output.trends.improving().count()
        );
    }

    println!();
    println!("Comparisons (alpha = {}):", config.significance);
    for summary in &output.disparity.summaries {
        let p = summary
            .p_value
            .map_or_else(|| "-".to_string(), |p| format!("{p:.4}"));
        let marker = if summary.p_value.is_some_and(|p| p < config.significance) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {:<45} p = {p}", summary.comparison_name);
    }
    for skipped in &output.disparity.skipped {
        println!("  - {:<45} skipped: {}", skipped.comparison_name, skipped.reason);
    }

    println!();
    println!("Validation:");
    for check in &output.validation.checks {
        println!("  [{}] {}: {}", check.status, check.check, check.detail);
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            boundaries,
            demographics,
            incidents,
            isochrones,
            config,
            output_dir,
        } => {
            let config = load_config(config.as_ref())?;
            let inputs = AnalysisInputs::load(&InputPaths {
                boundaries,
                demographics,
                incidents,
                isochrones,
            })?;

            let output = run(&inputs, &config)?;
            let written = write_tables(&output_dir, &output)?;
            print_summary(&output, &config);

            println!();
            println!("Wrote {} tables to {}", written.len(), output_dir.display());

            if output.validation.has_failures() {
                log::error!(
                    "{} validation checks failed",
                    output.validation.count(CheckStatus::Fail)
                );
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::ShowConfig => print!("{DEFAULT_CONFIG}"),
        Commands::CheckConfig { path } => {
            let config = AnalysisConfig::from_file(&path)?;
            println!(
                "{} is valid (golden hour {} min, topology {})",
                path.display(),
                config.golden_hour_minutes,
                config.topology
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
