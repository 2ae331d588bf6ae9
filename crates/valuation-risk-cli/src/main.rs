mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::football_field::{FootballFieldArgs, SummaryArgs};
use commands::sensitivity::{DataTableArgs, SensitivityArgs};
use commands::simulation::SimulateArgs;

/// Valuation uncertainty analysis
#[derive(Parser)]
#[command(
    name = "vrisk",
    version,
    about = "Valuation uncertainty analysis",
    long_about = "Quantifies the uncertainty around a base-case valuation: Monte Carlo \
                  simulation of the key drivers, tornado sensitivity ranking, a WACC x \
                  terminal growth data table and a football-field summary with a rating."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Monte Carlo simulation of share price, EV and equity value
    Simulate(SimulateArgs),
    /// Rank valuation drivers by their EV swing (tornado chart)
    Sensitivity(SensitivityArgs),
    /// Build the WACC x terminal growth enterprise value table
    DataTable(DataTableArgs),
    /// Merge valuation methods into a football field with a rating
    FootballField(FootballFieldArgs),
    /// Simulate, build the football field and print a Markdown summary
    Summary(SummaryArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args),
        Commands::DataTable(args) => commands::sensitivity::run_data_table(args),
        Commands::FootballField(args) => commands::football_field::run_football_field(args),
        Commands::Summary(args) => match commands::football_field::run_summary(args) {
            Ok(text) => {
                print!("{}", text);
                return;
            }
            Err(e) => Err(e),
        },
        Commands::Version => {
            println!("vrisk {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
