mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::allocate::AllocateArgs;
use commands::frontier::EfficientFrontierArgs;
use commands::matching::MatchRiskArgs;
use commands::sample::SampleArgs;

/// Efficient-frontier asset allocation
#[derive(Parser)]
#[command(
    name = "frontier",
    version,
    about = "Efficient-frontier asset allocation",
    long_about = "Samples random long-only portfolios from a daily return history, \
                  traces the minimum-volatility efficient frontier and maps an \
                  investor's 0-100 risk tolerance onto it."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log filter (e.g. "debug", "frontier_core=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: sampling, frontier and risk matching
    Allocate(AllocateArgs),
    /// Sample random portfolios and report the named selections
    Sample(SampleArgs),
    /// Solve the efficient frontier for a set of target returns
    EfficientFrontier(EfficientFrontierArgs),
    /// Match a risk-tolerance score against a solved frontier
    MatchRisk(MatchRiskArgs),
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

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Sample(args) => commands::sample::run_sample(args),
        Commands::EfficientFrontier(args) => commands::frontier::run_efficient_frontier(args),
        Commands::MatchRisk(args) => commands::matching::run_match_risk(args),
        Commands::Version => {
            println!("frontier {}", env!("CARGO_PKG_VERSION"));
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
