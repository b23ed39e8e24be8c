//! Obesity Risk CLI
//!
//! A command-line tool for requesting predictions and monitoring reports,
//! checking service health, and fetching datasets.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{dataset, monitor, predict, status};

/// Obesity Risk CLI
#[derive(Parser)]
#[command(name = "riskctl")]
#[command(author, version, about = "CLI for the Obesity Risk prediction service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via RISK_API_URL env var)
    #[arg(long, env = "RISK_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify subjects from a JSON or CSV file
    Predict {
        /// Input file (`.json` object or array, `.csv` with header, or `-` for JSON on stdin)
        input: String,
    },

    /// Show code and model versions
    Version,

    /// Build a monitoring report
    Monitor {
        /// Report to build
        #[arg(value_enum)]
        report: monitor::ReportKind,

        /// Number of current rows to compare against the reference
        #[arg(long, short)]
        window_size: Option<usize>,

        /// Also save the raw report JSON to this file
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Show service health and readiness
    Health,

    /// Dataset commands
    #[command(subcommand)]
    Dataset(DatasetCommands),
}

#[derive(Subcommand)]
pub enum DatasetCommands {
    /// Download a dataset file over HTTP
    Fetch {
        /// Source URL
        url: String,

        /// Output file path
        #[arg(long, short)]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.format(cli.format);
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    let result = match cli.command {
        Commands::Predict { input } => predict::predict(&client, &input, format).await,
        Commands::Version => status::show_version(&client, format).await,
        Commands::Monitor {
            report,
            window_size,
            output,
        } => monitor::monitor(&client, report, window_size, output, format).await,
        Commands::Health => status::show_health(&client, format).await,
        Commands::Dataset(DatasetCommands::Fetch { url, output }) => {
            dataset::fetch(&client, &url, &output).await
        }
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
