//! nlptest CLI: generate, run and report NLP model test suites.

mod commands;
mod http;

use clap::Parser;
use nlptest_core::types::Task;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// nlptest: robustness, bias, representation, accuracy and fairness tests
/// for NLP models
#[derive(Parser, Debug)]
#[command(name = "nlptest", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (settings are read from `.nlptest/settings.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Write default settings and test configuration into the workspace
    Init,
    /// Generate test cases from a dataset and save the run
    Generate {
        /// Dataset file (.csv, .tsv, .conll, .txt, .jsonl)
        #[arg(short, long)]
        data: PathBuf,
        /// Task of the model under test: ner or text-classification
        #[arg(short, long)]
        task: Task,
        /// Test configuration (YAML); the built-in suite when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory to save the run into
        #[arg(short, long)]
        out: PathBuf,
        /// Seed for randomized transforms
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate a saved run against a model endpoint
    Run {
        /// Saved run directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Prediction endpoint; falls back to `predictor.endpoint` in settings
        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Print the report of an evaluated run
    Report {
        /// Saved run directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write training data augmented for the failed tests of a run
    Augment {
        /// Saved run directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Training dataset to augment
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the augmented dataset
        #[arg(short, long)]
        output: PathBuf,
        /// Upper bound on the share of records augmented per test
        #[arg(long, default_value_t = 1.0)]
        proportion: f64,
    },
    /// List registered transforms
    Transforms {
        /// Only show transforms supporting this task
        #[arg(short, long)]
        task: Option<Task>,
    },
    /// Preview a perturbation on a single text
    Perturb {
        /// Transform name
        #[arg(short = 'n', long = "transform")]
        transform: String,
        /// Text to perturb
        text: String,
        /// Task the text belongs to; NER-only transforms need `ner`
        #[arg(short, long, default_value = "text-classification")]
        task: Task,
        /// Space-separated BIO tags of the text's tokens (NER)
        #[arg(long)]
        tags: Option<String>,
        /// Seed for randomized transforms
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "nlptest", "nlptest")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nlptest.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let passed = commands::handle_command(cli.command, &workspace).await?;
    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
