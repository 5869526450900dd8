//! modelvault CLI: drive the local model registry from pipeline scripts.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// modelvault: version trained models and keep the best one ready for serving
#[derive(Parser, Debug)]
#[command(name = "modelvault", version, about, long_about = None)]
struct Cli {
    /// Project directory (the nearest project root above it is used)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create the registry folders and a default configuration file
    Init,
    /// Save a model and its metrics as a new version
    Save {
        /// JSON document holding the serialized model
        #[arg(long)]
        model: PathBuf,
        /// JSON object mapping metric names to numbers
        #[arg(long)]
        metrics: PathBuf,
        /// Run id to save under (defaults to the current UTC second)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Save a candidate and promote it if it beats the current best model
    Promote {
        /// JSON document holding the serialized model
        #[arg(long)]
        model: PathBuf,
        /// JSON object mapping metric names to numbers
        #[arg(long)]
        metrics: PathBuf,
        /// Metric used for the comparison (defaults to registry.metric_key)
        #[arg(long)]
        metric_key: Option<String>,
        /// Run id to save under (defaults to the current UTC second)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// List saved versions
    Versions,
    /// Show the current best model
    Best,
    /// Write the best model document to a file or stdout
    LoadBest {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Mirror the best model folder into a local blob store directory
    Push {
        /// Blob store root directory
        #[arg(long)]
        dest: PathBuf,
        /// Key prefix for uploaded files
        #[arg(long, default_value = "best")]
        prefix: String,
    },
    /// Validate object-storage credentials
    Credentials {
        /// Env file with the credentials (defaults to storage.env_file)
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
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

    let log_dir = directories::ProjectDirs::from("dev", "modelvault", "modelvault")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "modelvault.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = modelvault_core::resolve_project_root(&cli.workspace);
    tracing::debug!(workspace = %workspace.display(), "Resolved project root");

    commands::handle_command(cli.command, &workspace)
}
