//! Stageline CLI: run the feature engineering, training, inference and
//! sweep pipelines from the terminal.

mod commands;

use clap::{ArgAction, Parser};
use stageline_core::config::PipelineConfig;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Stageline - staged ML pipelines with a model registry.
#[derive(Parser, Debug)]
#[command(name = "stageline", version, about, long_about = None)]
pub struct Cli {
    /// Workspace directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Load, split and preprocess the source dataset
    FeatureEngineering {
        /// Fraction of rows held out for evaluation
        #[arg(long)]
        test_size: Option<f64>,
        /// Drop rows with missing values
        #[arg(long)]
        drop_na: Option<bool>,
        /// Min-max scale the feature columns
        #[arg(long)]
        normalize: Option<bool>,
        /// Columns to drop before training (comma-separated)
        #[arg(long, value_delimiter = ',')]
        drop_columns: Option<Vec<String>>,
        /// Seed for the inference hold-out
        #[arg(long)]
        random_state: Option<u64>,
    },
    /// Train, evaluate and conditionally promote a model
    Train {
        /// Model type: sgd or rf
        #[arg(long)]
        model_type: Option<String>,
        /// Preprocessed train dataset artifact id
        #[arg(long)]
        train_dataset_id: Option<String>,
        /// Preprocessed test dataset artifact id
        #[arg(long)]
        test_dataset_id: Option<String>,
    },
    /// Predict the inference slice with the model at a stage
    Infer {
        /// Registry stage to read the model from
        #[arg(long)]
        stage: Option<String>,
    },
    /// Train one k-nearest-neighbour model per neighbour count
    Sweep {
        #[arg(long)]
        standard_scaler: bool,
        #[arg(long)]
        min_max_scaler: bool,
        /// Neighbour counts (comma-separated)
        #[arg(long, value_delimiter = ',')]
        neighbors: Option<Vec<usize>>,
    },
    /// Inspect the model registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Print the validated stage plan of a pipeline
    Plan {
        /// feature_engineering, training, inference or iris_sweep
        pipeline: String,
    },
    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum RegistryAction {
    /// List model versions
    List {
        /// Only versions of this model
        #[arg(long)]
        model: Option<String>,
    },
    /// Show one version with its linked artifacts
    Show {
        /// Version id
        id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration to the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config: PipelineConfig =
        stageline_core::load_config(Some(workspace.as_path()), cli.config.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.storage.resolve(&workspace);

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable logs on stderr, JSON lines in a daily rolling file.
    let log_dir = config.storage.logs_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "stageline.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));
    let json_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    tracing::debug!(workspace = %workspace.display(), "Loaded configuration");

    commands::handle_command(cli.command, config, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_train_overrides() {
        let cli = Cli::try_parse_from([
            "stageline",
            "-vv",
            "train",
            "--model-type",
            "rf",
            "--train-dataset-id",
            "a",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Train {
                model_type,
                train_dataset_id,
                test_dataset_id,
            } => {
                assert_eq!(model_type.as_deref(), Some("rf"));
                assert_eq!(train_dataset_id.as_deref(), Some("a"));
                assert!(test_dataset_id.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_sweep_neighbors() {
        let cli = Cli::try_parse_from([
            "stageline",
            "sweep",
            "--min-max-scaler",
            "--neighbors",
            "3,6,9",
        ])
        .unwrap();
        match cli.command {
            Commands::Sweep {
                standard_scaler,
                min_max_scaler,
                neighbors,
            } => {
                assert!(!standard_scaler);
                assert!(min_max_scaler);
                assert_eq!(neighbors, Some(vec![3, 6, 9]));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["stageline"]).is_err());
    }
}
