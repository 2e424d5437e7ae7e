//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, RegistryAction};
use stageline_core::PipelineExecutor;
use stageline_core::config::{PipelineConfig, WORKSPACE_CONFIG_FILE};
use stageline_core::pipelines::{self, TrainingInputs, feature_engineering, inference, iris_sweep, training};
use stageline_core::registry::ModelRegistry;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    mut config: PipelineConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    apply_overrides(&command, &mut config);
    match command {
        Commands::FeatureEngineering { .. } => handle_feature_engineering(&config).await,
        Commands::Train {
            train_dataset_id,
            test_dataset_id,
            ..
        } => {
            let inputs = TrainingInputs {
                train_dataset_id,
                test_dataset_id,
            };
            handle_train(&config, &inputs).await
        }
        Commands::Infer { .. } => handle_infer(&config).await,
        Commands::Sweep { .. } => handle_sweep(&config).await,
        Commands::Registry { action } => handle_registry(action, &config),
        Commands::Plan { pipeline } => {
            let plan = pipelines::plan_for(&pipeline, &config)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

/// Layer command-line flags over the loaded configuration.
fn apply_overrides(command: &Commands, config: &mut PipelineConfig) {
    match command {
        Commands::FeatureEngineering {
            test_size,
            drop_na,
            normalize,
            drop_columns,
            random_state,
        } => {
            let fe = &mut config.feature_engineering;
            if let Some(v) = test_size {
                fe.test_size = *v;
            }
            if let Some(v) = drop_na {
                fe.drop_na = *v;
            }
            if let Some(v) = normalize {
                fe.normalize = *v;
            }
            if let Some(v) = drop_columns {
                fe.drop_columns = v.clone();
            }
            if let Some(v) = random_state {
                fe.random_state = *v;
            }
        }
        Commands::Train {
            model_type: Some(v),
            ..
        } => config.training.model_type = v.clone(),
        Commands::Infer { stage: Some(v) } => config.inference.stage = v.clone(),
        Commands::Sweep {
            standard_scaler,
            min_max_scaler,
            neighbors,
        } => {
            // either flag replaces the configured pair
            if *standard_scaler || *min_max_scaler {
                config.sweep.standard_scaler = *standard_scaler;
                config.sweep.min_max_scaler = *min_max_scaler;
            }
            if let Some(v) = neighbors {
                config.sweep.neighbors = v.clone();
            }
        }
        _ => {}
    }
}

async fn handle_feature_engineering(config: &PipelineConfig) -> anyhow::Result<()> {
    let executor = PipelineExecutor::open(&config.storage)?;
    let output = feature_engineering::run(&executor, config).await?;

    println!("Run {} finished", output.record.run_id);
    for key in ["dataset_trn", "dataset_tst", "preprocess_pipeline"] {
        println!("  {key:<20} {}", output.artifact_id(key)?);
    }
    Ok(())
}

async fn handle_train(config: &PipelineConfig, inputs: &TrainingInputs) -> anyhow::Result<()> {
    let executor = PipelineExecutor::open(&config.storage)?;
    let output = training::run(&executor, config, inputs).await?;

    let accuracy = output.artifact("test_accuracy")?.clone().into_metric()?;
    let promoted = output.artifact("promoted")?.clone().into_flag()?;
    println!("Run {} finished", output.record.run_id);
    if let Some(version) = output.record.model_version {
        println!("  model:       {} v{version}", config.model_name);
    }
    println!("  type:        {}", config.training.model_type);
    println!("  accuracy:    {accuracy:.4}");
    if promoted {
        println!("  promoted to: {}", config.promotion.stage);
    } else {
        println!("  not promoted");
    }
    Ok(())
}

async fn handle_infer(config: &PipelineConfig) -> anyhow::Result<()> {
    let executor = PipelineExecutor::open(&config.storage)?;
    let output = inference::run(&executor, config).await?;

    let predictions = output.artifact("predictions")?.clone().into_predictions()?;
    println!(
        "Run {} predicted {} rows with the '{}' model",
        output.record.run_id,
        predictions.len(),
        config.inference.stage
    );
    for (i, label) in predictions.iter().enumerate() {
        println!("  {i:>4}  {label}");
    }
    Ok(())
}

async fn handle_sweep(config: &PipelineConfig) -> anyhow::Result<()> {
    let executor = PipelineExecutor::open(&config.storage)?;
    let output = iris_sweep::run(&executor, config).await?;

    println!("Run {} finished", output.record.run_id);
    for (i, n_neighbors) in config.sweep.neighbors.iter().enumerate() {
        let key = format!("model_{i}");
        let record = executor.store().record(output.artifact_id(&key)?)?;
        let accuracy = record
            .metric("test_accuracy")
            .map(|a| format!("{a:.4}"))
            .unwrap_or_else(|| "-".into());
        println!("  {key:<10} n_neighbors={n_neighbors:<4} accuracy={accuracy}");
    }
    Ok(())
}

fn handle_registry(action: RegistryAction, config: &PipelineConfig) -> anyhow::Result<()> {
    let registry = ModelRegistry::load(&config.storage.registry_path())?;
    match action {
        RegistryAction::List { model } => {
            let versions: Vec<_> = registry
                .versions
                .iter()
                .filter(|v| model.as_deref().is_none_or(|m| v.model_name == m))
                .collect();
            if versions.is_empty() {
                println!("No model versions registered.");
                return Ok(());
            }
            for v in versions {
                println!(
                    "{:<20} v{:<4} {:<12} {}  {}",
                    v.model_name,
                    v.version,
                    v.stage.as_deref().unwrap_or("-"),
                    v.created_at.format("%Y-%m-%d %H:%M:%S"),
                    v.id
                );
            }
        }
        RegistryAction::Show { id } => {
            let version = registry
                .find(&id)
                .ok_or_else(|| anyhow::anyhow!("Model version '{}' not found", id))?;
            println!("{}", serde_json::to_string_pretty(version)?);
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, config: &PipelineConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace.join(WORKSPACE_CONFIG_FILE);
            if path.exists() {
                println!("Config file already exists: {}", path.display());
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&path, toml_str)?;
            println!("Created config file: {}", path.display());
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{toml_str}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["stageline"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    fn test_config(dir: &TempDir) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.storage.root = dir.path().join("store");
        config
    }

    #[test]
    fn test_feature_engineering_overrides() {
        let command = parse(&[
            "feature-engineering",
            "--test-size",
            "0.3",
            "--normalize",
            "true",
            "--drop-columns",
            "sepal_width,petal_width",
        ]);
        let mut config = PipelineConfig::default();
        apply_overrides(&command, &mut config);

        let fe = &config.feature_engineering;
        assert_eq!(fe.test_size, 0.3);
        assert!(fe.normalize);
        assert!(!fe.drop_na);
        assert_eq!(fe.drop_columns, vec!["sepal_width", "petal_width"]);
        assert_eq!(fe.random_state, 17);
    }

    #[test]
    fn test_train_and_infer_overrides() {
        let mut config = PipelineConfig::default();
        apply_overrides(&parse(&["train", "--model-type", "rf"]), &mut config);
        assert_eq!(config.training.model_type, "rf");

        apply_overrides(&parse(&["infer", "--stage", "staging"]), &mut config);
        assert_eq!(config.inference.stage, "staging");

        // absent flags keep the configured values
        apply_overrides(&parse(&["train"]), &mut config);
        assert_eq!(config.training.model_type, "rf");
    }

    #[test]
    fn test_sweep_scaler_flag_replaces_configured_pair() {
        let mut config = PipelineConfig::default();
        assert!(config.sweep.min_max_scaler);

        apply_overrides(&parse(&["sweep", "--standard-scaler", "--neighbors", "2,4"]), &mut config);
        assert!(config.sweep.standard_scaler);
        assert!(!config.sweep.min_max_scaler);
        assert_eq!(config.sweep.neighbors, vec![2, 4]);

        let mut untouched = PipelineConfig::default();
        apply_overrides(&parse(&["sweep"]), &mut untouched);
        assert!(!untouched.sweep.standard_scaler);
        assert!(untouched.sweep.min_max_scaler);
    }

    #[tokio::test]
    async fn test_sweep_with_both_scalers_fails() {
        let dir = TempDir::new().unwrap();
        let command = parse(&["sweep", "--standard-scaler", "--min-max-scaler"]);
        let err = handle_command(command, test_config(&dir), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exactly one of standard_scaler or min_max_scaler"));
    }

    #[tokio::test]
    async fn test_sweep_command_runs() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let command = parse(&["sweep", "--standard-scaler", "--neighbors", "3,5"]);
        handle_command(command, config.clone(), dir.path()).await.unwrap();

        let executor = PipelineExecutor::open(&config.storage).unwrap();
        let names: Vec<_> = executor
            .store()
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .filter(|n| n.starts_with("model_"))
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, PipelineConfig::default(), workspace)
            .await
            .unwrap();

        let config_path = workspace.join(WORKSPACE_CONFIG_FILE);
        assert!(config_path.exists());

        // Verify it's valid TOML
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.model_name, "iris_classifier");
        assert_eq!(parsed.training.model_type, "sgd");
        assert_eq!(parsed.sweep.neighbors, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_path = workspace.join(WORKSPACE_CONFIG_FILE);
        std::fs::write(&config_path, "model_name = \"custom\"\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, PipelineConfig::default(), workspace)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content, "model_name = \"custom\"\n");
    }

    #[tokio::test]
    async fn test_config_show_and_workspace_file_load() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        std::fs::write(
            workspace.join(WORKSPACE_CONFIG_FILE),
            "[training]\nmodel_type = \"rf\"\n",
        )
        .unwrap();

        let config = stageline_core::load_config(Some(workspace), None).unwrap();
        assert_eq!(config.training.model_type, "rf");
        assert!(toml::to_string_pretty(&config).unwrap().contains("model_type = \"rf\""));

        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        handle_command(command, config, workspace).await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_list_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let command = parse(&["registry", "list"]);
        handle_command(command, test_config(&dir), dir.path())
            .await
            .unwrap();

        let missing = parse(&["registry", "show", "nope"]);
        assert!(
            handle_command(missing, test_config(&dir), dir.path())
                .await
                .is_err()
        );
    }
}
