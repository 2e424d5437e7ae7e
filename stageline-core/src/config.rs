//! Configuration for pipeline runs.
//!
//! Every value a pipeline consumes from the outside (test fraction, scaler
//! choice, model type, promotion stage, sweep values, ...) lives here.
//! Configuration is layered with figment:
//!
//! 1. Built-in defaults
//! 2. User config (`~/.config/stageline/config.toml`)
//! 3. Workspace config (`<workspace>/stageline.toml`)
//! 4. Explicit config file passed on the command line
//! 5. Environment variables (`STAGELINE_TRAINING__MODEL_TYPE=rf`, ...)

use crate::error::PipelineError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "stageline.toml";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Registry name under which trained model versions are recorded.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Where artifacts, the registry and run records are written.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Static dataset the loaders read from.
    #[serde(default)]
    pub source: DataSourceConfig,
    /// Feature engineering pipeline parameters.
    #[serde(default)]
    pub feature_engineering: FeatureEngineeringConfig,
    /// Training pipeline parameters.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Model promotion parameters.
    #[serde(default)]
    pub promotion: PromotionConfig,
    /// Inference pipeline parameters.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Scaler choice and neighbour sweep for the iris sweep pipeline.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            storage: StorageConfig::default(),
            source: DataSourceConfig::default(),
            feature_engineering: FeatureEngineeringConfig::default(),
            training: TrainingConfig::default(),
            promotion: PromotionConfig::default(),
            inference: InferenceConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

fn default_model_name() -> String {
    "iris_classifier".to_string()
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all persisted state.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Resolve a relative root against the workspace directory.
    pub fn resolve(&mut self, workspace: &Path) {
        if self.root.is_relative() {
            self.root = workspace.join(&self.root);
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".stageline")
}

/// Where raw rows come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSourceConfig {
    /// The Iris table compiled into the binary.
    Bundled,
    /// A CSV file on local disk.
    Csv {
        path: PathBuf,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default = "default_true")]
        has_header: bool,
        /// Rename columns to this fixed schema, in order.
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    /// A CSV document fetched over HTTP.
    Url {
        url: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default = "default_true")]
        has_header: bool,
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self::Bundled
    }
}

fn default_delimiter() -> char {
    ','
}

/// Feature engineering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngineeringConfig {
    /// Portion of rows held out for testing, exclusive (0, 1).
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    /// Drop rows containing null values.
    #[serde(default)]
    pub drop_na: bool,
    /// Min-max scale numeric feature columns.
    #[serde(default)]
    pub normalize: bool,
    /// Columns removed before training.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Name of the label column.
    #[serde(default = "default_target")]
    pub target: String,
    /// Seed for the inference-slice sampling in the loader.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Seed for the train/test shuffle.
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
}

impl Default for FeatureEngineeringConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            drop_na: false,
            normalize: false,
            drop_columns: Vec::new(),
            target: default_target(),
            random_state: default_random_state(),
            split_seed: default_split_seed(),
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_target() -> String {
    "target".to_string()
}

fn default_random_state() -> u64 {
    17
}

fn default_split_seed() -> u64 {
    42
}

/// Training parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// `sgd` or `rf`; validated by the trainer stage.
    #[serde(default = "default_model_type")]
    pub model_type: String,
    /// Seed for model fitting.
    #[serde(default = "default_training_seed")]
    pub seed: u64,
    /// Warn when train accuracy falls below this value.
    #[serde(default)]
    pub min_train_accuracy: f64,
    /// Warn when test accuracy falls below this value.
    #[serde(default)]
    pub min_test_accuracy: f64,
    #[serde(default)]
    pub sgd: SgdConfig,
    #[serde(default)]
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            seed: default_training_seed(),
            min_train_accuracy: 0.0,
            min_test_accuracy: 0.0,
            sgd: SgdConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

fn default_model_type() -> String {
    "sgd".to_string()
}

fn default_training_seed() -> u64 {
    42
}

/// Stochastic gradient descent classifier hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    /// L2 regularization strength.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Initial learning rate.
    #[serde(default = "default_eta0")]
    pub eta0: f64,
    /// Maximum number of passes over the training data.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Stop when the epoch loss improves by less than this.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Epochs without improvement before stopping.
    #[serde(default = "default_n_iter_no_change")]
    pub n_iter_no_change: usize,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            eta0: default_eta0(),
            max_iter: default_max_iter(),
            tol: default_tol(),
            n_iter_no_change: default_n_iter_no_change(),
        }
    }
}

fn default_alpha() -> f64 {
    1e-4
}

fn default_eta0() -> f64 {
    0.01
}

fn default_max_iter() -> usize {
    1000
}

fn default_tol() -> f64 {
    1e-3
}

fn default_n_iter_no_change() -> usize {
    5
}

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Unlimited when unset.
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
        }
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

/// Promotion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Stage label a promoted version is assigned to.
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Candidates below this accuracy are never promoted.
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            stage: default_stage(),
            min_accuracy: default_min_accuracy(),
        }
    }
}

fn default_stage() -> String {
    "production".to_string()
}

fn default_min_accuracy() -> f64 {
    0.8
}

/// Inference parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Must match the training run's loader seed to select the held-back slice.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Stage label of the version to serve.
    #[serde(default = "default_stage")]
    pub stage: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            random_state: default_random_state(),
            stage: default_stage(),
        }
    }
}

/// Iris sweep parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub standard_scaler: bool,
    #[serde(default = "default_true")]
    pub min_max_scaler: bool,
    /// One k-nearest-neighbour model is trained per value.
    #[serde(default = "default_neighbors")]
    pub neighbors: Vec<usize>,
    /// Hold-out fraction used inside each training branch.
    #[serde(default = "default_sweep_test_size")]
    pub test_size: f64,
    #[serde(default)]
    pub split_seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            standard_scaler: false,
            min_max_scaler: true,
            neighbors: default_neighbors(),
            test_size: default_sweep_test_size(),
            split_seed: 0,
        }
    }
}

fn default_neighbors() -> Vec<usize> {
    vec![3, 6, 9]
}

fn default_sweep_test_size() -> f64 {
    0.25
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Reject configurations that cannot produce a meaningful run.
    ///
    /// Runs before any stage executes so that flag conflicts never leave
    /// partial artifacts behind.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.model_name.trim().is_empty() {
            return Err(PipelineError::config("model_name must not be empty"));
        }
        check_fraction("feature_engineering.test_size", self.feature_engineering.test_size)?;
        check_fraction("sweep.test_size", self.sweep.test_size)?;

        let fe = &self.feature_engineering;
        if fe.target.trim().is_empty() {
            return Err(PipelineError::config("target must not be empty"));
        }
        if fe.drop_columns.iter().any(|c| c == &fe.target) {
            return Err(PipelineError::config(format!(
                "drop_columns must not contain the target column '{}'",
                fe.target
            )));
        }

        if !(0.0..=1.0).contains(&self.promotion.min_accuracy) {
            return Err(PipelineError::config(format!(
                "promotion.min_accuracy must be within [0, 1], got {}",
                self.promotion.min_accuracy
            )));
        }
        if self.promotion.stage.trim().is_empty() {
            return Err(PipelineError::config("promotion.stage must not be empty"));
        }

        self.sweep.scaler()?;
        if self.sweep.neighbors.is_empty() {
            return Err(PipelineError::config("sweep.neighbors must not be empty"));
        }
        if self.sweep.neighbors.contains(&0) {
            return Err(PipelineError::config("sweep.neighbors values must be >= 1"));
        }

        if self.training.forest.n_estimators == 0 {
            return Err(PipelineError::config("training.forest.n_estimators must be >= 1"));
        }
        if self.training.sgd.max_iter == 0 {
            return Err(PipelineError::config("training.sgd.max_iter must be >= 1"));
        }
        Ok(())
    }
}

impl SweepConfig {
    /// The scaler selected by the two mutually exclusive flags.
    pub fn scaler(&self) -> Result<crate::preprocess::ScalerKind, PipelineError> {
        use crate::preprocess::ScalerKind;
        match (self.standard_scaler, self.min_max_scaler) {
            (true, false) => Ok(ScalerKind::Standard),
            (false, true) => Ok(ScalerKind::MinMax),
            _ => Err(PipelineError::config(
                "exactly one of standard_scaler or min_max_scaler must be set",
            )),
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), PipelineError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "{name} must be within (0, 1) exclusive, got {value}"
        )))
    }
}

/// Load configuration with layered merging.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "stageline", "stageline") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("STAGELINE_").split("__"));

    figment.extract().map_err(Box::new)
}
