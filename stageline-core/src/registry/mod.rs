//! Model registry: numbered versions per model name, each with linked
//! artifacts and an optional stage label such as `production`.

pub mod promoter;

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub use promoter::{PromotionDecision, decide_promotion};

/// One version of a named model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    pub model_name: String,
    /// Starts at 1 and increases per model name.
    pub version: u32,
    /// Run that created this version.
    pub run_id: String,
    /// Pipeline artifact key to artifact id.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_at: Option<DateTime<Utc>>,
}

/// Registry of all model versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRegistry {
    pub versions: Vec<ModelVersion>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// Load registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        Ok(crate::persistence::load_json(path)?.unwrap_or_default())
    }

    /// Save registry to a JSON file (atomic write).
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        crate::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    /// Add the next version of `model_name`.
    pub fn create_version(&mut self, model_name: &str, run_id: &str) -> ModelVersion {
        let version = self
            .versions
            .iter()
            .filter(|v| v.model_name == model_name)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;
        let entry = ModelVersion {
            id: uuid::Uuid::new_v4().to_string(),
            model_name: model_name.to_string(),
            version,
            run_id: run_id.to_string(),
            artifacts: BTreeMap::new(),
            stage: None,
            created_at: Utc::now(),
            staged_at: None,
        };
        self.versions.push(entry.clone());
        entry
    }

    pub fn find(&self, id: &str) -> Option<&ModelVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut ModelVersion, PipelineError> {
        self.versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| PipelineError::not_found(format!("model version '{id}'")))
    }

    /// Versions of one model, oldest first.
    pub fn versions_of(&self, model_name: &str) -> Vec<&ModelVersion> {
        self.versions
            .iter()
            .filter(|v| v.model_name == model_name)
            .collect()
    }

    /// The version of `model_name` currently holding `stage`.
    pub fn at_stage(&self, model_name: &str, stage: &str) -> Option<&ModelVersion> {
        self.versions
            .iter()
            .find(|v| v.model_name == model_name && v.stage.as_deref() == Some(stage))
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let len = self.versions.len();
        self.versions.retain(|v| v.id != id);
        self.versions.len() < len
    }

    pub fn link_artifact(&mut self, version_id: &str, key: &str, artifact_id: &str) -> Result<(), PipelineError> {
        self.find_mut(version_id)?
            .artifacts
            .insert(key.to_string(), artifact_id.to_string());
        Ok(())
    }

    /// Assign `stage` to a version. When another version of the same model
    /// already holds it, `force` moves the label; otherwise this fails.
    pub fn set_stage(&mut self, version_id: &str, stage: &str, force: bool) -> Result<(), PipelineError> {
        let model_name = self.find_mut(version_id)?.model_name.clone();
        let holder = self
            .at_stage(&model_name, stage)
            .filter(|v| v.id != version_id)
            .map(|v| v.id.clone());
        if let Some(holder) = holder {
            if !force {
                return Err(PipelineError::invalid_input(format!(
                    "stage '{stage}' of model '{model_name}' is held by version '{holder}'"
                )));
            }
            let previous = self.find_mut(&holder)?;
            previous.stage = None;
            previous.staged_at = None;
        }

        let target = self.find_mut(version_id)?;
        target.stage = Some(stage.to_string());
        target.staged_at = Some(Utc::now());
        info!(model = %model_name, version = target.version, stage, "Model version staged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_increase_per_model() {
        let mut reg = ModelRegistry::new();
        assert_eq!(reg.create_version("iris", "r1").version, 1);
        assert_eq!(reg.create_version("iris", "r2").version, 2);
        assert_eq!(reg.create_version("other", "r3").version, 1);
        assert_eq!(reg.versions_of("iris").len(), 2);
    }

    #[test]
    fn test_set_stage_moves_label_with_force() {
        let mut reg = ModelRegistry::new();
        let v1 = reg.create_version("iris", "r1");
        let v2 = reg.create_version("iris", "r2");

        reg.set_stage(&v1.id, "production", false).unwrap();
        assert_eq!(reg.at_stage("iris", "production").unwrap().id, v1.id);

        assert!(reg.set_stage(&v2.id, "production", false).is_err());
        reg.set_stage(&v2.id, "production", true).unwrap();
        assert_eq!(reg.at_stage("iris", "production").unwrap().id, v2.id);
        assert_eq!(reg.find(&v1.id).unwrap().stage, None);

        // restaging the holder is a no-op
        reg.set_stage(&v2.id, "production", false).unwrap();
        let staged = reg.versions.iter().filter(|v| v.stage.is_some()).count();
        assert_eq!(staged, 1);
    }

    #[test]
    fn test_link_artifact_and_unknown_version() {
        let mut reg = ModelRegistry::new();
        let v = reg.create_version("iris", "r1");
        reg.link_artifact(&v.id, "classifier", "a-1").unwrap();
        assert_eq!(reg.find(&v.id).unwrap().artifacts["classifier"], "a-1");
        assert!(matches!(
            reg.link_artifact("nope", "classifier", "a-1"),
            Err(PipelineError::NotFound(_))
        ));
        assert!(reg.remove(&v.id));
        assert!(reg.find(&v.id).is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        assert!(ModelRegistry::load(&path).unwrap().versions.is_empty());

        let mut reg = ModelRegistry::new();
        let v = reg.create_version("iris", "r1");
        reg.set_stage(&v.id, "staging", false).unwrap();
        reg.save(&path).unwrap();

        let back = ModelRegistry::load(&path).unwrap();
        assert_eq!(back.versions, reg.versions);
    }
}
