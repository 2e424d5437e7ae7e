//! Per-run execution context handed explicitly to every stage.

use crate::artifacts::ArtifactStore;
use crate::error::PipelineError;
use crate::registry::ModelRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The model version a run is producing.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRef {
    pub name: String,
    pub version_id: String,
    pub version: u32,
}

/// Shared handle to the persisted model registry.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    registry: Arc<Mutex<ModelRegistry>>,
    path: PathBuf,
}

impl RegistryHandle {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let registry = ModelRegistry::load(&path)?;
        Ok(Self {
            registry: Arc::new(Mutex::new(registry)),
            path,
        })
    }

    /// Apply `f` under the lock and persist the registry if it succeeds.
    pub async fn update<T>(
        &self,
        f: impl FnOnce(&mut ModelRegistry) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let mut registry = self.registry.lock().await;
        let out = f(&mut registry)?;
        registry.save(&self.path)?;
        Ok(out)
    }

    /// Copy of the current registry state.
    pub async fn snapshot(&self) -> ModelRegistry {
        self.registry.lock().await.clone()
    }
}

/// Everything a stage may consult besides its inputs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub pipeline: String,
    pub seed: u64,
    pub store: Arc<ArtifactStore>,
    pub registry: RegistryHandle,
    pub model: Option<ModelRef>,
}

impl RunContext {
    /// The model version of this run, or an error naming `stage`.
    pub fn require_model(&self, stage: &str) -> Result<&ModelRef, PipelineError> {
        self.model.as_ref().ok_or_else(|| {
            PipelineError::plan(format!(
                "stage '{stage}' needs a model version but pipeline '{}' does not register one",
                self.pipeline
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_persists_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let handle = RegistryHandle::open(&path).unwrap();

        let failed: Result<(), _> = handle
            .update(|_| Err(PipelineError::invalid_input("nope")))
            .await;
        assert!(failed.is_err());
        assert!(!path.exists());

        let version = handle
            .update(|reg| Ok(reg.create_version("iris", "r1")))
            .await
            .unwrap();
        assert_eq!(version.version, 1);

        let reopened = RegistryHandle::open(&path).unwrap();
        assert_eq!(reopened.snapshot().await.versions.len(), 1);
    }
}
