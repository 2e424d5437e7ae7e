//! Directory-backed artifact store.
//!
//! Each artifact lives under `<root>/<id>/` as two JSON files: the payload
//! (`artifact.json`) and its [`ArtifactRecord`] (`record.json`). The record
//! carries a SHA-256 of the payload bytes, checked on every load.

use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::persistence::{atomic_write, atomic_write_json, load_json};
use crate::preprocess::FittedPipeline;
use crate::training::model::TrainedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

const PAYLOAD_FILE: &str = "artifact.json";
const RECORD_FILE: &str = "record.json";

/// Free-form metadata attached to an artifact record.
pub type Metadata = BTreeMap<String, Value>;

/// A value passed between stages and persisted after the producing stage
/// succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Dataset(Dataset),
    Preprocessor(FittedPipeline),
    Model(TrainedModel),
    Metric(f64),
    Flag(bool),
    Predictions(Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dataset,
    Preprocessor,
    Model,
    Metric,
    Flag,
    Predictions,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dataset => "dataset",
            Self::Preprocessor => "preprocessor",
            Self::Model => "model",
            Self::Metric => "metric",
            Self::Flag => "flag",
            Self::Predictions => "predictions",
        };
        f.write_str(name)
    }
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Dataset(_) => ArtifactKind::Dataset,
            Self::Preprocessor(_) => ArtifactKind::Preprocessor,
            Self::Model(_) => ArtifactKind::Model,
            Self::Metric(_) => ArtifactKind::Metric,
            Self::Flag(_) => ArtifactKind::Flag,
            Self::Predictions(_) => ArtifactKind::Predictions,
        }
    }

    fn mismatch(&self, expected: ArtifactKind) -> PipelineError {
        PipelineError::schema(format!("expected a {expected} artifact, found a {}", self.kind()))
    }

    pub fn into_dataset(self) -> Result<Dataset, PipelineError> {
        match self {
            Self::Dataset(d) => Ok(d),
            other => Err(other.mismatch(ArtifactKind::Dataset)),
        }
    }

    pub fn into_preprocessor(self) -> Result<FittedPipeline, PipelineError> {
        match self {
            Self::Preprocessor(p) => Ok(p),
            other => Err(other.mismatch(ArtifactKind::Preprocessor)),
        }
    }

    pub fn into_model(self) -> Result<TrainedModel, PipelineError> {
        match self {
            Self::Model(m) => Ok(m),
            other => Err(other.mismatch(ArtifactKind::Model)),
        }
    }

    pub fn into_metric(self) -> Result<f64, PipelineError> {
        match self {
            Self::Metric(v) => Ok(v),
            other => Err(other.mismatch(ArtifactKind::Metric)),
        }
    }

    pub fn into_flag(self) -> Result<bool, PipelineError> {
        match self {
            Self::Flag(v) => Ok(v),
            other => Err(other.mismatch(ArtifactKind::Flag)),
        }
    }

    pub fn into_predictions(self) -> Result<Vec<Value>, PipelineError> {
        match self {
            Self::Predictions(v) => Ok(v),
            other => Err(other.mismatch(ArtifactKind::Predictions)),
        }
    }
}

/// Catalog entry for one persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    /// Pipeline artifact key, e.g. `dataset_trn`.
    pub name: String,
    pub kind: ArtifactKind,
    pub run_id: String,
    pub stage: String,
    pub path: PathBuf,
    pub hash: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Numeric metadata value, if present.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }
}

/// Compute SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Artifact storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `artifact` under a fresh id.
    pub fn save(
        &self,
        name: &str,
        artifact: &Artifact,
        run_id: &str,
        stage: &str,
        metadata: Metadata,
    ) -> Result<ArtifactRecord, PipelineError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        let path = dir.join(PAYLOAD_FILE);
        let bytes = serde_json::to_vec_pretty(artifact)?;
        atomic_write(&path, &bytes)?;

        let record = ArtifactRecord {
            id,
            name: name.to_string(),
            kind: artifact.kind(),
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            path,
            hash: hash_bytes(&bytes),
            metadata,
            created_at: Utc::now(),
        };
        atomic_write_json(&dir.join(RECORD_FILE), &record)?;
        debug!(artifact_id = %record.id, name, kind = %record.kind, "Artifact saved");
        Ok(record)
    }

    pub fn record(&self, id: &str) -> Result<ArtifactRecord, PipelineError> {
        // ids are uuids; anything else would escape the store root
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(PipelineError::not_found(format!("artifact '{id}'")));
        }
        load_json(&self.root.join(id).join(RECORD_FILE))?
            .ok_or_else(|| PipelineError::not_found(format!("artifact '{id}'")))
    }

    /// Load an artifact payload, verifying its content hash.
    pub fn load(&self, id: &str) -> Result<Artifact, PipelineError> {
        let record = self.record(id)?;
        let bytes = std::fs::read(&record.path)?;
        if hash_bytes(&bytes) != record.hash {
            return Err(PipelineError::schema(format!(
                "artifact '{id}' content does not match its recorded hash"
            )));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Merge `entries` into the artifact's metadata.
    pub fn log_metadata(&self, id: &str, entries: Metadata) -> Result<ArtifactRecord, PipelineError> {
        let mut record = self.record(id)?;
        record.metadata.extend(entries);
        atomic_write_json(&self.root.join(id).join(RECORD_FILE), &record)?;
        Ok(record)
    }

    /// Every record, oldest first.
    pub fn list(&self) -> Result<Vec<ArtifactRecord>, PipelineError> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path().join(RECORD_FILE);
            if let Some(record) = load_json::<ArtifactRecord>(&path)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// The artifact named `name` produced by run `run_id`.
    pub fn find_in_run(&self, run_id: &str, name: &str) -> Result<Option<ArtifactRecord>, PipelineError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.run_id == run_id && r.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let data = crate::data::dataset::tests::sample();
        let record = store
            .save("dataset_trn", &Artifact::Dataset(data.clone()), "run-1", "data_splitter", Metadata::new())
            .unwrap();
        assert_eq!(record.kind, ArtifactKind::Dataset);
        assert_eq!(record.hash.len(), 64);

        let loaded = store.load(&record.id).unwrap();
        assert_eq!(loaded.into_dataset().unwrap(), data);
        assert_eq!(store.record(&record.id).unwrap(), record);
    }

    #[test]
    fn test_log_metadata_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let mut initial = Metadata::new();
        initial.insert("train_accuracy".into(), json!(0.9));
        let record = store
            .save("accuracy", &Artifact::Metric(0.8), "run-1", "model_evaluator", initial)
            .unwrap();

        let mut extra = Metadata::new();
        extra.insert("test_accuracy".into(), json!(0.85));
        let updated = store.log_metadata(&record.id, extra).unwrap();
        assert_eq!(updated.metric("train_accuracy"), Some(0.9));
        assert_eq!(updated.metric("test_accuracy"), Some(0.85));
        assert_eq!(store.record(&record.id).unwrap().metadata.len(), 2);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let record = store
            .save("promoted", &Artifact::Flag(true), "run-1", "model_promoter", Metadata::new())
            .unwrap();
        std::fs::write(&record.path, br#"{"kind":"flag","value":false}"#).unwrap();
        assert!(matches!(
            store.load(&record.id),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_find_in_run_and_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        store
            .save("promoted", &Artifact::Flag(false), "run-a", "model_promoter", Metadata::new())
            .unwrap();
        let b = store
            .save("promoted", &Artifact::Flag(true), "run-b", "model_promoter", Metadata::new())
            .unwrap();

        let found = store.find_in_run("run-b", "promoted").unwrap().unwrap();
        assert_eq!(found.id, b.id);
        assert!(store.find_in_run("run-c", "promoted").unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 2);

        assert!(matches!(store.record("../etc"), Err(PipelineError::NotFound(_))));
        let unknown = uuid::Uuid::new_v4().to_string();
        assert!(matches!(store.load(&unknown), Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn test_kind_mismatch() {
        assert!(matches!(
            Artifact::Flag(true).into_model(),
            Err(PipelineError::SchemaMismatch(_))
        ));
        assert_eq!(Artifact::Metric(0.5).into_metric().unwrap(), 0.5);
    }
}
