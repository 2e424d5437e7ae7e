//! Data source abstraction for the static tabular datasets the loaders read.

use crate::config::DataSourceConfig;
use crate::data::dataset::Dataset;
use crate::data::schema::parse_cell;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fisher's Iris measurements, 50 rows per species.
const IRIS_CSV: &str = include_str!("../../data/iris.csv");

/// Information about a data source for lineage tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for reading a whole table from a source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Read every row. Unreachable sources fail with `DataUnavailable`,
    /// malformed content with `SchemaMismatch`.
    async fn load(&self) -> Result<Dataset, PipelineError>;

    /// Return metadata about this source for lineage tracking.
    fn source_info(&self) -> DataSourceInfo;
}

/// Build the source described by configuration.
pub fn source_from_config(config: &DataSourceConfig) -> Box<dyn DataSource> {
    match config {
        DataSourceConfig::Bundled => Box::new(BundledIris),
        DataSourceConfig::Csv {
            path,
            delimiter,
            has_header,
            columns,
        } => Box::new(CsvSource {
            path: path.clone(),
            format: CsvFormat {
                delimiter: *delimiter,
                has_header: *has_header,
                columns: columns.clone(),
            },
        }),
        DataSourceConfig::Url {
            url,
            delimiter,
            has_header,
            columns,
        } => Box::new(UrlSource {
            url: url.clone(),
            format: CsvFormat {
                delimiter: *delimiter,
                has_header: *has_header,
                columns: columns.clone(),
            },
        }),
    }
}

/// How to read CSV text.
#[derive(Debug, Clone)]
pub struct CsvFormat {
    pub delimiter: char,
    pub has_header: bool,
    /// Rename columns to this fixed schema.
    pub columns: Option<Vec<String>>,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            columns: None,
        }
    }
}

/// Parse CSV text into a dataset.
pub fn parse_csv(content: &str, format: &CsvFormat) -> Result<Dataset, PipelineError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header: Option<Vec<String>> = if format.has_header {
        let line = lines
            .next()
            .ok_or_else(|| PipelineError::schema("empty CSV document"))?;
        Some(
            line.split(format.delimiter)
                .map(|s| s.trim().trim_matches('"').to_string())
                .collect(),
        )
    } else {
        None
    };

    let rows: Vec<Vec<serde_json::Value>> = lines
        .map(|line| line.split(format.delimiter).map(parse_cell).collect())
        .collect();

    let width = header
        .as_ref()
        .map(Vec::len)
        .or_else(|| rows.first().map(Vec::len))
        .ok_or_else(|| PipelineError::schema("empty CSV document"))?;

    let columns = header.unwrap_or_else(|| (0..width).map(|i| format!("column_{i}")).collect());
    let mut dataset = Dataset::new(columns, rows)?;
    if let Some(names) = &format.columns {
        dataset.rename_columns(names)?;
    }
    Ok(dataset)
}

/// The Iris table compiled into the crate.
pub struct BundledIris;

#[async_trait]
impl DataSource for BundledIris {
    async fn load(&self) -> Result<Dataset, PipelineError> {
        parse_csv(IRIS_CSV, &CsvFormat::default())
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "bundled".to_string(),
            location: "iris".to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// CSV file data source.
pub struct CsvSource {
    pub path: PathBuf,
    pub format: CsvFormat,
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self) -> Result<Dataset, PipelineError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::data_unavailable(format!("{}: {e}", self.path.display()))
        })?;
        parse_csv(&content, &self.format)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// CSV document served over HTTP.
pub struct UrlSource {
    pub url: String,
    pub format: CsvFormat,
}

#[async_trait]
impl DataSource for UrlSource {
    async fn load(&self) -> Result<Dataset, PipelineError> {
        let unavailable = |e: reqwest::Error| PipelineError::data_unavailable(format!("{}: {e}", self.url));
        let content = reqwest::get(&self.url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;
        parse_csv(&content, &self.format)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "url".to_string(),
            location: self.url.clone(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::ColumnType;
    use serde_json::json;

    #[tokio::test]
    async fn test_bundled_iris_shape() {
        let ds = BundledIris.load().await.unwrap();
        assert_eq!(ds.len(), 150);
        assert_eq!(
            ds.column_names(),
            vec![
                "sepal_length",
                "sepal_width",
                "petal_length",
                "petal_width",
                "target"
            ]
        );
        assert_eq!(ds.schema.columns[0].dtype, ColumnType::Float);
        assert_eq!(ds.schema.columns[4].dtype, ColumnType::String);

        let labels = ds.column("target").unwrap();
        for species in ["setosa", "versicolor", "virginica"] {
            assert_eq!(labels.iter().filter(|v| **v == json!(species)).count(), 50);
        }
    }

    #[test]
    fn test_parse_headerless_with_rename() {
        let format = CsvFormat {
            delimiter: ';',
            has_header: false,
            columns: Some(vec!["x".into(), "label".into()]),
        };
        let ds = parse_csv("1;a\n2;b\n\n", &format).unwrap();
        assert_eq!(ds.column_names(), vec!["x", "label"]);
        assert_eq!(ds.rows[1], vec![json!(2), json!("b")]);
    }

    #[test]
    fn test_parse_ragged_is_schema_mismatch() {
        let err = parse_csv("a,b\n1,2\n3\n", &CsvFormat::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_parse_rename_width_mismatch() {
        let format = CsvFormat {
            columns: Some(vec!["only".into()]),
            ..CsvFormat::default()
        };
        assert!(parse_csv("a,b\n1,2\n", &format).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = CsvSource {
            path: PathBuf::from("/definitely/not/here.csv"),
            format: CsvFormat::default(),
        };
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_csv_file_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("d.csv");
        std::fs::write(&path, "f,target\n0.5,1\n1.5,0\n").unwrap();
        let source = CsvSource {
            path,
            format: CsvFormat::default(),
        };
        let ds = source.load().await.unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(source.source_info().source_type, "csv");
    }
}
