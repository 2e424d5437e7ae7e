//! Tabular data: schema, datasets, sources, the inference-slice loader and
//! the train/test splitter.

pub mod dataset;
pub mod loader;
pub mod schema;
pub mod source;
pub mod splitter;

pub use dataset::Dataset;
pub use loader::{INFERENCE_FRACTION, load_dataset};
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use source::{BundledIris, CsvFormat, CsvSource, DataSource, UrlSource, source_from_config};
pub use splitter::train_test_split;
