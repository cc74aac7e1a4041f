//! Storage executor contract and the file-backed executor.
//!
//! Every storage engine exposes the same capability set through
//! [`StorageEngine`]. [`LocalExecutor`] implements it over a directory tree,
//! delegating record I/O to a [`FileStore`].

use crate::query::filter::Filter;
use crate::query::tag::TagFilter;
use crate::types::{ColumnsInterval, DataType, KeyInterval, KeyRange, Result, Tags};

/// Sparse key × path tables accepted by inserts.
pub mod data_view;
/// File-backed executor.
pub mod executor;
/// File/record collaborator interface and its local implementation.
pub mod file;
/// Executor configuration.
pub mod options;
/// Logical path to file location mapping.
pub mod path;
/// Rows produced by projections.
pub mod stream;

pub use data_view::{ColumnDataView, DataView, RowDataView, SeriesMeta};
pub use executor::LocalExecutor;
pub use file::{FileMeta, FileStore, LocalFileStore, Record, ResultTable};
pub use options::{ExecutorConfig, ResolvedRoots};
pub use stream::{Field, Header, Row, RowStream};

/// Schema entry describing one discoverable series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Logical path.
    pub path: String,
    /// Series type.
    pub data_type: DataType,
    /// Series tags.
    pub tags: Tags,
    /// Whether the series was discovered under the history root.
    pub is_dummy: bool,
}

impl Column {
    /// Creates a schema entry.
    pub fn new(path: impl Into<String>, data_type: DataType, tags: Tags, is_dummy: bool) -> Self {
        Self {
            path: path.into(),
            data_type,
            tags,
            is_dummy,
        }
    }
}

/// Capability set every storage engine implements.
///
/// Implementations are invoked synchronously and may be shared across
/// threads; conflicting file access is serialised internally.
pub trait StorageEngine: Send + Sync {
    /// Rows of `paths` (wildcards allowed) in `storage_unit` matching both
    /// filters. With `is_dummy` the paths are resolved under the history root
    /// and a tag filter yields an empty stream.
    fn project(
        &self,
        paths: &[String],
        tag_filter: Option<&TagFilter>,
        filter: Option<&Filter>,
        storage_unit: &str,
        is_dummy: bool,
    ) -> Result<RowStream>;

    /// Persists every present cell of `data_view`.
    fn insert(&self, data_view: &DataView, storage_unit: &str) -> Result<()>;

    /// Clears the unit (`["*"]` without ranges or tag filter), deletes the
    /// matched series (no ranges), or trims records inside `key_ranges`.
    fn delete(
        &self,
        paths: &[String],
        key_ranges: &[KeyRange],
        tag_filter: Option<&TagFilter>,
        storage_unit: &str,
    ) -> Result<()>;

    /// Managed series of the unit plus history series when enabled.
    fn schema_of(&self, storage_unit: &str) -> Result<Vec<Column>>;

    /// Path and key span covered by the engine.
    fn boundary_of(&self, prefix: Option<&str>) -> Result<(ColumnsInterval, KeyInterval)>;

    /// Releases resources. Idempotent.
    fn close(&self) -> Result<()>;
}
