//! File/record collaborator consumed by the file-backed executor.
//!
//! The executor never touches file contents directly: it maps logical paths
//! to file locations and delegates reading, writing, trimming and listing to a
//! [`FileStore`]. [`local::LocalFileStore`] is the bundled implementation.

use std::path::{Path, PathBuf};

use crate::query::tag::TagFilter;
use crate::types::{DataType, KeyRange, Result, Tags, Value};

pub mod local;

pub use local::LocalFileStore;

/// One persisted cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Row key.
    pub key: i64,
    /// Declared type of the series.
    pub data_type: DataType,
    /// Stored value.
    pub value: Value,
}

impl Record {
    /// Creates a record.
    pub fn new(key: i64, data_type: DataType, value: Value) -> Self {
        Self {
            key,
            data_type,
            value,
        }
    }
}

/// Metadata recoverable from a managed file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    /// Series type.
    pub data_type: DataType,
    /// Series tags.
    pub tags: Tags,
}

/// Records read from one file.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultTable {
    /// File the records came from.
    pub file: PathBuf,
    /// Series type.
    pub data_type: DataType,
    /// Series tags.
    pub tags: Tags,
    /// Records in ascending key order.
    pub records: Vec<Record>,
}

/// Storage collaborator the executor delegates file work to.
///
/// Implementations must be safe to call from many threads; the executor
/// serialises conflicting calls on the same file itself.
pub trait FileStore: Send + Sync {
    /// Reads the records of `file` whose keys fall in `key_ranges`. Managed
    /// files not matching `tag_filter` yield nothing; history files
    /// (`is_dummy`) are exposed as binary chunks.
    fn read_records(
        &self,
        file: &Path,
        tag_filter: Option<&TagFilter>,
        key_ranges: &[KeyRange],
        is_dummy: bool,
    ) -> Result<Vec<ResultTable>>;

    /// Appends `records[i]` to `files[i]`, replacing its tag set with `tags[i]`.
    fn write_records(&self, files: &[PathBuf], records: Vec<Vec<Record>>, tags: &[Tags])
        -> Result<()>;

    /// Removes a file or a whole directory tree.
    fn delete_file(&self, file: &Path) -> Result<()>;

    /// Removes the series files whose tags satisfy `tag_filter`. Directories
    /// are left in place along with everything below them.
    fn delete_files(&self, files: &[PathBuf], tag_filter: Option<&TagFilter>) -> Result<()>;

    /// Removes records with keys in `range` from files matching `tag_filter`.
    fn trim_content(
        &self,
        files: &[PathBuf],
        tag_filter: Option<&TagFilter>,
        range: KeyRange,
    ) -> Result<()>;

    /// Files below `dir`, sorted; missing directories yield nothing.
    fn list_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>>;

    /// Metadata of a managed file, `None` when it cannot be recovered.
    fn file_meta(&self, file: &Path) -> Result<Option<FileMeta>>;

    /// Lexicographically smallest and largest file below `dir`.
    fn boundary_of_files(&self, dir: &Path) -> Result<Option<(PathBuf, PathBuf)>>;

    /// Releases resources; later calls fail.
    fn close(&self) -> Result<()>;
}
