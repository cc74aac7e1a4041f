//! File-backed [`StorageEngine`] mapping storage units to directory trees.
//!
//! Managed series of unit `u` live under `root/u/`, one file per logical path.
//! History data is discovered below a separate dummy root and exposed
//! read-only as binary columns. All file work goes through a [`FileStore`];
//! the executor owns path mapping, filter push-down, bitmap decoding of
//! inserts, delete-mode selection and locking.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::data_view::{ColumnDataView, DataView, RowDataView};
use super::file::{FileStore, LocalFileStore, Record};
use super::options::ExecutorConfig;
use super::path::{self, PathPattern, WILDCARD};
use super::stream::RowStream;
use super::{Column, StorageEngine};
use crate::primitives::concurrency::LockTable;
use crate::query::filter::{key_ranges_from_filter, Filter};
use crate::query::tag::TagFilter;
use crate::types::{ColumnsInterval, DataType, KeyInterval, KeyRange, PolyError, Result, Tags};

/// Storage engine over a local directory tree.
pub struct LocalExecutor {
    root: Option<PathBuf>,
    dummy_root: Option<PathBuf>,
    is_read_only: bool,
    store: Arc<dyn FileStore>,
    locks: LockTable,
    closed: AtomicBool,
}

impl LocalExecutor {
    /// Validates `config` and builds an executor delegating to `store`.
    pub fn new(config: &ExecutorConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        let roots = config.resolve()?;
        info!(
            root = ?roots.root,
            dummy_root = ?roots.dummy_root,
            read_only = config.is_read_only,
            "executor.opened"
        );
        Ok(Self {
            root: roots.root,
            dummy_root: roots.dummy_root,
            is_read_only: config.is_read_only,
            store,
            locks: LockTable::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Builds an executor backed by a [`LocalFileStore`].
    pub fn open(config: &ExecutorConfig) -> Result<Self> {
        let store = Arc::new(LocalFileStore::new(config.chunk_size));
        Self::new(config, store)
    }

    /// Canonical managed root, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Canonical history root, if history data is enabled.
    pub fn dummy_root(&self) -> Option<&Path> {
        self.dummy_root.as_deref()
    }

    /// Lock table guarding this executor's files.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PolyError::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> Result<&Path> {
        if self.is_read_only {
            return Err(PolyError::InvalidArgument(
                "storage engine is read-only".into(),
            ));
        }
        self.managed_root()
    }

    fn managed_root(&self) -> Result<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| PolyError::Config("no dir declared".into()))
    }

    /// Resolves logical paths (wildcards expanded against the files present
    /// below `base`) to `(logical path, file)` pairs, deduplicated. Listing
    /// failures are reported as a failure of `op`; malformed paths are not.
    fn resolve_paths(
        &self,
        op: &'static str,
        base: &Path,
        paths: &[String],
    ) -> Result<Vec<(String, PathBuf)>> {
        let mut resolved: Vec<(String, PathBuf)> = Vec::with_capacity(paths.len());
        let mut listing: Option<Vec<PathBuf>> = None;
        for logical in paths {
            if path::is_pattern(logical) {
                let pattern = PathPattern::new(logical)?;
                if listing.is_none() {
                    listing = Some(
                        self.store
                            .list_files(base, true)
                            .map_err(|err| PolyError::task(op, err))?,
                    );
                }
                for file in listing.iter().flatten() {
                    if let Some(name) = path::to_logical_path(base, file) {
                        if pattern.matches(&name) {
                            resolved.push((name, file.clone()));
                        }
                    }
                }
            } else {
                resolved.push((logical.clone(), path::to_normal_file_path(base, logical)?));
            }
        }
        resolved.sort_by(|a, b| a.1.cmp(&b.1));
        resolved.dedup_by(|a, b| a.1 == b.1);
        Ok(resolved)
    }

    fn project_dummy(
        &self,
        paths: &[String],
        tag_filter: Option<&TagFilter>,
        filter: Option<&Filter>,
    ) -> Result<RowStream> {
        if let Some(tag_filter) = tag_filter {
            error!(%tag_filter, "executor.project.dummy_tag_filter_rejected");
            return Ok(RowStream::empty());
        }
        let dummy_root = self
            .dummy_root
            .as_deref()
            .ok_or_else(|| PolyError::Config("history data is not enabled".into()))?;
        let key_ranges = key_ranges_from_filter(filter);
        if key_ranges.is_empty() {
            return Ok(RowStream::empty());
        }
        let targets = self.resolve_paths("project", dummy_root, paths)?;
        let mut tables = Vec::with_capacity(targets.len());
        for (name, file) in targets {
            let read = self
                .store
                .read_records(&file, None, &key_ranges, true)
                .map_err(|err| PolyError::task("project", err))?;
            tables.extend(read.into_iter().map(|table| (name.clone(), table)));
        }
        Ok(RowStream::from_tables(tables, filter))
    }

    fn encode_rows(view: &RowDataView, pending: &mut [Vec<Record>]) {
        let columns = view.columns();
        for (row, &key) in view.keys().iter().enumerate() {
            for (col, value) in view.bitmap(row).iter_ones().zip(view.values(row)) {
                pending[col].push(Record::new(key, columns[col].data_type, value.clone()));
            }
        }
    }

    fn encode_columns(view: &ColumnDataView, pending: &mut [Vec<Record>]) {
        let keys = view.keys();
        for (col, meta) in view.columns().iter().enumerate() {
            for (row, value) in view.bitmap(col).iter_ones().zip(view.values(col)) {
                pending[col].push(Record::new(keys[row], meta.data_type, value.clone()));
            }
        }
    }

    /// Runs `op` on every file, logging failures and returning the first one.
    fn best_effort(
        task: &'static str,
        files: &[PathBuf],
        mut op: impl FnMut(&PathBuf) -> Result<()>,
    ) -> Result<()> {
        let mut first: Option<PolyError> = None;
        for file in files {
            if let Err(err) = op(file) {
                warn!(file = %file.display(), error = %err, task, "executor.delete.file_failed");
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(PolyError::task(task, err)),
            None => Ok(()),
        }
    }
}

impl StorageEngine for LocalExecutor {
    fn project(
        &self,
        paths: &[String],
        tag_filter: Option<&TagFilter>,
        filter: Option<&Filter>,
        storage_unit: &str,
        is_dummy: bool,
    ) -> Result<RowStream> {
        self.ensure_open()?;
        if is_dummy {
            return self.project_dummy(paths, tag_filter, filter);
        }
        let key_ranges = key_ranges_from_filter(filter);
        if key_ranges.is_empty() {
            debug!(unit = storage_unit, "executor.project.empty_key_ranges");
            return Ok(RowStream::empty());
        }
        let base = path::unit_dir(self.managed_root()?, storage_unit)?;
        let targets = {
            let _unit = self.locks.read_unit(storage_unit);
            self.resolve_paths("project", &base, paths)?
        };
        debug!(
            unit = storage_unit,
            files = targets.len(),
            ranges = key_ranges.len(),
            "executor.project.begin"
        );

        let files: Vec<PathBuf> = targets.iter().map(|(_, file)| file.clone()).collect();
        let _guard = self.locks.read_files(storage_unit, &files);
        let mut tables = Vec::with_capacity(targets.len());
        for (name, file) in targets {
            let read = self
                .store
                .read_records(&file, tag_filter, &key_ranges, false)
                .map_err(|err| PolyError::task("project", err))?;
            tables.extend(read.into_iter().map(|table| (name.clone(), table)));
        }
        Ok(RowStream::from_tables(tables, filter))
    }

    fn insert(&self, data_view: &DataView, storage_unit: &str) -> Result<()> {
        self.ensure_open()?;
        let root = self.ensure_writable()?;
        let columns = data_view.columns();
        let mut pending: Vec<Vec<Record>> = vec![Vec::new(); columns.len()];
        match data_view {
            DataView::Row(view) => Self::encode_rows(view, &mut pending),
            DataView::Column(view) => Self::encode_columns(view, &mut pending),
        }
        let files = columns
            .iter()
            .map(|c| path::to_file_path(root, storage_unit, &c.path))
            .collect::<Result<Vec<PathBuf>>>()?;
        let tags: Vec<Tags> = columns.iter().map(|c| c.tags.clone()).collect();
        info!(
            unit = storage_unit,
            paths = files.len(),
            records = pending.iter().map(Vec::len).sum::<usize>(),
            "executor.insert.begin"
        );

        let _guard = self.locks.write_files(storage_unit, &files);
        self.store
            .write_records(&files, pending, &tags)
            .map_err(|err| PolyError::task("insert", err))
    }

    fn delete(
        &self,
        paths: &[String],
        key_ranges: &[KeyRange],
        tag_filter: Option<&TagFilter>,
        storage_unit: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let root = self.ensure_writable()?;
        let base = path::unit_dir(root, storage_unit)?;

        if key_ranges.is_empty() && tag_filter.is_none() && paths.len() == 1 && paths[0] == WILDCARD
        {
            info!(unit = storage_unit, "executor.delete.clear_unit");
            let _guard = self.locks.clear_unit(storage_unit);
            return self
                .store
                .delete_file(&base)
                .map_err(|err| PolyError::task("delete", err));
        }

        let files: Vec<PathBuf> = {
            let _unit = self.locks.read_unit(storage_unit);
            self.resolve_paths("delete", &base, paths)?
                .into_iter()
                .map(|(_, file)| file)
                .collect()
        };
        let _guard = self.locks.write_files(storage_unit, &files);

        if key_ranges.is_empty() {
            info!(unit = storage_unit, files = files.len(), "executor.delete.files");
            return Self::best_effort("delete", &files, |file| {
                self.store.delete_files(std::slice::from_ref(file), tag_filter)
            });
        }

        info!(
            unit = storage_unit,
            files = files.len(),
            ranges = key_ranges.len(),
            "executor.delete.trim"
        );
        Self::best_effort("delete", &files, |file| {
            let mut first = None;
            for range in key_ranges {
                if let Err(err) =
                    self.store
                        .trim_content(std::slice::from_ref(file), tag_filter, *range)
                {
                    first.get_or_insert(err);
                }
            }
            first.map_or(Ok(()), Err)
        })
    }

    fn schema_of(&self, storage_unit: &str) -> Result<Vec<Column>> {
        self.ensure_open()?;
        let mut columns = Vec::new();
        if let Some(root) = self.root.as_deref() {
            let base = path::unit_dir(root, storage_unit)?;
            let _unit = self.locks.read_unit(storage_unit);
            let files = self
                .store
                .list_files(&base, true)
                .map_err(|err| PolyError::task("schema", err))?;
            for file in files {
                let Some(logical) = path::to_logical_path(&base, &file) else {
                    continue;
                };
                let meta = self
                    .store
                    .file_meta(&file)
                    .map_err(|err| PolyError::task("schema", err))?
                    .ok_or_else(|| {
                        PolyError::SchemaInconsistency(format!(
                            "no metadata for {}",
                            file.display()
                        ))
                    })?;
                columns.push(Column::new(logical, meta.data_type, meta.tags, false));
            }
        }
        if let Some(dummy_root) = self.dummy_root.as_deref() {
            let files = self
                .store
                .list_files(dummy_root, true)
                .map_err(|err| PolyError::task("schema", err))?;
            columns.extend(files.iter().filter_map(|file| {
                path::to_logical_path(dummy_root, file)
                    .map(|logical| Column::new(logical, DataType::Binary, Tags::new(), true))
            }));
        }
        Ok(columns)
    }

    fn boundary_of(&self, prefix: Option<&str>) -> Result<(ColumnsInterval, KeyInterval)> {
        self.ensure_open()?;
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            return Ok((ColumnsInterval::prefix(prefix), KeyInterval::unbounded()));
        }
        let dummy_root = self.dummy_root.as_deref().ok_or_else(|| {
            PolyError::Config("boundary discovery requires a dummy_dir".into())
        })?;
        let schema_prefix = dummy_root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let bounds = self
            .store
            .boundary_of_files(dummy_root)
            .map_err(|err| PolyError::task("boundary", err))?;
        let columns = match bounds {
            Some((min, max)) => ColumnsInterval::discovered(
                path::to_logical_path(dummy_root, &min),
                path::to_logical_path(dummy_root, &max),
                schema_prefix,
            ),
            None => ColumnsInterval::discovered(None, None, schema_prefix),
        };
        Ok((columns, KeyInterval::unbounded()))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(root = ?self.root, "executor.closed");
        self.store.close()
    }
}
