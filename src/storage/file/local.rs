//! Directory-tree [`FileStore`] keeping one JSON document per series.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FileMeta, FileStore, Record, ResultTable};
use crate::query::tag::{tags_match, TagFilter};
use crate::storage::options::DEFAULT_CHUNK_SIZE;
use crate::types::{DataType, KeyRange, PolyError, Result, Tags, Value};

#[derive(Debug, Serialize, Deserialize)]
struct FileDocument {
    data_type: DataType,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    records: BTreeMap<i64, Value>,
}

/// Reference collaborator storing series as JSON documents on disk.
///
/// History files (read with `is_dummy`) are opaque byte files exposed as
/// [`DataType::Binary`] records of `chunk_size` bytes keyed by chunk index.
#[derive(Debug)]
pub struct LocalFileStore {
    chunk_size: usize,
    closed: AtomicBool,
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl LocalFileStore {
    /// Creates a store splitting history files into `chunk_size` byte records.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PolyError::Closed)
        } else {
            Ok(())
        }
    }

    fn load(file: &Path) -> Result<Option<FileDocument>> {
        if file.is_dir() {
            return Ok(None);
        }
        match fs::read(file) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store(file: &Path, doc: &FileDocument) -> Result<()> {
        let parent = file
            .parent()
            .ok_or_else(|| PolyError::InvalidArgument(format!("{} has no parent", file.display())))?;
        fs::create_dir_all(parent)?;
        let name = file
            .file_name()
            .ok_or_else(|| PolyError::InvalidArgument(format!("{} has no file name", file.display())))?;
        let tmp = parent.join(format!(".{}.tmp", name.to_string_lossy()));
        fs::write(&tmp, serde_json::to_vec(doc)?)?;
        fs::rename(&tmp, file)?;
        Ok(())
    }

    fn remove(file: &Path) -> Result<()> {
        let result = if file.is_dir() {
            fs::remove_dir_all(file)
        } else {
            fs::remove_file(file)
        };
        match result {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    fn read_history(&self, file: &Path, key_ranges: &[KeyRange]) -> Result<Vec<ResultTable>> {
        if !file.is_file() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(file)?;
        let records = bytes
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i as i64, chunk))
            .filter(|(key, _)| KeyRange::any_contains(key_ranges, *key))
            .map(|(key, chunk)| Record::new(key, DataType::Binary, Value::Binary(chunk.to_vec())))
            .collect();
        Ok(vec![ResultTable {
            file: file.to_path_buf(),
            data_type: DataType::Binary,
            tags: Tags::new(),
            records,
        }])
    }

    fn walk(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let kind = entry.file_type()?;
            if kind.is_dir() {
                if recursive {
                    Self::walk(&path, recursive, out)?;
                }
            } else if kind.is_file() {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl FileStore for LocalFileStore {
    fn read_records(
        &self,
        file: &Path,
        tag_filter: Option<&TagFilter>,
        key_ranges: &[KeyRange],
        is_dummy: bool,
    ) -> Result<Vec<ResultTable>> {
        self.ensure_open()?;
        if is_dummy {
            return self.read_history(file, key_ranges);
        }
        let Some(doc) = Self::load(file)? else {
            return Ok(Vec::new());
        };
        if !tags_match(tag_filter, &doc.tags) {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for range in KeyRange::normalize(key_ranges.to_vec()) {
            records.extend(
                doc.records
                    .range(range.begin..range.end)
                    .map(|(&key, value)| Record::new(key, doc.data_type, value.clone())),
            );
        }
        Ok(vec![ResultTable {
            file: file.to_path_buf(),
            data_type: doc.data_type,
            tags: doc.tags,
            records,
        }])
    }

    fn write_records(
        &self,
        files: &[PathBuf],
        records: Vec<Vec<Record>>,
        tags: &[Tags],
    ) -> Result<()> {
        self.ensure_open()?;
        if files.len() != records.len() || files.len() != tags.len() {
            return Err(PolyError::InvalidArgument(format!(
                "{} files, {} record lists and {} tag sets",
                files.len(),
                records.len(),
                tags.len()
            )));
        }
        for ((file, batch), tags) in files.iter().zip(records).zip(tags) {
            let mut doc = match Self::load(file)? {
                Some(doc) => doc,
                None => match batch.first() {
                    Some(first) => FileDocument {
                        data_type: first.data_type,
                        tags: Tags::new(),
                        records: BTreeMap::new(),
                    },
                    None => continue,
                },
            };
            for record in batch {
                if record.data_type != doc.data_type || record.value.data_type() != doc.data_type {
                    return Err(PolyError::InvalidArgument(format!(
                        "{} holds {} values, got {} at key {}",
                        file.display(),
                        doc.data_type,
                        record.value.data_type(),
                        record.key
                    )));
                }
                doc.records.insert(record.key, record.value);
            }
            doc.tags = tags.clone();
            Self::store(file, &doc)?;
            debug!(file = %file.display(), records = doc.records.len(), "series written");
        }
        Ok(())
    }

    fn delete_file(&self, file: &Path) -> Result<()> {
        self.ensure_open()?;
        Self::remove(file)
    }

    fn delete_files(&self, files: &[PathBuf], tag_filter: Option<&TagFilter>) -> Result<()> {
        self.ensure_open()?;
        for file in files {
            if file.is_dir() {
                debug!(file = %file.display(), "directory is not a series, kept");
                continue;
            }
            let doomed = match tag_filter {
                None => true,
                Some(filter) => Self::load(file)?.is_some_and(|doc| filter.matches(&doc.tags)),
            };
            if doomed {
                Self::remove(file)?;
            }
        }
        Ok(())
    }

    fn trim_content(
        &self,
        files: &[PathBuf],
        tag_filter: Option<&TagFilter>,
        range: KeyRange,
    ) -> Result<()> {
        self.ensure_open()?;
        for file in files {
            let Some(mut doc) = Self::load(file)? else {
                continue;
            };
            if !tags_match(tag_filter, &doc.tags) {
                continue;
            }
            let before = doc.records.len();
            doc.records.retain(|key, _| !range.contains(*key));
            if doc.records.len() != before {
                Self::store(file, &doc)?;
            }
        }
        Ok(())
    }

    fn list_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        self.ensure_open()?;
        let mut out = Vec::new();
        if dir.is_dir() {
            Self::walk(dir, recursive, &mut out)?;
        }
        out.sort();
        Ok(out)
    }

    fn file_meta(&self, file: &Path) -> Result<Option<FileMeta>> {
        self.ensure_open()?;
        match Self::load(file) {
            Ok(doc) => Ok(doc.map(|doc| FileMeta {
                data_type: doc.data_type,
                tags: doc.tags,
            })),
            Err(PolyError::Serialization(reason)) => {
                debug!(file = %file.display(), %reason, "unreadable series metadata");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn boundary_of_files(&self, dir: &Path) -> Result<Option<(PathBuf, PathBuf)>> {
        let files = self.list_files(dir, true)?;
        Ok(files.first().cloned().zip(files.last().cloned()))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
