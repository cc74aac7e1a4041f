//! Configuration consumed when constructing a file-backed executor.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{PolyError, Result};

/// Parameter key of the managed root.
pub const PARAM_DIR: &str = "dir";
/// Parameter key of the history (dummy) root.
pub const PARAM_DUMMY_DIR: &str = "dummy_dir";
/// Parameter key of the history chunk size.
pub const PARAM_CHUNK_SIZE: &str = "chunk_size";

/// Default size in bytes of one history record.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Options for a [`super::LocalExecutor`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Root of the data written through this engine.
    pub dir: Option<PathBuf>,
    /// Root of pre-existing history data exposed read-only.
    pub dummy_dir: Option<PathBuf>,
    /// Whether the engine rejects writes.
    pub is_read_only: bool,
    /// Whether history data under `dummy_dir` is exposed.
    pub has_data: bool,
    /// Bytes per history record.
    pub chunk_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dir: None,
            dummy_dir: None,
            is_read_only: false,
            has_data: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Roots resolved and validated from an [`ExecutorConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRoots {
    /// Canonical managed root, absent in pure history read-only mode.
    pub root: Option<PathBuf>,
    /// Canonical history root, present only when history data is enabled.
    pub dummy_root: Option<PathBuf>,
}

impl ExecutorConfig {
    /// Config managing data under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Sets the managed root.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Sets the history root.
    pub fn dummy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dummy_dir = Some(dir.into());
        self
    }

    /// Marks the engine read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.is_read_only = read_only;
        self
    }

    /// Enables or disables history data.
    pub fn has_data(mut self, has_data: bool) -> Self {
        self.has_data = has_data;
        self
    }

    /// Sets the history chunk size.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Builds a config from the engine's string parameters.
    pub fn from_params(
        params: &HashMap<String, String>,
        is_read_only: bool,
        has_data: bool,
    ) -> Result<Self> {
        let chunk_size = match params.get(PARAM_CHUNK_SIZE) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                PolyError::Config(format!("invalid {PARAM_CHUNK_SIZE} '{raw}'"))
            })?,
            None => DEFAULT_CHUNK_SIZE,
        };
        Ok(Self {
            dir: params.get(PARAM_DIR).map(PathBuf::from),
            dummy_dir: params.get(PARAM_DUMMY_DIR).map(PathBuf::from),
            is_read_only,
            has_data,
            chunk_size,
        })
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| PolyError::Config(err.to_string()))
    }

    /// Validates the roots and resolves them to canonical paths. A writable
    /// managed root is created when missing.
    pub fn resolve(&self) -> Result<ResolvedRoots> {
        if self.chunk_size == 0 {
            return Err(PolyError::Config("chunk_size must be positive".into()));
        }
        if !self.has_data {
            let root = self.resolve_managed()?;
            return Ok(ResolvedRoots {
                root: Some(root),
                dummy_root: None,
            });
        }

        let dummy = required(self.dummy_dir.as_deref(), PARAM_DUMMY_DIR)?;
        reject_plain_file(dummy, PARAM_DUMMY_DIR)?;
        let dummy_root = canonical(dummy)?;
        if self.is_read_only {
            return Ok(ResolvedRoots {
                root: None,
                dummy_root: Some(dummy_root),
            });
        }
        let root = self.resolve_managed()?;
        if root == dummy_root {
            return Err(PolyError::Config(format!(
                "dir {} cannot be equal to dummy directory {}",
                root.display(),
                dummy_root.display()
            )));
        }
        Ok(ResolvedRoots {
            root: Some(root),
            dummy_root: Some(dummy_root),
        })
    }

    fn resolve_managed(&self) -> Result<PathBuf> {
        let dir = required(self.dir.as_deref(), PARAM_DIR)?;
        reject_plain_file(dir, PARAM_DIR)?;
        if !self.is_read_only {
            fs::create_dir_all(dir)?;
        }
        canonical(dir)
    }
}

fn required<'a>(dir: Option<&'a Path>, key: &str) -> Result<&'a Path> {
    match dir {
        Some(dir) if !dir.as_os_str().to_string_lossy().trim().is_empty() => Ok(dir),
        _ => Err(PolyError::Config(format!("no {key} declared"))),
    }
}

fn reject_plain_file(dir: &Path, key: &str) -> Result<()> {
    if dir.is_file() {
        return Err(PolyError::Config(format!(
            "invalid {key} {}: not a directory",
            dir.display()
        )));
    }
    Ok(())
}

fn canonical(dir: &Path) -> Result<PathBuf> {
    if dir.exists() {
        Ok(fs::canonicalize(dir)?)
    } else {
        Ok(std::path::absolute(dir)?)
    }
}
