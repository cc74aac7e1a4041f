//! Mapping between logical paths (`a.b.c`) and file locations.
//!
//! A managed series lives at `root/<unit>/a/b/c`; a history series discovered
//! under the dummy root lives at `dummy_root/a/b/c`. Units and path segments
//! must each name exactly one directory entry, so a mapped file never leaves
//! its base directory.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::types::{PolyError, Result};

/// Separator between logical path segments.
pub const SEPARATOR: char = '.';

/// Wildcard accepted in logical paths.
pub const WILDCARD: &str = "*";

/// Directory holding every file of `unit`.
pub fn unit_dir(root: &Path, unit: &str) -> Result<PathBuf> {
    Ok(root.join(single_component("storage unit", unit)?))
}

/// File backing `path` inside `unit`.
pub fn to_file_path(root: &Path, unit: &str, path: &str) -> Result<PathBuf> {
    to_normal_file_path(&unit_dir(root, unit)?, path)
}

/// File backing `path` directly below `base`.
pub fn to_normal_file_path(base: &Path, path: &str) -> Result<PathBuf> {
    let mut out = base.to_path_buf();
    let mut depth = 0;
    for segment in path.split(SEPARATOR).filter(|segment| !segment.is_empty()) {
        out.push(single_component("path segment", segment)?);
        depth += 1;
    }
    if depth == 0 {
        return Err(PolyError::InvalidArgument(format!("path '{path}' names no series")));
    }
    Ok(out)
}

/// Accepts `name` only when it is one plain directory entry: no separators,
/// no `.`/`..`, no root or prefix.
fn single_component<'a>(what: &str, name: &'a str) -> Result<&'a str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(entry)), None) if entry == name => Ok(name),
        _ => Err(PolyError::InvalidArgument(format!(
            "{what} '{name}' is not a single directory entry"
        ))),
    }
}

/// Logical path of `file` relative to `base`, `None` when `file` is not below
/// `base`.
pub fn to_logical_path(base: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(base).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if segments.is_empty() {
        return None;
    }
    Some(segments.join(SEPARATOR.to_string().as_str()))
}

/// Whether `path` contains a wildcard and must be expanded.
pub fn is_pattern(path: &str) -> bool {
    path.contains(WILDCARD)
}

/// Compiled logical path pattern where `*` matches any character sequence.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
}

impl PathPattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|err| PolyError::InvalidArgument(format!("path pattern '{pattern}': {err}")))?;
        Ok(Self { regex })
    }

    /// Whether `path` matches the pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}
