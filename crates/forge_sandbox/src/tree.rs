//! Virtual file tree handed to a sandbox on mount.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat map of slash-separated paths to file contents.
///
/// Paths are stored cleaned (no leading `./` or `/`, no empty segments), so
/// `./src/main.tsx` and `/src/main.tsx` address the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    files: BTreeMap<String, String>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, contents)` pairs.
    pub fn from_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut tree = Self::new();
        for (path, contents) in files {
            tree.insert(path.as_ref(), contents);
        }
        tree
    }

    /// Builder-style insert.
    pub fn file(mut self, path: &str, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Insert or replace a file. Returns the previous contents, if any.
    pub fn insert(&mut self, path: &str, contents: impl Into<String>) -> Option<String> {
        self.files.insert(clean_path(path), contents.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(&clean_path(path)).map(|s| s.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&clean_path(path))
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(&clean_path(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All files keyed by cleaned path.
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn into_files(self) -> BTreeMap<String, String> {
        self.files
    }
}

/// Strip leading `./` and `/`, drop empty and `.` segments.
pub fn clean_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent directory of a cleaned path, if it has one.
pub fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}
