// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Entry indexing of patch and distribution trees.
//!
//! Reconciliation matches patch content to distribution locations by entry
//! name alone, so both trees are first flattened into an __entry index__: a
//! registry keyed by base name, where each name collects every location it
//! was discovered at. The same name may legitimately appear at several paths
//! within one tree, and may even be a file at one path and a directory at
//! another, so the type flag is recorded per-location rather than per-name.
//!
//! # Indexing Depth
//!
//! The patch tree is indexed shallow: each top-level item is the atomic unit
//! to place, and its internal layout is preserved verbatim when copied. The
//! distribution tree is indexed recursively, since any depth may be a valid
//! destination.
//!
//! Reserved release-metadata names (descriptor, readme, install
//! instructions) are skipped at any depth. They are never content to
//! relocate.
//!
//! # See Also
//!
//! - [`is_reserved`](crate::descriptor::is_reserved)

use crate::descriptor::is_reserved;

use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// One place a name was discovered at within an indexed tree.
///
/// The path is always relative to the indexed root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    /// Path of the discovered object, relative to the indexed root.
    pub path: PathBuf,

    /// Whether the object at this path is a directory.
    pub is_dir: bool,
}

impl Location {
    /// Construct new location.
    pub fn new(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
        }
    }

    /// Render location path with forward slashes regardless of host platform.
    pub fn display_path(&self) -> String {
        slash_path(&self.path)
    }
}

/// All locations one name was discovered at.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Entry {
    locations: BTreeSet<Location>,
}

impl Entry {
    /// Iterate locations in stable lexicographic order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    /// Number of recorded locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Check if entry records no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Name-keyed registry of every entry discovered in one tree.
///
/// Built once per tree per run, and read-only afterwards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryIndex {
    entries: BTreeMap<String, Entry>,
}

/// How deep [`EntryIndex::index_tree`] descends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IndexDepth {
    /// Index only first-level children of the root.
    #[default]
    Shallow,

    /// Index every file and directory at every depth.
    Recursive,
}

impl EntryIndex {
    /// Construct empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build index from a filesystem tree.
    ///
    /// Reserved release-metadata names are skipped at any depth. The root
    /// itself is never indexed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotADirectory`] if root is not an existing
    ///   directory.
    /// - Return [`Error::Walk`] if any part of the tree cannot be
    ///   enumerated.
    #[instrument(skip(root), level = "debug")]
    pub fn index_tree(root: impl AsRef<Path>, depth: IndexDepth) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        debug!("index {:?} ({:?})", root.display(), depth);
        match depth {
            IndexDepth::Shallow => Self::index_shallow(root),
            IndexDepth::Recursive => Self::index_recursive(root),
        }
    }

    fn index_shallow(root: &Path) -> Result<Self> {
        let mut index = Self::new();
        let children = read_dir(root).map_err(|err| Error::ReadDir {
            source: err,
            path: root.to_path_buf(),
        })?;

        for child in children {
            let child = child.map_err(|err| Error::ReadDir {
                source: err,
                path: root.to_path_buf(),
            })?;
            let name = child.file_name().to_string_lossy().into_owned();
            if is_reserved(&name) {
                continue;
            }

            let is_dir = child.path().is_dir();
            let location = Location::new(name.clone(), is_dir);
            index.insert(name, location);
        }

        Ok(index)
    }

    fn index_recursive(root: &Path) -> Result<Self> {
        let mut index = Self::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_reserved(&entry.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(|err| Error::Walk {
                source: err,
                root: root.to_path_buf(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();

            // INVARIANT: Locations are always relative to the indexed root.
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            index.insert(name, Location::new(relative, entry.file_type().is_dir()));
        }

        Ok(index)
    }

    /// Record a location under a name.
    ///
    /// Duplicate locations collapse into one. Used by the archive-backed
    /// walker, which derives locations from an archive's entry list instead
    /// of the filesystem.
    pub fn insert(&mut self, name: impl Into<String>, location: Location) {
        self.entries
            .entry(name.into())
            .or_default()
            .locations
            .insert(location);
    }

    /// Look up entry by name.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Iterate entries in stable name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Entry> {
        self.entries.iter()
    }

    /// Number of distinct names indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render a relative path with forward slashes regardless of host platform.
pub fn slash_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_string_lossy().as_ref());
    }

    out
}

/// Entry indexing error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Index root is missing or not a directory.
    #[error("{:?} is not an existing directory", path.display())]
    NotADirectory { path: PathBuf },

    /// First-level enumeration failed.
    #[error("failed to list entries of {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Recursive enumeration failed.
    #[error("failed to walk tree at {:?}", root.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        root: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
