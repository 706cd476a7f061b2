// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory diffing of matched subtrees.
//!
//! Files introduced inside an already-matched directory are easy to miss,
//! and silent additions without descriptor annotation break downstream
//! installer tooling that trusts the descriptor's file-change manifest. For
//! every directory-type placement the patch subtree is compared against its
//! matched distribution counterpart, and each patch-side file with no
//! counterpart gets a suggested descriptor entry.
//!
//! The report is purely advisory. It never mutates the descriptor and never
//! blocks packaging.

use crate::index::slash_path;

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Patch-side file paths absent from the matched distribution directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffReport {
    added: BTreeSet<String>,
}

impl DiffReport {
    /// Iterate added relative paths in stable order, forward slashes only.
    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(String::as_str)
    }

    /// Check if both subtrees carry the same files.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    /// Suggested descriptor lines for every silently-added file.
    pub fn suggestions(&self) -> impl Iterator<Item = String> + '_ {
        self.added
            .iter()
            .map(|path| format!("added = \"{path}\""))
    }
}

/// Compare a patch directory against its matched distribution directory.
///
/// Walks both subtrees, recording file (not directory) paths relative to
/// each root, and reports every patch-side path absent from the
/// distribution side. Output is deterministic for unchanged inputs.
///
/// # Errors
///
/// - Return [`Error::Walk`] if either subtree cannot be enumerated.
pub fn diff_dirs(patch_dir: impl AsRef<Path>, dist_dir: impl AsRef<Path>) -> Result<DiffReport> {
    let patch_files = file_set(patch_dir.as_ref())?;
    let dist_files = file_set(dist_dir.as_ref())?;

    let added = patch_files.difference(&dist_files).cloned().collect();

    Ok(DiffReport { added })
}

fn file_set(root: &Path) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|err| Error::Walk {
            source: err,
            root: root.to_path_buf(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.insert(slash_path(relative));
    }

    Ok(files)
}

/// Directory diffing error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Subtree cannot be enumerated.
    #[error("failed to walk tree at {:?}", root.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        root: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
