// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Staging tree construction.
//!
//! Resolved patch entries are materialized into an intermediate directory
//! that mirrors the distribution's internal root layout before the final
//! archive is written. The staging directory is exclusively owned by one
//! run: any instance left behind by a prior run is destroyed unconditionally
//! before a new one is created. On fatal error the tree is left on disk for
//! inspection; after successful assembly the caller removes it.

use crate::index::Location;

use std::{
    fs::{copy, metadata, remove_dir_all, set_permissions},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};
use walkdir::WalkDir;

const STAGING_DIR: &str = "staging";

/// Intermediate reconstruction of the distribution's internal layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTree {
    staging_dir: PathBuf,
    internal_root: PathBuf,
}

impl StagingTree {
    /// Create a fresh staging tree under a working directory.
    ///
    /// Destroys any pre-existing staging directory first. Concurrent runs
    /// against the same working directory are unsupported.
    ///
    /// # Errors
    ///
    /// - Return [`Error::RemoveStale`] if a stale staging directory cannot
    ///   be deleted.
    /// - Return [`Error::CreateDir`] if the staging root cannot be created.
    #[instrument(skip(work_dir), level = "debug")]
    pub fn create(work_dir: impl AsRef<Path>, internal_root_name: &str) -> Result<Self> {
        let staging_dir = work_dir.as_ref().join(STAGING_DIR);
        if staging_dir.exists() {
            debug!("remove stale staging tree at {:?}", staging_dir.display());
            remove_dir_all(&staging_dir).map_err(|err| Error::RemoveStale {
                source: err,
                path: staging_dir.clone(),
            })?;
        }

        let internal_root = staging_dir.join(internal_root_name);
        mkdirp::mkdirp(&internal_root).map_err(|err| Error::CreateDir {
            source: err,
            path: internal_root.clone(),
        })?;

        Ok(Self {
            staging_dir,
            internal_root,
        })
    }

    /// Directory holding the staged internal root.
    ///
    /// This is what the archive assembler walks.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Staged counterpart of the distribution's internal root directory.
    pub fn internal_root(&self) -> &Path {
        &self.internal_root
    }

    /// Copy one resolved patch entry to its destination.
    ///
    /// The destination re-roots the matched distribution-relative location
    /// under the staged internal root. Files are copied singly; directories
    /// recursively with their internal structure unchanged and permissions
    /// preserved. Intermediate directories are pre-created.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CreateDir`] if parent directories cannot be
    ///   created.
    /// - Return [`Error::Copy`] if any copy primitive fails.
    pub fn stage_entry(&self, source: impl AsRef<Path>, location: &Location) -> Result<PathBuf> {
        let source = source.as_ref();
        let dest = self.internal_root.join(&location.path);

        // INVARIANT: Copy primitives do not implicitly create parents.
        if let Some(parent) = dest.parent() {
            mkdirp::mkdirp(parent).map_err(|err| Error::CreateDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        debug!("stage {:?} -> {:?}", source.display(), dest.display());
        if location.is_dir {
            copy_tree(source, &dest)?;
        } else {
            copy_file(source, &dest)?;
        }

        Ok(dest)
    }

    /// Place a fixed resource file at the internal root top level.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Copy`] if the resource cannot be copied.
    pub fn stage_resource(&self, source: impl AsRef<Path>) -> Result<PathBuf> {
        let source = source.as_ref();
        let name = source.file_name().unwrap_or(source.as_os_str());
        let dest = self.internal_root.join(name);
        copy_file(source, &dest)?;

        Ok(dest)
    }

    /// Remove the staging tree from disk.
    ///
    /// Called after successful archive assembly. Skipped on fatal error so
    /// the operator can inspect what was staged.
    ///
    /// # Errors
    ///
    /// - Return [`Error::RemoveStale`] if deletion fails.
    pub fn remove(self) -> Result<()> {
        remove_dir_all(&self.staging_dir).map_err(|err| Error::RemoveStale {
            source: err,
            path: self.staging_dir.clone(),
        })
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    copy(from, to).map_err(|err| Error::Copy {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })?;

    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|err| Error::Copy {
            source: err.into(),
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })?;

        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            mkdirp::mkdirp(&dest).map_err(|err| Error::CreateDir {
                source: err,
                path: dest.clone(),
            })?;

            // Keep directory permission bits in step with the patch source.
            metadata(entry.path())
                .and_then(|meta| set_permissions(&dest, meta.permissions()))
                .map_err(|err| Error::Copy {
                    source: err,
                    from: entry.path().to_path_buf(),
                    to: dest.clone(),
                })?;
        } else {
            copy_file(entry.path(), &dest)?;
        }
    }

    Ok(())
}

/// Staging tree error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stale or finished staging tree cannot be deleted.
    #[error("failed to remove staging tree at {:?}", path.display())]
    RemoveStale {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Staging directories cannot be created.
    #[error("failed to create staging directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Copy of patch content into the staging tree failed.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_to_string, write};

    fn touch(path: &str, content: &str) {
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            create_dir_all(parent).unwrap();
        }
        write(path, content).unwrap();
    }

    #[sealed_test]
    fn stage_file_reroots_under_internal_root() -> anyhow::Result<()> {
        touch("patch/x.jar", "payload");
        let staging = StagingTree::create("work", "producthome")?;

        let dest = staging.stage_entry("patch/x.jar", &Location::new("lib/x.jar", false))?;

        assert_eq!(dest, Path::new("work/staging/producthome/lib/x.jar"));
        assert_eq!(read_to_string(dest)?, "payload");

        Ok(())
    }

    #[sealed_test]
    fn stage_directory_preserves_internal_structure() -> anyhow::Result<()> {
        touch("patch/svc/patch.xml", "a");
        touch("patch/svc/conf/svc.properties", "b");
        let staging = StagingTree::create("work", "producthome")?;

        staging.stage_entry("patch/svc", &Location::new("components/svc", true))?;

        assert_eq!(
            read_to_string("work/staging/producthome/components/svc/patch.xml")?,
            "a",
        );
        assert_eq!(
            read_to_string("work/staging/producthome/components/svc/conf/svc.properties")?,
            "b",
        );

        Ok(())
    }

    #[sealed_test]
    fn create_destroys_prior_staging_tree() -> anyhow::Result<()> {
        touch("work/staging/producthome/leftover.jar", "old");

        let staging = StagingTree::create("work", "producthome")?;

        assert!(!Path::new("work/staging/producthome/leftover.jar").exists());
        assert!(staging.internal_root().is_dir());

        Ok(())
    }

    #[sealed_test]
    fn resources_land_at_internal_root_top_level() -> anyhow::Result<()> {
        touch("patch/readme.txt", "read me");
        let staging = StagingTree::create("work", "producthome")?;

        let dest = staging.stage_resource("patch/readme.txt")?;

        assert_eq!(dest, Path::new("work/staging/producthome/readme.txt"));
        assert_eq!(read_to_string(dest)?, "read me");

        Ok(())
    }

    #[sealed_test]
    fn remove_clears_staging_tree() -> anyhow::Result<()> {
        let staging = StagingTree::create("work", "producthome")?;
        staging.remove()?;

        assert!(!Path::new("work/staging").exists());

        Ok(())
    }
}
