// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive handling for distributions and assembled updates.
//!
//! The distribution a patch reconciles against may arrive as a plain
//! directory or as a zip archive. Archive-backed distributions are extracted
//! to disk beside the archive, and their entry list feeds the same
//! [`EntryIndex`] structure the filesystem walker produces, so the resolver
//! never knows where the distribution came from. Extraction failures abort
//! the whole run.
//!
//! The assembler at the other end of the pipeline walks a staged tree and
//! writes one archive whose internal root directory is the computed package
//! name. Every path separator inside the archive is a forward slash
//! regardless of host platform, since divergent separators render
//! incorrectly on at least one target platform. Timestamps and permissions
//! come from each file's live filesystem metadata, and directories are
//! implied by file paths rather than written as explicit entries.

use crate::index::{slash_path, EntryIndex, IndexDepth, Location};

use chrono::{DateTime, Datelike, Local, Timelike};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::BTreeSet,
    fs::{metadata, remove_dir_all, File, Metadata},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use zip::{
    write::SimpleFileOptions, CompressionMethod, DateTime as ZipDateTime, ZipArchive, ZipWriter,
};

/// A distribution tree ready for reconciliation.
///
/// Holds the on-disk root of the distribution, the name of its internal
/// root directory, and the recursive entry index of its contents.
#[derive(Debug, Clone)]
pub struct DistSource {
    root: PathBuf,
    root_name: String,
    index: EntryIndex,
}

impl DistSource {
    /// Open a distribution from a directory or a zip archive.
    ///
    /// Directories are indexed in place. Archives are extracted beside the
    /// archive file first (any prior extraction is deleted), then indexed
    /// from the archive's own entry list. The given progress bar is styled
    /// and driven during extraction.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotDirOrZip`] if path is neither a directory nor a
    ///   ".zip" file.
    /// - Return [`Error::Index`] if directory indexing fails.
    /// - Return archive errors if listing or extraction fails; these are
    ///   fatal and never retried.
    #[instrument(skip(path, bar), level = "debug")]
    pub fn open(path: impl AsRef<Path>, bar: &ProgressBar) -> Result<Self> {
        let path = path.as_ref();

        if path.is_dir() {
            let root_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "distribution".into());
            let index = EntryIndex::index_tree(path, IndexDepth::Recursive)?;

            return Ok(Self {
                root: path.to_path_buf(),
                root_name,
                index,
            });
        }

        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if path.is_file() && is_zip {
            return Self::open_archive(path, bar);
        }

        Err(Error::NotDirOrZip {
            path: path.to_path_buf(),
        })
    }

    /// On-disk root directory of the distribution contents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the distribution's internal root directory.
    ///
    /// The staged tree is re-rooted under this name.
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Recursive entry index of the distribution contents.
    pub fn index(&self) -> &EntryIndex {
        &self.index
    }

    fn open_archive(path: &Path, bar: &ProgressBar) -> Result<Self> {
        let file = File::open(path).map_err(|err| Error::Open {
            source: err,
            path: path.to_path_buf(),
        })?;
        let mut archive = ZipArchive::new(file).map_err(|err| Error::Archive {
            source: err,
            path: path.to_path_buf(),
        })?;

        // Logical paths of every entry, as if extracted beside the archive.
        let mut entries: Vec<(PathBuf, bool)> = Vec::new();
        for position in 0..archive.len() {
            let entry = archive.by_index(position).map_err(|err| Error::Archive {
                source: err,
                path: path.to_path_buf(),
            })?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(Error::UnsafeEntry {
                    name: entry.name().to_string(),
                    path: path.to_path_buf(),
                });
            };
            entries.push((relative, entry.is_dir()));
        }

        let tops: BTreeSet<PathBuf> = entries
            .iter()
            .filter_map(|(relative, _)| relative.components().next())
            .map(|component| PathBuf::from(component.as_os_str()))
            .collect();

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "distribution".into());

        // INVARIANT: A single top-level directory inside the archive is the
        // distribution's internal root; otherwise the archive stem is.
        let single_root = match tops.iter().next() {
            Some(top) if tops.len() == 1 => Some(top.to_string_lossy().into_owned()),
            _ => None,
        };
        let (root, root_name) = match &single_root {
            Some(top) => (parent.join(top), top.clone()),
            None => (parent.join(&stem), stem.clone()),
        };

        if root.exists() {
            debug!("remove prior extraction at {:?}", root.display());
            remove_dir_all(&root).map_err(|err| Error::Extract {
                source: err,
                path: root.clone(),
            })?;
        }

        info!("extract distribution archive {:?}", path.display());
        style_bar(bar, path.display().to_string())?;
        bar.set_length(archive.len() as u64);

        for position in 0..archive.len() {
            let mut entry = archive.by_index(position).map_err(|err| Error::Archive {
                source: err,
                path: path.to_path_buf(),
            })?;
            let Some(relative) = entry.enclosed_name() else {
                continue;
            };

            let out = if single_root.is_some() {
                parent.join(&relative)
            } else {
                root.join(&relative)
            };

            if entry.is_dir() {
                mkdirp::mkdirp(&out).map_err(|err| Error::Extract {
                    source: err,
                    path: out.clone(),
                })?;
            } else {
                if let Some(out_parent) = out.parent() {
                    mkdirp::mkdirp(out_parent).map_err(|err| Error::Extract {
                        source: err,
                        path: out_parent.to_path_buf(),
                    })?;
                }
                let mut target = File::create(&out).map_err(|err| Error::Extract {
                    source: err,
                    path: out.clone(),
                })?;
                io::copy(&mut entry, &mut target).map_err(|err| Error::Extract {
                    source: err,
                    path: out.clone(),
                })?;

                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode() {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))
                        .map_err(|err| Error::Extract {
                            source: err,
                            path: out.clone(),
                        })?;
                }
            }

            bar.inc(1);
        }
        bar.finish_and_clear();

        let index = index_entry_list(&entries, single_root.as_deref());

        Ok(Self {
            root,
            root_name,
            index,
        })
    }
}

/// Build an entry index from an archive's logical entry list.
///
/// Intermediate directories of file entries are indexed even when the
/// archive carries no explicit entry for them.
fn index_entry_list(entries: &[(PathBuf, bool)], strip_root: Option<&str>) -> EntryIndex {
    let mut index = EntryIndex::new();

    for (relative, is_dir) in entries {
        let logical = match strip_root {
            Some(root) => match relative.strip_prefix(root) {
                Ok(stripped) if stripped.as_os_str().is_empty() => continue,
                Ok(stripped) => stripped,
                Err(_) => relative.as_path(),
            },
            None => relative.as_path(),
        };

        record_with_ancestors(&mut index, logical, *is_dir);
    }

    index
}

fn record_with_ancestors(index: &mut EntryIndex, logical: &Path, is_dir: bool) {
    if let Some(name) = logical.file_name() {
        if crate::descriptor::is_reserved(&name.to_string_lossy()) {
            return;
        }
        index.insert(
            name.to_string_lossy(),
            Location::new(logical.to_path_buf(), is_dir),
        );
    }

    let mut ancestor = logical.parent();
    while let Some(dir) = ancestor {
        if let Some(name) = dir.file_name() {
            index.insert(name.to_string_lossy(), Location::new(dir.to_path_buf(), true));
        }
        ancestor = dir.parent();
    }
}

/// Walk a staged tree and write one update archive.
///
/// The archive's single internal root directory is the package name. File
/// paths are normalized to forward slashes, timestamps and unix permissions
/// are read from each file's live metadata, and directories are implied.
///
/// # Errors
///
/// - Return [`Error::Open`]/[`Error::Extract`] if staged files cannot be
///   read.
/// - Return [`Error::Assemble`] if archive writing fails.
#[instrument(skip(staged_dir, out_path, bar), level = "debug")]
pub fn assemble(
    staged_dir: impl AsRef<Path>,
    package_name: &str,
    out_path: impl AsRef<Path>,
    bar: &ProgressBar,
) -> Result<()> {
    let staged_dir = staged_dir.as_ref();
    let out_path = out_path.as_ref();

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(staged_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| Error::Extract {
            source: err.into(),
            path: staged_dir.to_path_buf(),
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(staged_dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(relative);
        }
    }

    info!("assemble {} files into {:?}", files.len(), out_path.display());
    style_bar(bar, out_path.display().to_string())?;
    bar.set_length(files.len() as u64);

    let target = File::create(out_path).map_err(|err| Error::Open {
        source: err,
        path: out_path.to_path_buf(),
    })?;
    let mut writer = ZipWriter::new(target);

    for relative in &files {
        let full = staged_dir.join(relative);
        let meta = metadata(&full).map_err(|err| Error::Open {
            source: err,
            path: full.clone(),
        })?;

        #[allow(unused_mut)]
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_timestamp(&meta));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(meta.permissions().mode());
        }

        let entry_name = format!("{package_name}/{}", slash_path(relative));
        writer
            .start_file(&entry_name, options)
            .map_err(|err| Error::Assemble {
                source: err,
                path: out_path.to_path_buf(),
            })?;

        let mut reader = File::open(&full).map_err(|err| Error::Open {
            source: err,
            path: full.clone(),
        })?;
        io::copy(&mut reader, &mut writer).map_err(|err| Error::Extract {
            source: err,
            path: full.clone(),
        })?;

        bar.inc(1);
    }

    writer.finish().map_err(|err| Error::Assemble {
        source: err,
        path: out_path.to_path_buf(),
    })?;
    bar.finish_and_clear();

    Ok(())
}

/// List the file entry paths of an archive in stable order.
///
/// Directory entries are skipped; separators are forward slashes.
///
/// # Errors
///
/// - Return [`Error::Open`]/[`Error::Archive`] if the archive cannot be
///   read.
pub fn list_entries(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| Error::Open {
        source: err,
        path: path.to_path_buf(),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| Error::Archive {
        source: err,
        path: path.to_path_buf(),
    })?;

    let mut names = Vec::new();
    for position in 0..archive.len() {
        let entry = archive.by_index(position).map_err(|err| Error::Archive {
            source: err,
            path: path.to_path_buf(),
        })?;
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    names.sort();

    Ok(names)
}

/// Read one file entry of an archive as a string.
///
/// # Errors
///
/// - Return [`Error::Open`]/[`Error::Archive`] if the archive or the entry
///   cannot be read.
pub fn read_entry(path: impl AsRef<Path>, name: &str) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| Error::Open {
        source: err,
        path: path.to_path_buf(),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| Error::Archive {
        source: err,
        path: path.to_path_buf(),
    })?;

    let mut entry = archive.by_name(name).map_err(|err| Error::Archive {
        source: err,
        path: path.to_path_buf(),
    })?;
    let mut content = String::new();
    io::Read::read_to_string(&mut entry, &mut content).map_err(|err| Error::Extract {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(content)
}

fn style_bar(bar: &ProgressBar, message: String) -> Result<()> {
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(message);
    bar.enable_steady_tick(std::time::Duration::from_millis(100));

    Ok(())
}

fn zip_timestamp(meta: &Metadata) -> ZipDateTime {
    let Ok(modified) = meta.modified() else {
        return ZipDateTime::default();
    };
    let local: DateTime<Local> = modified.into();

    ZipDateTime::from_date_and_time(
        local.year() as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

/// Archive handling error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Distribution path is neither a directory nor a zip archive.
    #[error("{:?} is neither a directory nor a .zip archive", path.display())]
    NotDirOrZip { path: PathBuf },

    /// File cannot be opened or created.
    #[error("failed to open {:?}", path.display())]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive structure cannot be read.
    #[error("failed to read archive {:?}", path.display())]
    Archive {
        #[source]
        source: zip::result::ZipError,
        path: PathBuf,
    },

    /// Archive entry path escapes the extraction root.
    #[error("archive {:?} carries unsafe entry path {name:?}", path.display())]
    UnsafeEntry { name: String, path: PathBuf },

    /// Extraction or staged-file I/O failed.
    #[error("extraction I/O failed at {:?}", path.display())]
    Extract {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive writing failed.
    #[error("failed to write archive {:?}", path.display())]
    Assemble {
        #[source]
        source: zip::result::ZipError,
        path: PathBuf,
    },

    /// Distribution directory indexing failed.
    #[error(transparent)]
    Index(#[from] crate::index::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
