// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation pipeline.
//!
//! Threads the stages of one run through explicit data structures: walk the
//! distribution and patch into entry indexes, resolve every patch entry to
//! placement decisions, diff matched directories, materialize the staging
//! tree, and assemble the final archive. No stage shares mutable state with
//! another; the indexes are read-only once built and every decision map is
//! constructed here and handed forward.
//!
//! The pipeline is a library: it reports failures as error values and never
//! terminates the process. Only the binary decides exit codes.
//!
//! Packaging is best-effort over the resolvable subset. Unmatched and
//! type-mismatched entries surface as warnings and in the run summary, and
//! the run still succeeds overall. Operator cancellation during ambiguity
//! selection aborts before anything is staged.

use crate::{
    archive::{self, DistSource},
    descriptor::{is_reserved, Descriptor, DESCRIPTOR_FILE, INSTALL_FILE, README_FILE},
    diff::diff_dirs,
    index::{EntryIndex, IndexDepth},
    resolve::{resolve, ConsoleSelector, Selector},
    stage::StagingTree,
};

use indicatif::ProgressBar;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// One reconciliation run.
///
/// Owns the working directory (staging tree and output archive land here)
/// and the operator interaction capability.
#[derive(Debug)]
pub struct Pipeline<S = ConsoleSelector>
where
    S: Selector,
{
    work_dir: PathBuf,
    selector: S,
}

impl Pipeline<ConsoleSelector> {
    /// Construct pipeline that prompts over the controlling terminal.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            selector: ConsoleSelector::new(),
        }
    }
}

impl<S> Pipeline<S>
where
    S: Selector,
{
    /// Construct pipeline with a custom operator interaction capability.
    pub fn with_selector(work_dir: impl Into<PathBuf>, selector: S) -> Self {
        Self {
            work_dir: work_dir.into(),
            selector,
        }
    }

    /// Reconcile a patch against a distribution and assemble the update
    /// archive.
    ///
    /// Returns the run summary with the output archive path. The staging
    /// tree is removed after assembly; on error it stays on disk for
    /// inspection.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Descriptor`] if the descriptor is missing or
    ///   incomplete; nothing is reconciled in that case.
    /// - Return [`Error::Resolve`] if the operator cancels or prompting
    ///   fails.
    /// - Return [`Error::MissingResource`] if a fixed resource file is
    ///   absent and the operator declines to continue without it.
    /// - Return indexing, staging, and archive errors as their transparent
    ///   variants; all are fatal for the run.
    #[instrument(skip_all, level = "debug")]
    pub fn create(
        &mut self,
        patch_dir: impl AsRef<Path>,
        dist_path: impl AsRef<Path>,
    ) -> Result<CreateSummary> {
        let patch_dir = patch_dir.as_ref();

        // INVARIANT: Descriptor completeness gates the whole run.
        let descriptor = Descriptor::load(patch_dir)?;
        info!("packaging update '{}'", descriptor.package_name());

        let dist = DistSource::open(dist_path.as_ref(), &ProgressBar::new(0))?;
        let patch = EntryIndex::index_tree(patch_dir, IndexDepth::Shallow)?;
        info!(
            "indexed {} patch entries against {} distribution names",
            patch.len(),
            dist.index().len()
        );

        let resolution = resolve(&patch, dist.index(), &mut self.selector)?;

        // Advisory pass: surface files silently introduced inside matched
        // directories before anything is copied.
        for (name, placement) in resolution.iter() {
            for location in placement.destinations() {
                if !location.is_dir {
                    continue;
                }

                let report = diff_dirs(patch_dir.join(name), dist.root().join(&location.path))?;
                for suggestion in report.suggestions() {
                    warn!(
                        "'{name}' ships a file absent under {}, annotate the \
                         descriptor: {suggestion}",
                        location.display_path()
                    );
                }
            }
        }

        let staging = StagingTree::create(&self.work_dir, dist.root_name())?;
        let mut staged_copies = 0;
        for (name, placement) in resolution.iter() {
            for location in placement.destinations() {
                staging.stage_entry(patch_dir.join(name), location)?;
                staged_copies += 1;
            }
        }

        self.stage_resources(patch_dir, &staging)?;

        let package_name = descriptor.package_name();
        let out_path = self.work_dir.join(format!("{package_name}.zip"));
        archive::assemble(
            staging.staging_dir(),
            &package_name,
            &out_path,
            &ProgressBar::new(0),
        )?;
        staging.remove()?;

        let summary = CreateSummary {
            archive: out_path,
            staged_entries: resolution.resolved_count(),
            staged_copies,
            unmatched: resolution.unmatched().map(str::to_string).collect(),
            mismatched: resolution.mismatched().map(str::to_string).collect(),
        };
        summary.log();

        Ok(summary)
    }

    /// Cross-check a previously assembled update archive against a
    /// distribution.
    ///
    /// Structural problems (unreadable archive, missing or incomplete
    /// descriptor) are errors. Content findings are collected into the
    /// report and warned about, never fatal.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NoDescriptor`] if the archive carries no
    ///   descriptor at its internal root.
    /// - Return [`Error::Descriptor`] if the embedded descriptor is
    ///   incomplete.
    /// - Return archive and indexing errors as their transparent variants.
    #[instrument(skip_all, level = "debug")]
    pub fn validate(
        &mut self,
        archive_path: impl AsRef<Path>,
        dist_path: impl AsRef<Path>,
    ) -> Result<ValidationReport> {
        let archive_path = archive_path.as_ref();
        let entries = archive::list_entries(archive_path)?;

        let descriptor_entry = entries
            .iter()
            .find(|entry| {
                let parts: Vec<&str> = entry.split('/').collect();
                matches!(parts.as_slice(), [_, _, name] if name.eq_ignore_ascii_case(DESCRIPTOR_FILE))
            })
            .ok_or_else(|| Error::NoDescriptor {
                path: archive_path.to_path_buf(),
            })?;
        let descriptor: Descriptor = archive::read_entry(archive_path, descriptor_entry)?.parse()?;
        info!("validating package '{}'", descriptor.package_name());

        let dist = DistSource::open(dist_path.as_ref(), &ProgressBar::new(0))?;

        let declared: BTreeSet<&str> = descriptor
            .added
            .iter()
            .chain(descriptor.modified.iter())
            .map(String::as_str)
            .collect();

        let mut shipped: BTreeSet<String> = BTreeSet::new();
        let mut missing_parents = Vec::new();
        let mut undeclared = Vec::new();

        for entry in &entries {
            // Entry layout is <package>/<internal root>/<content path>.
            let mut parts = entry.splitn(3, '/');
            let (_, _, Some(content)) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };

            let content_path = PathBuf::from(content);
            let name = content_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if is_reserved(&name) {
                continue;
            }

            shipped.insert(content.to_string());

            if let Some(parent) = content_path.parent() {
                if !parent.as_os_str().is_empty() && !dist.root().join(parent).is_dir() {
                    warn!(
                        "package ships {content} but the distribution has no \
                         directory {:?}",
                        parent.display()
                    );
                    missing_parents.push(content.to_string());
                }
            }

            if !declared.contains(content) {
                warn!("package ships {content} but the descriptor never lists it");
                undeclared.push(content.to_string());
            }
        }

        let unshipped: Vec<String> = declared
            .iter()
            .filter(|listed| !shipped.contains(**listed))
            .map(|listed| listed.to_string())
            .collect();
        for listed in &unshipped {
            warn!("descriptor lists {listed} but the package does not ship it");
        }

        Ok(ValidationReport {
            package: descriptor.package_name(),
            missing_parents,
            undeclared,
            unshipped,
        })
    }

    fn stage_resources(&mut self, patch_dir: &Path, staging: &StagingTree) -> Result<()> {
        for resource in [README_FILE, INSTALL_FILE] {
            let source = patch_dir.join(resource);
            if source.is_file() {
                staging.stage_resource(&source)?;
                continue;
            }

            let question = format!("'{resource}' is missing from the patch, continue without it?");
            if !self.selector.confirm(&question)? {
                return Err(Error::MissingResource {
                    name: resource.to_string(),
                });
            }
            warn!("packaging without resource file '{resource}'");
        }

        // The descriptor always travels with the update.
        staging.stage_resource(patch_dir.join(DESCRIPTOR_FILE))?;

        Ok(())
    }
}

/// Summary of one create run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSummary {
    /// Path of the assembled update archive.
    pub archive: PathBuf,

    /// Patch entries that resolved to at least one destination.
    pub staged_entries: usize,

    /// Total copies staged, counting replication to multiple destinations.
    pub staged_copies: usize,

    /// Patch entries with no match in the distribution.
    pub unmatched: Vec<String>,

    /// Patch entries matching only locations of the wrong type.
    pub mismatched: Vec<String>,
}

impl CreateSummary {
    fn log(&self) {
        info!(
            "staged {} entries ({} copies) into {:?}",
            self.staged_entries,
            self.staged_copies,
            self.archive.display()
        );
        for name in &self.unmatched {
            warn!("unmatched entry '{name}' was not packaged");
        }
        for name in &self.mismatched {
            warn!("type-mismatched entry '{name}' was not packaged");
        }
    }
}

/// Findings from validating a package against a distribution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Package name from the embedded descriptor.
    pub package: String,

    /// Shipped paths whose destination directory is absent from the
    /// distribution.
    pub missing_parents: Vec<String>,

    /// Shipped paths the descriptor never lists as added or modified.
    pub undeclared: Vec<String>,

    /// Listed paths the package does not ship.
    pub unshipped: Vec<String>,
}

impl ValidationReport {
    /// Check if validation found nothing to complain about.
    pub fn is_clean(&self) -> bool {
        self.missing_parents.is_empty() && self.undeclared.is_empty() && self.unshipped.is_empty()
    }
}

/// Pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Descriptor loading or validation failed.
    #[error(transparent)]
    Descriptor(#[from] crate::descriptor::Error),

    /// Entry indexing failed.
    #[error(transparent)]
    Index(#[from] crate::index::Error),

    /// Archive extraction or assembly failed.
    #[error(transparent)]
    Archive(#[from] crate::archive::Error),

    /// Placement resolution failed or was cancelled.
    #[error(transparent)]
    Resolve(#[from] crate::resolve::Error),

    /// Directory diffing failed.
    #[error(transparent)]
    Diff(#[from] crate::diff::Error),

    /// Staging tree construction failed.
    #[error(transparent)]
    Stage(#[from] crate::stage::Error),

    /// Fixed resource file absent and operator declined to continue.
    #[error("resource file '{name}' is missing and the operator declined to continue")]
    MissingResource { name: String },

    /// Package archive carries no descriptor at its internal root.
    #[error("no descriptor found inside package {:?}", path.display())]
    NoDescriptor { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
