// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::PatchFixture;

use anyhow::Result;
use patchpack::{archive, pipeline, Pipeline, ScriptedSelector, Selection};
use pretty_assertions::assert_eq;

const PKG: &str = "update-4.2.1-7012";

fn pipeline_with(
    fixture: &PatchFixture,
    selections: impl IntoIterator<Item = Selection>,
) -> Pipeline<ScriptedSelector> {
    Pipeline::with_selector(fixture.path("work"), ScriptedSelector::new(selections))
}

#[test]
fn directory_with_single_candidate_auto_resolves_into_layout() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/foo/bar.xml", "<bar/>")?;
    fixture.touch("producthome/components/foo/keep.xml", "<keep/>")?;
    fixture.touch("producthome/lib/core.jar", "core")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    assert_eq!(summary.staged_entries, 1);
    assert!(summary.unmatched.is_empty());

    let entries = archive::list_entries(&summary.archive)?;
    assert_eq!(
        entries,
        vec![
            format!("{PKG}/producthome/components/foo/bar.xml"),
            format!("{PKG}/producthome/install.txt"),
            format!("{PKG}/producthome/readme.txt"),
            format!("{PKG}/producthome/update.toml"),
        ],
    );

    // Staging tree is cleaned up after successful assembly.
    assert!(!fixture.exists("work/staging"));

    Ok(())
}

#[test]
fn operator_replicates_file_to_both_selected_destinations() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/x.jar", "patched")?;
    fixture.touch("producthome/lib/x.jar", "old")?;
    fixture.touch("producthome/legacy/lib/x.jar", "older")?;

    let mut pipeline = pipeline_with(&fixture, [Selection::Chosen(vec![0, 1])]);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    assert_eq!(summary.staged_entries, 1);
    assert_eq!(summary.staged_copies, 2);

    let entries = archive::list_entries(&summary.archive)?;
    assert!(entries.contains(&format!("{PKG}/producthome/lib/x.jar")));
    assert!(entries.contains(&format!("{PKG}/producthome/legacy/lib/x.jar")));
    assert_eq!(
        archive::read_entry(&summary.archive, &format!("{PKG}/producthome/lib/x.jar"))?,
        "patched",
    );

    Ok(())
}

#[test]
fn unmatched_entry_warns_but_run_still_succeeds() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/y.jar", "new")?;
    fixture.touch("producthome/lib/core.jar", "core")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    assert_eq!(summary.unmatched, vec!["y.jar"]);
    assert_eq!(summary.staged_entries, 0);

    let entries = archive::list_entries(&summary.archive)?;
    assert!(entries.iter().all(|entry| !entry.ends_with("y.jar")));

    Ok(())
}

#[test]
fn silently_added_file_is_advisory_and_still_packaged() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/svc/patch.xml", "<patch/>")?;
    fixture.touch("patch/svc/registry.jar", "patched")?;
    fixture.touch("producthome/components/svc/registry.jar", "old")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    // The diff warning never blocks staging.
    let entries = archive::list_entries(&summary.archive)?;
    assert!(entries.contains(&format!("{PKG}/producthome/components/svc/patch.xml")));
    assert!(entries.contains(&format!("{PKG}/producthome/components/svc/registry.jar")));

    Ok(())
}

#[test]
fn cancellation_terminates_before_anything_is_staged() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/x.jar", "patched")?;
    fixture.touch("producthome/lib/x.jar", "old")?;
    fixture.touch("producthome/legacy/lib/x.jar", "older")?;

    let mut pipeline = pipeline_with(&fixture, [Selection::Cancelled]);
    let result = pipeline.create(fixture.path("patch"), fixture.path("producthome"));

    assert!(matches!(
        result,
        Err(pipeline::Error::Resolve(patchpack::resolve::Error::Cancelled)),
    ));
    assert!(!fixture.exists("work/staging"));
    assert!(!fixture.exists(&format!("work/{PKG}.zip")));

    Ok(())
}

#[test]
fn mismatched_type_is_reported_and_never_staged() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/foo/bar.xml", "<bar/>")?;
    fixture.touch("producthome/bin/foo", "a file, not a directory")?;
    fixture.mkdir("producthome/conf")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    assert_eq!(summary.mismatched, vec!["foo"]);
    assert_eq!(summary.staged_entries, 0);

    Ok(())
}

#[test]
fn zip_backed_distribution_behaves_like_a_directory() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch("patch/foo/bar.xml", "<bar/>")?;
    fixture.build_zip(
        "dist.zip",
        &[
            ("producthome/components/foo/keep.xml", "<keep/>"),
            ("producthome/lib/core.jar", "core"),
        ],
    )?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("dist.zip"))?;

    let entries = archive::list_entries(&summary.archive)?;
    assert!(entries.contains(&format!("{PKG}/producthome/components/foo/bar.xml")));

    Ok(())
}

#[test]
fn validate_passes_on_a_faithfully_declared_package() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch(
        "patch/update.toml",
        concat!(
            "update = \"7012\"\n",
            "kernel = \"4.2.1\"\n",
            "applicable = \"all builds\"\n",
            "description = \"declared update\"\n",
            "modified = [\"lib/x.jar\"]\n",
            "\n",
            "[issues]\n",
            "SRV-1 = \"issue\"\n",
        ),
    )?;
    fixture.touch("patch/x.jar", "patched")?;
    fixture.touch("producthome/lib/x.jar", "old")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    let report = pipeline.validate(&summary.archive, fixture.path("producthome"))?;

    assert_eq!(report.package, PKG);
    assert!(report.is_clean());

    Ok(())
}

#[test]
fn validate_reports_undeclared_and_unshipped_paths() -> Result<()> {
    let fixture = PatchFixture::new()?;
    fixture.seed_patch_metadata()?;
    fixture.touch(
        "patch/update.toml",
        concat!(
            "update = \"7012\"\n",
            "kernel = \"4.2.1\"\n",
            "applicable = \"all builds\"\n",
            "description = \"incompletely declared update\"\n",
            "added = [\"lib/ghost.jar\"]\n",
            "\n",
            "[issues]\n",
            "SRV-1 = \"issue\"\n",
        ),
    )?;
    fixture.touch("patch/x.jar", "patched")?;
    fixture.touch("producthome/lib/x.jar", "old")?;

    let mut pipeline = pipeline_with(&fixture, []);
    let summary = pipeline.create(fixture.path("patch"), fixture.path("producthome"))?;

    let report = pipeline.validate(&summary.archive, fixture.path("producthome"))?;

    assert_eq!(report.undeclared, vec!["lib/x.jar"]);
    assert_eq!(report.unshipped, vec!["lib/ghost.jar"]);
    assert!(!report.is_clean());

    Ok(())
}
