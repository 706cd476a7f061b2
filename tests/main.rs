// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// One isolated patch-and-distribution fixture on disk.
pub(crate) struct PatchFixture {
    root: TempDir,
}

impl PatchFixture {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            root: TempDir::new()?,
        })
    }

    pub(crate) fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub(crate) fn touch(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;

        Ok(())
    }

    pub(crate) fn mkdir(&self, relative: &str) -> Result<()> {
        fs::create_dir_all(self.path(relative))?;

        Ok(())
    }

    /// Seed descriptor and fixed resource files into `patch/`.
    pub(crate) fn seed_patch_metadata(&self) -> Result<()> {
        self.touch(
            "patch/update.toml",
            concat!(
                "update = \"7012\"\n",
                "kernel = \"4.2.1\"\n",
                "applicable = \"builds 4.2.1.100-4.2.1.499\"\n",
                "description = \"integration fixture update\"\n",
                "\n",
                "[issues]\n",
                "SRV-1041 = \"registry deadlocks on startup\"\n",
            ),
        )?;
        self.touch("patch/readme.txt", "read me first")?;
        self.touch("patch/install.txt", "stop services, unpack, restart")?;

        Ok(())
    }

    /// Write a zip archive directly from an entry list.
    pub(crate) fn build_zip(&self, relative: &str, entries: &[(&str, &str)]) -> Result<()> {
        let file = fs::File::create(self.path(relative))?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        for (name, content) in entries {
            writer.start_file(*name, options)?;
            writer.write_all(content.as_bytes())?;
        }
        writer.finish()?;

        Ok(())
    }

    pub(crate) fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }
}

#[allow(dead_code)]
pub(crate) fn read(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}
