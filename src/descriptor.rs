// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Update descriptor layout.
//!
//! Every patch directory carries a descriptor file at its top-level named
//! "update.toml". The descriptor identifies the update, states what
//! distribution it applies to, and lists every file the update adds, removes,
//! or modifies. Downstream installer tooling trusts this file-change manifest,
//! so reconciliation refuses to start without a complete descriptor.
//!
//! The descriptor travels with the patch content: it is copied verbatim into
//! the assembled archive next to the fixed resource files.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// File name of the update descriptor inside a patch directory.
pub const DESCRIPTOR_FILE: &str = "update.toml";

/// File name of the readme resource shipped with every update.
pub const README_FILE: &str = "readme.txt";

/// File name of the installation instructions shipped with every update.
pub const INSTALL_FILE: &str = "install.txt";

/// Check whether a file name is release metadata rather than patch content.
///
/// Reserved names are skipped by the tree walker at any depth: they ride
/// along with the update as fixed resources and must never be relocated.
pub fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(DESCRIPTOR_FILE)
        || name.eq_ignore_ascii_case(README_FILE)
        || name.eq_ignore_ascii_case(INSTALL_FILE)
}

/// Update descriptor layout.
///
/// Identifies one incremental update: what it is, what distribution it
/// applies to, which issues it addresses, and the full file-change manifest.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Descriptor {
    /// Update identifier, e.g. "7012".
    #[serde(default)]
    pub update: String,

    /// Platform/kernel version the update was built against.
    #[serde(default)]
    pub kernel: String,

    /// Applicability statement, e.g. a range of product builds.
    #[serde(default)]
    pub applicable: String,

    /// Free-text description of the update.
    #[serde(default)]
    pub description: String,

    /// Paths of files the update introduces.
    #[serde(default)]
    pub added: Vec<String>,

    /// Paths of files the update removes.
    #[serde(default)]
    pub removed: Vec<String>,

    /// Paths of files the update modifies in place.
    #[serde(default)]
    pub modified: Vec<String>,

    /// Issue identifier to issue description, at least one required.
    ///
    /// Kept last so serialization emits the table after all plain values.
    #[serde(default)]
    pub issues: BTreeMap<String, String>,
}

impl Descriptor {
    /// Load descriptor from top-level of a patch directory.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Unreadable`] if the descriptor file is missing or
    ///   cannot be read.
    /// - Return [`Error::Deserialize`] if the descriptor is not valid TOML.
    /// - Return [`Error::MissingField`] if any required field is absent or
    ///   empty.
    pub fn load(patch_dir: impl AsRef<Path>) -> Result<Self> {
        let path = patch_dir.as_ref().join(DESCRIPTOR_FILE);
        let content = read_to_string(&path).map_err(|err| Error::Unreadable {
            source: err,
            path: path.clone(),
        })?;

        content.parse()
    }

    /// Package name computed from descriptor fields.
    ///
    /// Names both the output archive (with a ".zip" extension) and the
    /// archive's single internal root directory.
    pub fn package_name(&self) -> String {
        format!("update-{}-{}", self.kernel, self.update)
    }

    fn validate(&self) -> Result<()> {
        if self.update.is_empty() {
            return Err(Error::MissingField { field: "update" });
        }
        if self.kernel.is_empty() {
            return Err(Error::MissingField { field: "kernel" });
        }
        if self.applicable.is_empty() {
            return Err(Error::MissingField { field: "applicable" });
        }
        if self.description.is_empty() {
            return Err(Error::MissingField { field: "description" });
        }
        if self.issues.is_empty() {
            return Err(Error::MissingField { field: "issues" });
        }

        Ok(())
    }
}

impl FromStr for Descriptor {
    type Err = Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let descriptor: Descriptor = toml::de::from_str(data).map_err(Error::Deserialize)?;

        // INVARIANT: Never hand out a descriptor with incomplete required fields.
        descriptor.validate()?;

        Ok(descriptor)
    }
}

impl Display for Descriptor {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(Error::Serialize)?
                .as_str(),
        )
    }
}

/// Descriptor error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Descriptor file cannot be read from patch directory.
    #[error("cannot read update descriptor at {:?}, every patch needs one", path.display())]
    Unreadable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Required descriptor field is absent or empty.
    #[error("descriptor field '{field}' is missing or empty, fill it in before packaging")]
    MissingField { field: &'static str },

    /// Failed to deserialize descriptor.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize descriptor.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

impl From<Error> for FmtError {
    fn from(_: Error) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn full_descriptor_text() -> &'static str {
        indoc! {r#"
            update = "7012"
            kernel = "4.2.1"
            applicable = "builds 4.2.1.100-4.2.1.499"
            description = "fixes startup deadlock in service registry"
            added = ["svc/patch.xml"]
            removed = []
            modified = ["svc/registry.jar"]

            [issues]
            SRV-1041 = "registry deadlocks when two services race on startup"
        "#}
    }

    #[test]
    fn parse_full_descriptor() -> anyhow::Result<()> {
        let result: Descriptor = full_descriptor_text().parse()?;

        let expect = Descriptor {
            update: "7012".into(),
            kernel: "4.2.1".into(),
            applicable: "builds 4.2.1.100-4.2.1.499".into(),
            description: "fixes startup deadlock in service registry".into(),
            issues: BTreeMap::from([(
                "SRV-1041".into(),
                "registry deadlocks when two services race on startup".into(),
            )]),
            added: vec!["svc/patch.xml".into()],
            removed: vec![],
            modified: vec!["svc/registry.jar".into()],
        };

        assert_eq!(result, expect);
        assert_eq!(result.package_name(), "update-4.2.1-7012");

        Ok(())
    }

    #[test_case("update", r#"kernel = "1""#; "no update id")]
    #[test_case("kernel", r#"update = "1""#; "no kernel version")]
    #[test_case("applicable", "update = \"1\"\nkernel = \"2\""; "no applicability")]
    #[test]
    fn reject_missing_required_field(field: &str, content: &str) {
        let result = content.parse::<Descriptor>();
        match result {
            Err(Error::MissingField { field: found }) => {
                pretty_assertions::assert_eq!(found, field)
            }
            other => panic!("expected missing field error, got {other:?}"),
        }
    }

    #[test]
    fn reject_empty_issue_table() {
        let content = indoc! {r#"
            update = "7012"
            kernel = "4.2.1"
            applicable = "all builds"
            description = "something"
        "#};

        let result = content.parse::<Descriptor>();
        assert!(matches!(
            result,
            Err(Error::MissingField { field: "issues" })
        ));
    }

    #[test]
    fn reserved_names_match_case_insensitively() {
        assert!(is_reserved("update.toml"));
        assert!(is_reserved("README.TXT"));
        assert!(is_reserved("Install.Txt"));
        assert!(!is_reserved("update.xml"));
    }
}
