// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Placement resolution of patch entries.
//!
//! Patch authors do not know the distribution's internal layout in advance,
//! so every top-level patch entry must be matched to one or more concrete
//! destinations inside the distribution by name. Resolution produces exactly
//! one [`Placement`] decision per patch entry:
//!
//! - Zero candidates: the entry is __unmatched__. The operator is told to
//!   nest the new file inside an existing, matchable parent directory so a
//!   location can be inferred.
//! - Exactly one candidate of the same type: __auto-resolved__ with no
//!   operator interaction.
//! - Several candidates of the same type: an __ambiguity__. The operator
//!   picks destinations from a stably-ordered list, and may deliberately
//!   replicate one entry to multiple locations in a single run.
//! - Candidates only of the wrong type: a __type mismatch__, reported but
//!   never staged.
//!
//! Candidates whose type disagrees with the patch entry never participate in
//! ambiguity counting and never appear in the interactive list; they are
//! only warned about. If filtering leaves exactly one same-type candidate,
//! it is auto-selected rather than escalated to a prompt.
//!
//! # Operator Interaction
//!
//! All terminal I/O sits behind the [`Selector`] capability so tests can
//! inject scripted input and assert terminal states without a real terminal.
//! The console selector re-prompts without bound on malformed input, keeps
//! the indices it already accepted, and treats index `0` as immediate
//! cancellation of the whole run.

use crate::index::{EntryIndex, Location};

use inquire::{Confirm, Text};
use std::collections::{btree_map, BTreeMap};
use tracing::{info, instrument, warn};

/// Resolved outcome for one patch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Single unambiguous destination, chosen without interaction.
    Auto(Location),

    /// Destinations picked by the operator out of several candidates.
    Selected(Vec<Location>),

    /// No location in the distribution carries this name.
    Unmatched,

    /// Name only found at locations of the wrong type.
    TypeMismatch(Vec<Location>),
}

impl Placement {
    /// Destinations this entry will be copied to.
    ///
    /// Empty for unmatched and mismatched entries, which are never staged.
    pub fn destinations(&self) -> Vec<&Location> {
        match self {
            Self::Auto(location) => vec![location],
            Self::Selected(locations) => locations.iter().collect(),
            Self::Unmatched | Self::TypeMismatch(_) => Vec::new(),
        }
    }

    /// Check if entry resolved to at least one destination.
    pub fn is_resolved(&self) -> bool {
        !self.destinations().is_empty()
    }
}

/// All placement decisions of one run, keyed by entry name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    decisions: BTreeMap<String, Placement>,
}

impl Resolution {
    /// Look up decision for one entry.
    pub fn get(&self, name: &str) -> Option<&Placement> {
        self.decisions.get(name)
    }

    /// Iterate decisions in stable name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Placement> {
        self.decisions.iter()
    }

    /// Names that matched nothing in the distribution.
    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.decisions
            .iter()
            .filter(|(_, placement)| matches!(placement, Placement::Unmatched))
            .map(|(name, _)| name.as_str())
    }

    /// Names that only matched locations of the wrong type.
    pub fn mismatched(&self) -> impl Iterator<Item = &str> {
        self.decisions
            .iter()
            .filter(|(_, placement)| matches!(placement, Placement::TypeMismatch(_)))
            .map(|(name, _)| name.as_str())
    }

    /// Number of entries that resolved to at least one destination.
    pub fn resolved_count(&self) -> usize {
        self.decisions
            .values()
            .filter(|placement| placement.is_resolved())
            .count()
    }
}

/// Outcome of one interactive destination selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based indices into the candidate list, distinct, in the order
    /// the operator gave them.
    Chosen(Vec<usize>),

    /// Operator cancelled the entire run.
    Cancelled,
}

/// Layer of indirection for operator interaction.
pub trait Selector {
    /// Pick destinations for an ambiguous entry out of same-type candidates.
    fn select_destinations(
        &mut self,
        name: &str,
        is_dir: bool,
        candidates: &[Location],
    ) -> Result<Selection>;

    /// Ask the operator a yes/no question.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Operator interaction over the controlling terminal.
///
/// Prompts block indefinitely; there is no timeout.
#[derive(Debug, Default, Clone)]
pub struct ConsoleSelector;

impl ConsoleSelector {
    /// Construct new console selector.
    pub fn new() -> Self {
        Self
    }
}

impl Selector for ConsoleSelector {
    fn select_destinations(
        &mut self,
        name: &str,
        is_dir: bool,
        candidates: &[Location],
    ) -> Result<Selection> {
        let kind = if is_dir { "directory" } else { "file" };
        println!(
            "{kind} '{name}' exists at {} places in the distribution:",
            candidates.len()
        );
        for (position, candidate) in candidates.iter().enumerate() {
            println!("  {}. {}", position + 1, candidate.display_path());
        }

        let mut retained = String::new();
        loop {
            let mut prompt = Text::new("destinations")
                .with_help_message("comma separated indices, 0 cancels the run");
            if !retained.is_empty() {
                prompt = prompt.with_initial_value(&retained);
            }

            let line = prompt.prompt()?;
            match parse_selection(&line, candidates.len()) {
                Ok(selection) => return Ok(selection),
                Err(accepted) => {
                    // INVARIANT: Indices already accepted survive the re-prompt.
                    retained = accepted
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    warn!(
                        "invalid selection {:?}, pick indices between 1 and {}",
                        line.trim(),
                        candidates.len()
                    );
                }
            }
        }
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = Confirm::new(question)
            .with_parser(&|input| match input.trim().to_lowercase().as_str() {
                "y" | "yes" => Ok(true),
                "n" | "no" => Ok(false),
                _ => Err(()),
            })
            .with_error_message("answer y, yes, n, or no")
            .with_default(false)
            .prompt()?;

        Ok(answer)
    }
}

/// Scripted operator interaction.
///
/// Replays canned selections and confirmations in order. Lets automated
/// callers and tests drive resolution without a terminal.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSelector {
    selections: Vec<Selection>,
    confirmations: Vec<bool>,
}

impl ScriptedSelector {
    /// Construct selector that replays given selections in order.
    pub fn new(selections: impl IntoIterator<Item = Selection>) -> Self {
        Self {
            selections: selections.into_iter().collect(),
            confirmations: Vec::new(),
        }
    }

    /// Queue answers for yes/no questions, replayed in order.
    pub fn with_confirmations(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirmations = answers.into_iter().collect();
        self
    }
}

impl Selector for ScriptedSelector {
    fn select_destinations(
        &mut self,
        name: &str,
        _is_dir: bool,
        _candidates: &[Location],
    ) -> Result<Selection> {
        if self.selections.is_empty() {
            return Err(Error::ScriptExhausted {
                name: name.to_string(),
            });
        }

        Ok(self.selections.remove(0))
    }

    fn confirm(&mut self, _question: &str) -> Result<bool> {
        if self.confirmations.is_empty() {
            // Scripted runs continue past optional resources by default.
            return Ok(true);
        }

        Ok(self.confirmations.remove(0))
    }
}

/// Resolve every patch entry against the distribution index.
///
/// Decisions come back in stable name order. Warnings for unmatched and
/// mismatched entries are emitted here; the caller only sees the uniform
/// decision map.
///
/// # Errors
///
/// - Return [`Error::Cancelled`] if the operator cancels during ambiguity
///   selection. No partial decisions survive cancellation.
/// - Return [`Error::Prompt`] if terminal interaction itself fails.
#[instrument(skip_all, level = "debug")]
pub fn resolve(
    patch: &EntryIndex,
    dist: &EntryIndex,
    selector: &mut dyn Selector,
) -> Result<Resolution> {
    let mut decisions = BTreeMap::new();

    for (name, entry) in patch.iter() {
        // INVARIANT: The patch index is shallow, so each entry carries
        // exactly one top-level location whose flag is the patch-side type.
        let Some(origin) = entry.locations().next() else {
            continue;
        };

        let placement = match dist.get(name) {
            None => {
                warn!(
                    "no match for '{name}': nest it inside an existing \
                     directory so a destination can be inferred"
                );
                Placement::Unmatched
            }
            Some(found) => decide(name, origin.is_dir, found.locations(), selector)?,
        };

        decisions.insert(name.clone(), placement);
    }

    Ok(Resolution { decisions })
}

fn decide<'a>(
    name: &str,
    is_dir: bool,
    candidates: impl Iterator<Item = &'a Location>,
    selector: &mut dyn Selector,
) -> Result<Placement> {
    let (same_type, mismatched): (Vec<_>, Vec<_>) =
        candidates.cloned().partition(|location| location.is_dir == is_dir);

    for location in &mismatched {
        let patch_kind = if is_dir { "directory" } else { "file" };
        let dist_kind = if location.is_dir { "directory" } else { "file" };
        warn!(
            "'{name}' is a {patch_kind} in the patch but a {dist_kind} at {}, \
             candidate skipped",
            location.display_path()
        );
    }

    // Only same-type candidates participate in ambiguity counting.
    match same_type.as_slice() {
        [] => Ok(Placement::TypeMismatch(mismatched)),
        [only] => {
            info!("'{name}' -> {}", only.display_path());
            Ok(Placement::Auto(only.clone()))
        }
        _ => match selector.select_destinations(name, is_dir, &same_type)? {
            Selection::Cancelled => Err(Error::Cancelled),
            Selection::Chosen(indices) => {
                let chosen: Vec<Location> = indices
                    .into_iter()
                    .filter_map(|index| same_type.get(index).cloned())
                    .collect();
                for location in &chosen {
                    info!("'{name}' -> {}", location.display_path());
                }
                Ok(Placement::Selected(chosen))
            }
        },
    }
}

/// Parse one line of operator input against a candidate list.
///
/// Returns the accepted 1-based indices on failure so the re-prompt can
/// retain them.
fn parse_selection(line: &str, candidate_count: usize) -> std::result::Result<Selection, Vec<usize>> {
    let mut accepted: Vec<usize> = Vec::new();
    let mut valid = true;

    for token in line.split(',') {
        let token = token.trim();
        if token.is_empty() {
            valid = false;
            continue;
        }

        match token.parse::<usize>() {
            Ok(0) => return Ok(Selection::Cancelled),
            Ok(position) if position <= candidate_count => {
                if !accepted.contains(&position) {
                    accepted.push(position);
                }
            }
            _ => valid = false,
        }
    }

    if valid && !accepted.is_empty() {
        Ok(Selection::Chosen(
            accepted.into_iter().map(|position| position - 1).collect(),
        ))
    } else {
        Err(accepted)
    }
}

/// Placement resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operator cancelled the run during ambiguity selection.
    #[error("run cancelled by operator")]
    Cancelled,

    /// Terminal interaction failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Scripted selector ran out of canned selections.
    #[error("no scripted selection left for ambiguous entry '{name}'")]
    ScriptExhausted { name: String },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
