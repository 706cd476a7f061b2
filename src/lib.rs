// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconcile patch files against a software distribution and assemble
//! portable update archives.
//!
//! A __patch__ is a loosely-organized set of changed files whose author does
//! not know the distribution's internal directory layout in advance.
//! Patchpack indexes both trees by entry name, resolves name collisions
//! through deterministic auto-resolution or interactive selection, flags
//! files silently introduced inside matched directories, and assembles a
//! deterministically-laid-out archive with normalized, cross-platform paths.
//!
//! The library reports failures as error values; only the binary decides to
//! terminate the process and pick an exit code.

pub mod archive;
pub mod descriptor;
pub mod diff;
pub mod index;
pub mod pipeline;
pub mod resolve;
pub mod stage;

pub use archive::DistSource;
pub use descriptor::Descriptor;
pub use index::{Entry, EntryIndex, IndexDepth, Location};
pub use pipeline::{CreateSummary, Pipeline, ValidationReport};
pub use resolve::{ConsoleSelector, Placement, Resolution, ScriptedSelector, Selection, Selector};
pub use stage::StagingTree;
