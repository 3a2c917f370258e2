//! # patchset-sync
//!
//! Batched, diff-gated writes of tracked objects to a versioned store.
//!
//! Register objects with [`PatchSet::add`], mutate them through their
//! [`Shared`](patchset_core::Shared) handles, then call [`PatchSet::apply`]
//! once. Only objects whose main body or status changed are written, each
//! aspect through its own call.

pub mod context;
pub mod diff;
pub mod error;
pub mod patchset;
pub mod tracker;

pub use context::{CancelHandle, CommitContext};
pub use error::{AggregateError, PatchFailure, PlanError};
pub use patchset::{
    CommitOptions, CommitReport, EntryReport, PatchSet, PlannedWrite, WriteOutcome,
};
pub use tracker::{TrackedEntry, Tracker};
