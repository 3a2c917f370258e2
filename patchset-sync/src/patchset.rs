//! Patch set: commit every changed tracked object to a remote store.
//!
//! ## Commit protocol (per tracked object)
//!
//! 1. Diff the main body (everything but `status`) against the snapshot.
//! 2. Diff the `status` aspect against the snapshot.
//! 3. Both empty → skip; no remote calls.
//! 4. Main diff → `patch`, guarded by the snapshot's version token.
//! 5. Status diff → `patch_status`, a separate call. When step 4 succeeded
//!    it is guarded by the token step 4 returned, otherwise by the snapshot's.
//! 6. Classify: NotFound on an object whose live copy carries a deletion
//!    marker is suppressed; everything else is surfaced.
//! 7. Surfaced failures from every object are combined into one
//!    [`AggregateError`]. One object's failure never stops the others.
//!
//! Objects are dispatched concurrently, bounded by
//! [`CommitOptions::concurrency`]. Writes already applied when the context is
//! cancelled stay applied.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use patchset_core::{
    Aspect, FailureKind, ObjectKey, RemoteStore, Resource, Shared, StoreError, Uid,
};

use crate::context::CommitContext;
use crate::diff::{self, ObjectDiff};
use crate::error::{AggregateError, PatchFailure, PlanError};
use crate::tracker::{TrackedEntry, Tracker};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Tuning for [`PatchSet::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    /// Maximum number of objects being written at once. Values below 1 are
    /// treated as 1.
    pub concurrency: usize,
    /// Applied on top of the caller's context.
    pub timeout: Option<Duration>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: None,
        }
    }
}

/// What happened to one tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No diff; nothing was sent.
    Skipped,
    MainPatched,
    StatusPatched,
    MainAndStatusPatched,
    /// Every write hit NotFound on an object already marked for deletion.
    AlreadyDeleted,
    /// Kind of the first surfaced failure; see [`AggregateError`] for all of them.
    Failed(FailureKind),
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed(_))
    }
}

/// Result for one tracked object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub key: ObjectKey,
    pub outcome: WriteOutcome,
    /// Write calls issued for this object.
    pub calls: usize,
}

/// Full result of a commit.
#[derive(Debug)]
pub struct CommitReport {
    pub entries: BTreeMap<Uid, EntryReport>,
    pub error: Option<AggregateError>,
}

impl CommitReport {
    pub fn outcome(&self, uid: &Uid) -> Option<WriteOutcome> {
        self.entries.get(uid).map(|e| e.outcome)
    }

    /// Total write calls issued across all objects.
    pub fn calls(&self) -> usize {
        self.entries.values().map(|e| e.calls).sum()
    }

    pub fn count(&self, predicate: impl Fn(&WriteOutcome) -> bool) -> usize {
        self.entries.values().filter(|e| predicate(&e.outcome)).count()
    }

    pub fn into_result(self) -> Result<(), AggregateError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A pending write computed without touching the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub uid: Uid,
    pub key: ObjectKey,
    pub diff: ObjectDiff,
    /// Unified YAML diff of both aspects.
    pub unified: String,
}

// ---------------------------------------------------------------------------
// PatchSet
// ---------------------------------------------------------------------------

/// A batch of tracked objects committed together against one store.
pub struct PatchSet<T, S> {
    store: S,
    tracker: Tracker<T>,
    options: CommitOptions,
}

impl<T: Resource, S: RemoteStore> PatchSet<T, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            tracker: Tracker::new(),
            options: CommitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CommitOptions) -> Self {
        self.options = options;
        self
    }

    /// Track `object` under its metadata uid. First registration wins.
    pub fn add(&mut self, object: Shared<T>) -> bool {
        let uid = object.read().uid().clone();
        self.tracker.add(uid, object)
    }

    /// Track `object` under an explicit identity. First registration wins.
    pub fn insert(&mut self, uid: Uid, object: Shared<T>) -> bool {
        self.tracker.add(uid, object)
    }

    /// Live handles by identity.
    pub fn objects(&self) -> HashMap<Uid, Shared<T>> {
        self.tracker.entries()
    }

    pub fn tracker(&self) -> &Tracker<T> {
        &self.tracker
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Pending writes for every changed object, ordered by key.
    pub fn plan(&self) -> Result<Vec<PlannedWrite>, PlanError> {
        let mut planned = Vec::new();
        for (uid, entry) in self.tracker.iter() {
            let live = entry.live().read().clone();
            let diff = diff::diff_object(entry.snapshot(), &live)?;
            if diff.is_empty() {
                continue;
            }
            let key = live.key();
            let (old_main, old_status) = diff::split_aspects(serde_json::to_value(entry.snapshot())?);
            let (new_main, new_status) = diff::split_aspects(serde_json::to_value(&live)?);
            let mut unified = diff::render_unified(&old_main, &new_main, &format!("{key}/main"))?;
            unified.push_str(&diff::render_unified(
                &old_status,
                &new_status,
                &format!("{key}/status"),
            )?);
            planned.push(PlannedWrite {
                uid: uid.clone(),
                key,
                diff,
                unified,
            });
        }
        planned.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(planned)
    }

    /// Commit every changed object and return the aggregate failure, if any.
    pub async fn apply(self, ctx: &CommitContext) -> Result<(), AggregateError> {
        self.commit(ctx).await.into_result()
    }

    /// Commit every changed object and report per-object outcomes.
    pub async fn commit(self, ctx: &CommitContext) -> CommitReport {
        let ctx = match self.options.timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };
        let concurrency = self.options.concurrency.max(1);

        let results: Vec<EntryResult> = stream::iter(self.tracker.iter())
            .map(|(uid, entry)| commit_entry(&self.store, &ctx, uid, entry))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut entries = BTreeMap::new();
        let mut failures = Vec::new();
        for result in results {
            failures.extend(result.failures);
            entries.insert(result.uid, result.report);
        }
        let report = CommitReport {
            entries,
            error: AggregateError::from_failures(failures),
        };

        tracing::info!(
            objects = report.entries.len(),
            calls = report.calls(),
            skipped = report.count(|o| *o == WriteOutcome::Skipped),
            failed = report.count(WriteOutcome::is_failed),
            "patch set committed"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Per-object protocol
// ---------------------------------------------------------------------------

struct EntryResult {
    uid: Uid,
    report: EntryReport,
    failures: Vec<PatchFailure>,
}

#[derive(Default)]
struct EntryProgress {
    calls: usize,
    main_patched: bool,
    status_patched: bool,
    suppressed: usize,
    failures: Vec<PatchFailure>,
}

async fn commit_entry<T: Resource, S: RemoteStore>(
    store: &S,
    ctx: &CommitContext,
    uid: &Uid,
    entry: &TrackedEntry<T>,
) -> EntryResult {
    let key = entry.live().read().key();
    let mut progress = EntryProgress::default();

    let diff = match entry.diff() {
        Ok(diff) => diff,
        Err(err) => {
            progress.failures.push(PatchFailure {
                uid: uid.clone(),
                key: key.clone(),
                aspect: Aspect::Main,
                error: StoreError::Json(err),
            });
            return finish(uid, key, progress);
        }
    };

    if diff.is_empty() {
        tracing::debug!(%uid, %key, "unchanged; skipping");
        return finish(uid, key, progress);
    }

    let mut version = entry.snapshot().meta().resource_version.clone();

    if let Some(patch) = &diff.main {
        progress.calls += 1;
        tracing::debug!(%uid, %key, %version, "patching main body");
        match guarded(ctx, store.patch(&key, patch, &version)).await {
            Ok(next) => {
                progress.main_patched = true;
                version = next;
            }
            Err(err) => classify(&mut progress, entry, uid, &key, Aspect::Main, err),
        }
    }

    if let Some(patch) = &diff.status {
        progress.calls += 1;
        tracing::debug!(%uid, %key, %version, "patching status");
        match guarded(ctx, store.patch_status(&key, patch, &version)).await {
            Ok(_) => progress.status_patched = true,
            Err(err) => classify(&mut progress, entry, uid, &key, Aspect::Status, err),
        }
    }

    finish(uid, key, progress)
}

/// Runs a store call unless the context is already done, abandoning it if the
/// context finishes first.
async fn guarded<F>(ctx: &CommitContext, call: F) -> Result<String, StoreError>
where
    F: Future<Output = Result<String, StoreError>>,
{
    if let Some(err) = ctx.err() {
        return Err(err);
    }
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        result = call => result,
    }
}

fn classify<T: Resource>(
    progress: &mut EntryProgress,
    entry: &TrackedEntry<T>,
    uid: &Uid,
    key: &ObjectKey,
    aspect: Aspect,
    error: StoreError,
) {
    // The deletion marker is read at the time of the failing call.
    if error.is_not_found() && entry.is_deleting() {
        tracing::debug!(%uid, %key, %aspect, "object already being deleted; ignoring not-found");
        progress.suppressed += 1;
        return;
    }
    tracing::warn!(%uid, %key, %aspect, error = %error, "patch failed");
    progress.failures.push(PatchFailure {
        uid: uid.clone(),
        key: key.clone(),
        aspect,
        error,
    });
}

fn finish(uid: &Uid, key: ObjectKey, progress: EntryProgress) -> EntryResult {
    let outcome = match progress.failures.first() {
        Some(failure) => WriteOutcome::Failed(failure.kind()),
        None => match (progress.main_patched, progress.status_patched) {
            (true, true) => WriteOutcome::MainAndStatusPatched,
            (true, false) => WriteOutcome::MainPatched,
            (false, true) => WriteOutcome::StatusPatched,
            (false, false) if progress.suppressed > 0 => WriteOutcome::AlreadyDeleted,
            (false, false) => WriteOutcome::Skipped,
        },
    };
    EntryResult {
        uid: uid.clone(),
        report: EntryReport {
            key,
            outcome,
            calls: progress.calls,
        },
        failures: progress.failures,
    }
}

