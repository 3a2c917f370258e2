//! Error types for patchset-sync.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use patchset_core::{Aspect, FailureKind, ObjectKey, StoreError, Uid};

/// One failed write call.
#[derive(Debug)]
pub struct PatchFailure {
    pub uid: Uid,
    pub key: ObjectKey,
    pub aspect: Aspect,
    pub error: StoreError,
}

impl PatchFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

impl fmt::Display for PatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} patch of {} (uid {}) failed: {}",
            self.aspect, self.key, self.uid, self.error
        )
    }
}

/// Every surfaced failure from one commit, keyed by object identity.
///
/// Iteration order is by identity, never by completion order.
#[derive(Debug, Error)]
#[error("{}", summarize(.failures))]
pub struct AggregateError {
    failures: BTreeMap<Uid, Vec<PatchFailure>>,
}

impl AggregateError {
    /// `None` when `failures` is empty.
    pub fn from_failures(failures: impl IntoIterator<Item = PatchFailure>) -> Option<Self> {
        let mut grouped = BTreeMap::<Uid, Vec<PatchFailure>>::new();
        for failure in failures {
            grouped.entry(failure.uid.clone()).or_default().push(failure);
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|f| f.aspect);
        }
        (!grouped.is_empty()).then_some(Self { failures: grouped })
    }

    /// Number of failed write calls.
    pub fn len(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PatchFailure> {
        self.failures.values().flatten()
    }

    pub fn for_uid(&self, uid: &Uid) -> &[PatchFailure] {
        self.failures.get(uid).map(Vec::as_slice).unwrap_or_default()
    }

    /// Identities with at least one failure.
    pub fn uids(&self) -> impl Iterator<Item = &Uid> {
        self.failures.keys()
    }

    pub fn kinds(&self) -> BTreeSet<FailureKind> {
        self.failures().map(PatchFailure::kind).collect()
    }

    pub fn contains(&self, kind: FailureKind) -> bool {
        self.failures().any(|f| f.kind() == kind)
    }

    /// Whether every failure is of `kind`.
    pub fn only(&self, kind: FailureKind) -> bool {
        self.failures().all(|f| f.kind() == kind)
    }

    /// Drops failures matching `predicate`; `None` if nothing remains.
    pub fn filter_out(self, predicate: impl Fn(&PatchFailure) -> bool) -> Option<Self> {
        Self::from_failures(self.into_failures().into_iter().filter(|f| !predicate(f)))
    }

    pub fn into_failures(self) -> Vec<PatchFailure> {
        self.failures.into_values().flatten().collect()
    }
}

/// Failure to compute a dry-run plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to serialize object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to render diff: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn summarize(failures: &BTreeMap<Uid, Vec<PatchFailure>>) -> String {
    let all: Vec<String> = failures.values().flatten().map(ToString::to_string).collect();
    match all.as_slice() {
        [single] => single.clone(),
        many => format!("{} patches failed: [{}]", many.len(), many.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(uid: &str, aspect: Aspect, error: StoreError) -> PatchFailure {
        PatchFailure {
            uid: Uid::from(uid),
            key: ObjectKey::named(uid),
            aspect,
            error,
        }
    }

    fn conflict(uid: &str) -> StoreError {
        StoreError::Conflict {
            key: ObjectKey::named(uid),
            message: "stale".into(),
        }
    }

    #[test]
    fn empty_input_is_none() {
        assert!(AggregateError::from_failures(Vec::new()).is_none());
    }

    #[test]
    fn groups_by_uid_in_identity_order() {
        let err = AggregateError::from_failures(vec![
            failure("b", Aspect::Status, conflict("b")),
            failure("a", Aspect::Main, StoreError::Other("boom".into())),
            failure("b", Aspect::Main, conflict("b")),
        ])
        .expect("non-empty");

        assert_eq!(err.len(), 3);
        let uids: Vec<_> = err.uids().map(|u| u.0.as_str()).collect();
        assert_eq!(uids, ["a", "b"]);
        let b_aspects: Vec<_> = err.for_uid(&Uid::from("b")).iter().map(|f| f.aspect).collect();
        assert_eq!(b_aspects, [Aspect::Main, Aspect::Status]);
        assert!(err.for_uid(&Uid::from("zzz")).is_empty());
    }

    #[test]
    fn filter_out_conflicts_leaves_nothing_when_only_conflicts() {
        let err = AggregateError::from_failures(vec![failure("a", Aspect::Main, conflict("a"))])
            .expect("non-empty");
        assert!(err.only(FailureKind::Conflict));
        assert!(err.filter_out(|f| f.error.is_conflict()).is_none());
    }

    #[test]
    fn display_single_and_many() {
        let one = AggregateError::from_failures(vec![failure("a", Aspect::Main, conflict("a"))])
            .expect("non-empty");
        assert_eq!(
            one.to_string(),
            "main patch of a (uid a) failed: conflict on a: stale"
        );

        let two = AggregateError::from_failures(vec![
            failure("a", Aspect::Main, conflict("a")),
            failure("b", Aspect::Status, StoreError::Cancelled),
        ])
        .expect("non-empty");
        let msg = two.to_string();
        assert!(msg.starts_with("2 patches failed"), "got: {msg}");
        assert!(msg.contains("operation cancelled"));
    }
}
