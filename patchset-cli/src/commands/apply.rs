//! `patchset apply <store.yaml> --edits <edits.yaml>`
//!
//! # Edits file
//!
//! ```yaml
//! - name: web
//!   namespace: prod          # optional
//!   labels:
//!     tier: frontend
//!     legacy: null           # null removes the key
//!   annotations:
//!     owner: team-a
//!   conditions:
//!     - type: Ready
//!       status: "True"
//!       reason: Deployed
//! ```
//!
//! Every named object is read from the store file, tracked, edited in place,
//! and then committed (or diffed with `--dry-run`). Only objects whose edits
//! changed something produce write calls.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use patchset_core::{
    load_store_file, save_store_file, shared, Condition, ConditionStatus, DynamicObject,
    MemoryStore, ObjectKey, Shared, Uid,
};
use patchset_sync::{CommitContext, CommitOptions, CommitReport, PatchSet, WriteOutcome};

/// Arguments for `patchset apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Store file: a YAML list of objects. Rewritten after a commit.
    pub store: PathBuf,

    /// Edits file describing label, annotation, and condition changes.
    #[arg(long)]
    pub edits: PathBuf,

    /// Print the pending diffs without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Abort outstanding writes after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum number of objects written at once.
    #[arg(long, default_value_t = CommitOptions::default().concurrency)]
    pub concurrency: usize,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let store = Arc::new(
            load_store_file(&self.store)
                .with_context(|| format!("failed to load store file {}", self.store.display()))?,
        );
        let edits = read_edits(&self.edits)?;

        let options = CommitOptions {
            concurrency: self.concurrency,
            timeout: self.timeout.map(Duration::from_secs),
        };
        let mut patch_set = PatchSet::new(store.clone()).with_options(options);
        let mut handles: HashMap<ObjectKey, Shared<DynamicObject>> = HashMap::new();

        for edit in &edits {
            let key = edit.key();
            let handle = match handles.get(&key) {
                Some(handle) => handle.clone(),
                None => {
                    let object: DynamicObject = store
                        .get_typed(&key)
                        .with_context(|| format!("cannot edit {key}: not in store file"))?;
                    let uid = if object.metadata.uid.0.is_empty() {
                        Uid::from(key.to_string())
                    } else {
                        object.metadata.uid.clone()
                    };
                    let handle = shared(object);
                    patch_set.insert(uid, handle.clone());
                    handles.insert(key.clone(), handle.clone());
                    handle
                }
            };
            edit.apply_to(&mut handle.write())
                .with_context(|| format!("failed to edit {key}"))?;
        }

        if self.dry_run {
            return print_plan(&patch_set);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let report = runtime.block_on(patch_set.commit(&CommitContext::background()));

        print_report(&report);
        save_store_file(&self.store, &store)
            .with_context(|| format!("failed to save store file {}", self.store.display()))?;

        if let Some(err) = report.error {
            for failure in err.failures() {
                eprintln!("{} {failure}", "✗".red().bold());
            }
            bail!("{} write(s) failed", err.len());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ObjectEdit {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, Option<String>>,
    #[serde(default)]
    annotations: BTreeMap<String, Option<String>>,
    #[serde(default)]
    conditions: Vec<ConditionEdit>,
}

#[derive(Debug, Deserialize)]
struct ConditionEdit {
    #[serde(rename = "type")]
    type_: String,
    status: ConditionStatus,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ObjectEdit {
    fn key(&self) -> ObjectKey {
        match &self.namespace {
            Some(namespace) => ObjectKey::namespaced(namespace, &self.name),
            None => ObjectKey::named(&self.name),
        }
    }

    fn apply_to(&self, object: &mut DynamicObject) -> Result<()> {
        apply_map(&mut object.metadata.labels, &self.labels);
        apply_map(&mut object.metadata.annotations, &self.annotations);
        for edit in &self.conditions {
            let mut condition = Condition::new(&edit.type_, edit.status);
            condition.reason = edit.reason.clone();
            condition.message = edit.message.clone();
            object
                .set_condition(condition)
                .context("failed to encode status conditions")?;
        }
        Ok(())
    }
}

fn apply_map(target: &mut BTreeMap<String, String>, edits: &BTreeMap<String, Option<String>>) {
    for (key, value) in edits {
        match value {
            Some(value) => {
                target.insert(key.clone(), value.clone());
            }
            None => {
                target.remove(key);
            }
        }
    }
}

fn read_edits(path: &Path) -> Result<Vec<ObjectEdit>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read edits file {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse edits file {}", path.display()))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_plan(patch_set: &PatchSet<DynamicObject, Arc<MemoryStore>>) -> Result<()> {
    let planned = patch_set.plan().context("failed to compute diffs")?;
    if planned.is_empty() {
        println!("[dry-run] No changes.");
        return Ok(());
    }
    for write in &planned {
        println!("[dry-run] Would patch {}", write.key);
        print!("{}", write.unified);
    }
    println!("[dry-run] {} object(s) would be patched.", planned.len());
    Ok(())
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "object")]
    object: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "calls")]
    calls: usize,
}

fn print_report(report: &CommitReport) {
    let mut rows: Vec<OutcomeRow> = report
        .entries
        .values()
        .map(|entry| OutcomeRow {
            object: entry.key.to_string(),
            outcome: outcome_label(entry.outcome),
            calls: entry.calls,
        })
        .collect();
    rows.sort_by(|a, b| a.object.cmp(&b.object));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} write call(s) across {} object(s)",
        report.calls(),
        report.entries.len()
    );
}

fn outcome_label(outcome: WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Skipped => "unchanged".dimmed().to_string(),
        WriteOutcome::MainPatched => "patched".green().to_string(),
        WriteOutcome::StatusPatched => "status patched".green().to_string(),
        WriteOutcome::MainAndStatusPatched => "patched + status".green().to_string(),
        WriteOutcome::AlreadyDeleted => "already deleted".yellow().to_string(),
        WriteOutcome::Failed(kind) => format!("failed ({kind})").red().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> DynamicObject {
        let mut object = DynamicObject::default();
        object.metadata.name = "web".into();
        object.metadata.labels.insert("legacy".into(), "yes".into());
        object
    }

    #[test]
    fn null_label_removes_and_value_sets() {
        let edits: Vec<ObjectEdit> = serde_yaml::from_str(
            "- name: web\n  labels:\n    tier: frontend\n    legacy: null\n",
        )
        .unwrap();
        let mut obj = object();
        edits[0].apply_to(&mut obj).unwrap();

        assert_eq!(obj.metadata.labels.get("tier").map(String::as_str), Some("frontend"));
        assert!(!obj.metadata.labels.contains_key("legacy"));
    }

    #[test]
    fn condition_edit_lands_in_status() {
        let edits: Vec<ObjectEdit> = serde_yaml::from_str(
            "- name: web\n  namespace: prod\n  conditions:\n    - type: Ready\n      status: \"True\"\n      reason: Deployed\n",
        )
        .unwrap();
        assert_eq!(edits[0].key(), ObjectKey::namespaced("prod", "web"));

        let mut obj = object();
        edits[0].apply_to(&mut obj).unwrap();
        let conditions = obj.conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].reason.as_deref(), Some("Deployed"));
    }
}
