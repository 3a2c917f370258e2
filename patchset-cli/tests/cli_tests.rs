use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn patchset_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("patchset"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

const STORE: &str = r#"
- apiVersion: v1
  kind: Release
  metadata:
    name: web
    namespace: prod
    uid: uid-web
    resourceVersion: "3"
    labels:
      tier: frontend
  spec:
    version: 1.15.6
- apiVersion: v1
  kind: Release
  metadata:
    name: db
    namespace: prod
    uid: uid-db
    resourceVersion: "7"
  spec:
    version: 1.16.0
"#;

fn write_store(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("store.yaml");
    fs::write(&path, STORE).expect("write store");
    path
}

fn write_edits(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("edits.yaml");
    fs::write(&path, yaml).expect("write edits");
    path
}

fn load(path: &Path) -> serde_yaml::Value {
    serde_yaml::from_str(&fs::read_to_string(path).expect("read store")).expect("parse store")
}

fn find<'a>(objects: &'a serde_yaml::Value, name: &str) -> &'a serde_yaml::Value {
    objects
        .as_sequence()
        .expect("list")
        .iter()
        .find(|o| o["metadata"]["name"].as_str() == Some(name))
        .expect("object present")
}

// ---------------------------------------------------------------------------
// catalog
// ---------------------------------------------------------------------------

#[test]
fn catalog_upsert_list_get_delete() {
    let home = TempDir::new().expect("home");

    patchset_cmd(home.path())
        .args([
            "catalog", "upsert", "kubectl-tree", "--version", "v0.4.3", "--group", "observe",
            "--alias", "tree",
        ])
        .assert()
        .success()
        .stdout(contains("Saved plugin 'kubectl-tree'"));
    patchset_cmd(home.path())
        .args(["catalog", "upsert", "apply-all", "--version", "v1.0.0"])
        .assert()
        .success();

    assert!(home.path().join(".patchset/catalog.yaml").exists());

    patchset_cmd(home.path())
        .args(["catalog", "list"])
        .assert()
        .success()
        .stdout(contains("kubectl-tree").and(contains("apply-all")).and(contains("Observe")));

    let output = patchset_cmd(home.path())
        .args(["catalog", "get", "kubectl-tree", "--json"])
        .output()
        .expect("run get");
    assert!(output.status.success());
    let plugin: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(plugin["version"], "v0.4.3");
    assert_eq!(plugin["aliases"][0], "tree");

    patchset_cmd(home.path())
        .args(["catalog", "delete", "kubectl-tree"])
        .assert()
        .success()
        .stdout(contains("Deleted plugin"));
    patchset_cmd(home.path())
        .args(["catalog", "get", "kubectl-tree"])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn catalog_list_json_is_sorted_by_name() {
    let home = TempDir::new().expect("home");
    for name in ["zeta", "alpha", "mid"] {
        patchset_cmd(home.path())
            .args(["catalog", "upsert", name, "--version", "1"])
            .assert()
            .success();
    }

    let output = patchset_cmd(home.path())
        .args(["catalog", "list", "--json"])
        .output()
        .expect("run list");
    let plugins: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).expect("json");
    let names: Vec<_> = plugins.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["alpha", "mid", "zeta"]);
}

#[test]
fn catalog_delete_unknown_is_not_an_error() {
    let home = TempDir::new().expect("home");
    patchset_cmd(home.path())
        .args(["catalog", "delete", "ghost"])
        .assert()
        .success()
        .stdout(contains("nothing to do"));
}

#[test]
fn catalog_rejects_unknown_group() {
    let home = TempDir::new().expect("home");
    patchset_cmd(home.path())
        .args(["catalog", "upsert", "x", "--version", "1", "--group", "bogus"])
        .assert()
        .failure()
        .stderr(contains("unknown plugin group"));
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

#[test]
fn apply_dry_run_prints_diff_and_leaves_store_untouched() {
    let home = TempDir::new().expect("home");
    let dir = TempDir::new().expect("workdir");
    let store = write_store(&dir);
    let edits = write_edits(
        &dir,
        "- name: web\n  namespace: prod\n  labels:\n    tier: edge\n",
    );

    patchset_cmd(home.path())
        .arg("apply")
        .arg(&store)
        .arg("--edits")
        .arg(&edits)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(
            contains("[dry-run] Would patch prod/web")
                .and(contains("-    tier: frontend"))
                .and(contains("+    tier: edge"))
                .and(contains("1 object(s) would be patched")),
        );

    assert_eq!(fs::read_to_string(&store).expect("store"), STORE);
}

#[test]
fn apply_dry_run_without_changes_reports_nothing() {
    let home = TempDir::new().expect("home");
    let dir = TempDir::new().expect("workdir");
    let store = write_store(&dir);
    let edits = write_edits(
        &dir,
        "- name: web\n  namespace: prod\n  labels:\n    tier: frontend\n",
    );

    patchset_cmd(home.path())
        .arg("apply")
        .arg(&store)
        .arg("--edits")
        .arg(&edits)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(contains("[dry-run] No changes."));
}

#[test]
fn apply_patches_only_edited_objects() {
    let home = TempDir::new().expect("home");
    let dir = TempDir::new().expect("workdir");
    let store = write_store(&dir);
    let edits = write_edits(
        &dir,
        r#"
- name: web
  namespace: prod
  labels:
    tier: null
    owner: team-a
  conditions:
    - type: Ready
      status: "True"
      reason: Deployed
- name: db
  namespace: prod
  labels: {}
"#,
    );

    patchset_cmd(home.path())
        .arg("apply")
        .arg(&store)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .success()
        .stdout(
            contains("prod/web")
                .and(contains("patched + status"))
                .and(contains("unchanged"))
                .and(contains("2 write call(s) across 2 object(s)")),
        );

    let objects = load(&store);
    let web = find(&objects, "web");
    assert_eq!(web["metadata"]["labels"]["owner"].as_str(), Some("team-a"));
    assert!(web["metadata"]["labels"].get("tier").is_none());
    assert_eq!(web["status"]["conditions"][0]["type"].as_str(), Some("Ready"));
    assert_eq!(web["status"]["conditions"][0]["status"].as_str(), Some("True"));
    assert_eq!(web["metadata"]["resourceVersion"].as_str(), Some("5"));

    let db = find(&objects, "db");
    assert_eq!(db["metadata"]["resourceVersion"].as_str(), Some("7"));
}

#[test]
fn apply_fails_for_object_missing_from_store() {
    let home = TempDir::new().expect("home");
    let dir = TempDir::new().expect("workdir");
    let store = write_store(&dir);
    let edits = write_edits(&dir, "- name: ghost\n  labels:\n    a: b\n");

    patchset_cmd(home.path())
        .arg("apply")
        .arg(&store)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .failure()
        .stderr(contains("cannot edit ghost"));

    assert_eq!(fs::read_to_string(&store).expect("store"), STORE);
}

#[test]
fn apply_reports_unparseable_edits_file() {
    let home = TempDir::new().expect("home");
    let dir = TempDir::new().expect("workdir");
    let store = write_store(&dir);
    let edits = write_edits(&dir, "not: [a list");

    patchset_cmd(home.path())
        .arg("apply")
        .arg(&store)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .failure()
        .stderr(contains("failed to parse edits file"));
}
