#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use regraft::model::{Cardinality, PropertyValue, ValueType};
use regraft::store::{GraphStore, GraphTxn, MemoryStore, PropertyKeyDef};
use tempfile::TempDir;

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

fn stderr_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

/// Writes a memory-backend descriptor plus a seeded store image and returns
/// the descriptor and image paths.
fn write_workspace(dir: &Path) -> (PathBuf, PathBuf) {
    let store = MemoryStore::new();
    let mut mgmt = store.manage().expect("manage");
    mgmt.define_property_key(PropertyKeyDef::new(
        "serial",
        ValueType::Str,
        Cardinality::Single,
    ))
    .expect("define");
    mgmt.commit().expect("commit schema");
    let mut txn = store.begin().expect("begin");
    for i in 0..4 {
        let id = txn.create_vertex("device").expect("vertex");
        txn.set_vertex_property(id, "serial", vec![PropertyValue::Str(format!("{}", 500 + i))])
            .expect("set");
    }
    txn.commit().expect("commit");

    let data_path = dir.join("store.json");
    fs::write(&data_path, store.to_json().expect("image")).expect("write image");

    let config_path = dir.join("migration.toml");
    fs::write(
        &config_path,
        "backend = \"memory\"\ndata = \"store.json\"\nsnapshot-dir = \"snapshots\"\n",
    )
    .expect("write config");
    (config_path, data_path)
}

#[test]
fn property_migrate_rejects_missing_arguments_with_usage() {
    let assert = Command::cargo_bin("property-migrate")
        .expect("binary")
        .args(["serial", "Long"])
        .assert()
        .failure()
        .code(1);
    assert!(stderr_of(assert).contains("Usage"));
}

#[test]
fn property_migrate_rejects_unknown_target_type() {
    let dir = TempDir::new().expect("tempdir");
    let (config, _) = write_workspace(dir.path());
    let assert = Command::cargo_bin("property-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "serial",
            "Float",
            "noIndex",
            "true",
            "false",
        ])
        .assert()
        .failure()
        .code(1);
    assert!(stderr_of(assert).contains("unsupported target type"));
}

#[test]
fn property_migrate_runs_end_to_end_after_the_countdown() {
    let dir = TempDir::new().expect("tempdir");
    let (config, data) = write_workspace(dir.path());
    let assert = Command::cargo_bin("property-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "serial",
            "Long",
            "index",
            "true",
            "false",
            "2",
        ])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .success();
    assert!(stdout_of(assert).contains("migrated 4 of 4 vertices"));

    let store =
        MemoryStore::from_json(&fs::read_to_string(&data).expect("image")).expect("reload");
    let txn = store.begin().expect("begin");
    let held = txn.vertices_with_property("serial").expect("scan");
    assert_eq!(held.len(), 4);
    assert_eq!(
        txn.vertex_property(held[0], "serial").expect("get"),
        vec![PropertyValue::Long(500)]
    );
}

#[test]
fn history_migrate_refuses_unique_index() {
    let dir = TempDir::new().expect("tempdir");
    let (config, _) = write_workspace(dir.path());
    let assert = Command::cargo_bin("history-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "serial",
            "String",
            "uniqueIndex",
            "true",
        ])
        .assert()
        .failure()
        .code(1);
    assert!(stderr_of(assert).contains("unsupported index kind"));
}

#[test]
fn history_migrate_moves_values_onto_list_cardinality() {
    let dir = TempDir::new().expect("tempdir");
    let (config, data) = write_workspace(dir.path());
    let assert = Command::cargo_bin("history-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "serial",
            "String",
            "index",
            "true",
        ])
        .assert()
        .success();
    assert!(stdout_of(assert).contains("list-cardinality"));

    let store =
        MemoryStore::from_json(&fs::read_to_string(&data).expect("image")).expect("reload");
    let mgmt = store.manage().expect("manage");
    let def = mgmt
        .property_key("serial")
        .expect("lookup")
        .expect("fresh definition");
    assert_eq!(def.cardinality, Cardinality::List);
}

#[test]
fn graph_migrate_lists_registered_migrations_without_mutating() {
    let dir = TempDir::new().expect("tempdir");
    let (config, data) = write_workspace(dir.path());
    let before = fs::read_to_string(&data).expect("image");
    let assert = Command::cargo_bin("graph-migrate")
        .expect("binary")
        .args(["-c", config.to_str().expect("utf8"), "-l"])
        .assert()
        .success();
    let stdout = stdout_of(assert);
    assert!(stdout.contains("reconcile-edge-rules"));
    assert!(stdout.contains("dedupe-cousin-edges"));
    assert!(stdout.contains("trim-name-whitespace"));
    assert_eq!(fs::read_to_string(&data).expect("image"), before);
}

#[test]
fn graph_migrate_commit_records_and_second_run_skips() {
    let dir = TempDir::new().expect("tempdir");
    let (config, _) = write_workspace(dir.path());
    let assert = Command::cargo_bin("graph-migrate")
        .expect("binary")
        .args(["-c", config.to_str().expect("utf8"), "--commit"])
        .assert()
        .success();
    assert!(stdout_of(assert).contains("committed"));

    let assert = Command::cargo_bin("graph-migrate")
        .expect("binary")
        .args(["-c", config.to_str().expect("utf8"), "--commit"])
        .assert()
        .success();
    assert!(stdout_of(assert).contains("skipped (already run)"));

    let snapshots: Vec<_> = fs::read_dir(dir.path().join("snapshots"))
        .expect("snapshot dir")
        .collect();
    assert!(!snapshots.is_empty(), "runs produce snapshot artifacts");
}

#[test]
fn graph_migrate_dry_run_persists_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let (config, data) = write_workspace(dir.path());
    let before = fs::read_to_string(&data).expect("image");
    let assert = Command::cargo_bin("graph-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "--skipPreMigrationSnapShot",
            "--skipPostMigrationSnapShot",
        ])
        .assert()
        .success();
    assert!(stdout_of(assert).contains("dry run"));
    assert_eq!(
        fs::read_to_string(&data).expect("image"),
        before,
        "dry run leaves the image untouched"
    );
}

#[test]
fn graph_migrate_loads_a_snapshot_artifact() {
    let dir = TempDir::new().expect("tempdir");
    let (config, data) = write_workspace(dir.path());
    let artifact = dir.path().join("preMigration.12345.json");
    fs::copy(&data, &artifact).expect("copy artifact");
    Command::cargo_bin("graph-migrate")
        .expect("binary")
        .args([
            "-c",
            config.to_str().expect("utf8"),
            "-d",
            artifact.to_str().expect("utf8"),
            "-l",
        ])
        .assert()
        .success();
}
