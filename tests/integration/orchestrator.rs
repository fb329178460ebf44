#![allow(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

use regraft::engine::{MigrationError, Result as EngineResult};
use regraft::model::{Cardinality, PropertyValue, ValueType, VertexId};
use regraft::notify::{EventKind, NotificationSink, NotifyError, VertexEvent};
use regraft::orchestrator::{
    self, Migration, MigrationContext, MigrationRegistry, MigrationStatus, Outcome, RunOptions,
};
use regraft::rules::RuleCatalog;
use regraft::snapshot::JsonSnapshotService;
use regraft::store::{GraphStore, GraphTxn, MemoryStore, PropertyKeyDef};
use tempfile::TempDir;

const FLAG_KEY: &str = "flagged";

/// Store with a `flagged` key and one `device` vertex.
fn seeded_store() -> (MemoryStore, VertexId) {
    let store = MemoryStore::new();
    let mut mgmt = store.manage().expect("manage");
    mgmt.define_property_key(PropertyKeyDef::new(
        FLAG_KEY,
        ValueType::Bool,
        Cardinality::Single,
    ))
    .expect("define");
    mgmt.commit().expect("commit schema");
    let mut txn = store.begin().expect("begin");
    let device = txn.create_vertex("device").expect("device");
    txn.commit().expect("commit");
    (store, device)
}

/// Migration that flags the device vertex and reports a fixed outcome.
struct FlagDevice {
    device: VertexId,
    outcome: Outcome,
    notify: bool,
}

impl Migration for FlagDevice {
    fn run(&mut self, ctx: &mut MigrationContext<'_>) -> EngineResult<Outcome> {
        ctx.txn
            .set_vertex_property(self.device, FLAG_KEY, vec![PropertyValue::Bool(true)])?;
        if self.notify {
            let vertex = ctx.txn.vertex(self.device)?.expect("device");
            let _ = ctx.notifications.publish(VertexEvent {
                kind: EventKind::Update,
                vertex,
                related: Vec::new(),
            });
        }
        Ok(self.outcome)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<VertexEvent>,
}

impl NotificationSink for RecordingSink {
    fn publish(&mut self, event: VertexEvent) -> Result<(), NotifyError> {
        self.events.push(event);
        Ok(())
    }
}

fn snapshots(dir: &TempDir, store: &MemoryStore) -> JsonSnapshotService {
    JsonSnapshotService::new(dir.path().join("snapshots"), store.clone())
}

fn commit_options() -> RunOptions {
    RunOptions {
        commit: true,
        ..RunOptions::default()
    }
}

fn flagged(store: &MemoryStore, device: VertexId) -> bool {
    let txn = store.begin().expect("begin");
    txn.vertex_property(device, FLAG_KEY)
        .expect("get")
        .contains(&PropertyValue::Bool(true))
}

#[test]
fn successful_migration_commits_and_is_skipped_on_rerun() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: false,
        }))
    });

    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");
    assert_eq!(report.results[0].status, MigrationStatus::Succeeded);
    assert!(flagged(&store, device));

    // Second run: the ledger gates it, and nothing else changes.
    let before = store.to_json().expect("image");
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("rerun");
    assert_eq!(report.results[0].status, MigrationStatus::SkippedAlreadyRun);
    assert_eq!(store.to_json().expect("image"), before, "no additional change");
}

#[test]
fn force_reruns_a_recorded_migration() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: false,
        }))
    });
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");

    let options = RunOptions {
        force: true,
        ..commit_options()
    };
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &options,
    )
    .expect("forced rerun");
    assert_eq!(report.results[0].status, MigrationStatus::Succeeded);
}

#[test]
fn failure_rolls_back_data_and_ledger() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Failure,
            notify: false,
        }))
    });
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");

    assert_eq!(report.results[0].status, MigrationStatus::Failed);
    assert!(!flagged(&store, device), "mutation rolled back");

    // The would-be ledger entry rolled back with it: a later run attempts
    // the migration again (and fails again) rather than skipping it.
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("rerun");
    assert_eq!(report.results[0].status, MigrationStatus::Failed);
}

#[test]
fn dry_run_rolls_back_but_reports_success() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: true,
        }))
    });
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let options = RunOptions::default(); // no commit
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &options,
    )
    .expect("run");

    assert_eq!(report.results[0].status, MigrationStatus::SucceededDryRun);
    assert!(!flagged(&store, device), "dry run persists nothing");
    assert!(sink.events.is_empty(), "queued notifications are dropped");
}

#[test]
fn committed_run_flushes_queued_notifications() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: true,
        }))
    });
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");

    assert_eq!(sink.events.len(), 1);
    assert_eq!(sink.events[0].kind, EventKind::Update);
}

#[test]
fn check_logs_rolls_back_and_continues() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    struct Trace {
        label: &'static str,
        order: Rc<RefCell<Vec<&'static str>>>,
        outcome: Outcome,
    }
    impl Migration for Trace {
        fn run(&mut self, _ctx: &mut MigrationContext<'_>) -> EngineResult<Outcome> {
            self.order.borrow_mut().push(self.label);
            Ok(self.outcome)
        }
    }

    let mut registry = MigrationRegistry::new();
    let o = order.clone();
    registry.register("suspect", 5, true, move || {
        Ok(Box::new(Trace {
            label: "suspect",
            order: o.clone(),
            outcome: Outcome::CheckLogs,
        }))
    });
    let o = order.clone();
    registry.register("follow-up", 10, true, move || {
        Ok(Box::new(Trace {
            label: "follow-up",
            order: o.clone(),
            outcome: Outcome::Success,
        }))
    });

    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");

    assert_eq!(report.results[0].status, MigrationStatus::CheckLogs);
    assert_eq!(report.results[1].status, MigrationStatus::Succeeded);
    assert_eq!(*order.borrow(), vec!["suspect", "follow-up"]);
    let _ = device;
}

#[test]
fn construction_failure_skips_without_aborting_the_batch() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("broken", 1, true, || {
        Err(MigrationError::Precondition("no such table".into()))
    });
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: false,
        }))
    });
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");

    assert_eq!(
        report.results[0].status,
        MigrationStatus::SkippedConstructFailed
    );
    assert_eq!(report.results[1].status, MigrationStatus::Succeeded);
    assert!(flagged(&store, device));
}

#[test]
fn selection_and_exclusion_gates_apply() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("wanted", 1, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: false,
        }))
    });
    registry.register("unwanted", 2, true, || {
        Ok(Box::new(Noop))
    });
    registry.register("dormant", 3, false, || Ok(Box::new(Noop)));

    struct Noop;
    impl Migration for Noop {
        fn run(&mut self, _ctx: &mut MigrationContext<'_>) -> EngineResult<Outcome> {
            Ok(Outcome::Success)
        }
    }

    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let options = RunOptions {
        only: vec!["wanted".into(), "dormant".into()],
        exclude: vec!["unwanted".into()],
        run_disabled: vec!["dormant".into()],
        ..commit_options()
    };
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &options,
    )
    .expect("run");

    assert_eq!(report.results[0].status, MigrationStatus::Succeeded);
    assert_eq!(report.results[1].status, MigrationStatus::SkippedNotSelected);
    assert_eq!(report.results[2].status, MigrationStatus::Succeeded, "runDisabled overrides");
}

#[test]
fn disabled_migrations_are_skipped_by_default() {
    let (store, _device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    struct Noop;
    impl Migration for Noop {
        fn run(&mut self, _ctx: &mut MigrationContext<'_>) -> EngineResult<Outcome> {
            Ok(Outcome::Success)
        }
    }
    registry.register("dormant", 1, false, || Ok(Box::new(Noop)));
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");
    assert_eq!(report.results[0].status, MigrationStatus::SkippedDisabled);
}

#[test]
fn snapshots_bracket_the_run_unless_skipped() {
    let (store, _device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let registry = MigrationRegistry::new();
    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();

    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");
    let pre = report.pre_snapshot.expect("pre snapshot");
    let post = report.post_snapshot.expect("post snapshot");
    assert!(pre.exists());
    assert!(post.exists());

    let options = RunOptions {
        skip_pre_snapshot: true,
        skip_post_snapshot: true,
        ..commit_options()
    };
    let report = orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &options,
    )
    .expect("run");
    assert!(report.pre_snapshot.is_none());
    assert!(report.post_snapshot.is_none());
}

#[test]
fn list_reports_gating_state_without_running() {
    let (store, device) = seeded_store();
    let dir = TempDir::new().expect("tempdir");
    let mut registry = MigrationRegistry::new();
    registry.register("flag-device", 10, true, move || {
        Ok(Box::new(FlagDevice {
            device,
            outcome: Outcome::Success,
            notify: false,
        }))
    });
    registry.register("dormant", 20, false, || {
        Err(MigrationError::Precondition("never built".into()))
    });

    let entries = orchestrator::list(&store, &registry).expect("list");
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].already_run);
    assert!(!entries[1].enabled);
    assert!(!flagged(&store, device), "listing never runs migrations");

    let service = snapshots(&dir, &store);
    let mut sink = RecordingSink::default();
    orchestrator::run(
        &store,
        &registry,
        &RuleCatalog::default(),
        &service,
        &mut sink,
        &commit_options(),
    )
    .expect("run");
    let entries = orchestrator::list(&store, &registry).expect("list");
    assert!(entries[0].already_run);
}
