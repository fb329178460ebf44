//! The migration runner: discovery, gating, execution, and the commit or
//! rollback of each selected migration as one atomic unit.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::Result;
use crate::notify::{BufferedSink, NotificationSink};
use crate::orchestrator::ledger;
use crate::orchestrator::registry::{MigrationContext, MigrationRegistry, Outcome};
use crate::rules::RuleCatalog;
use crate::snapshot::{SnapshotPhase, SnapshotService};
use crate::store::GraphStore;

/// Selection and commit options for one orchestrator run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run only these names (empty means all).
    pub only: Vec<String>,
    /// Never run these names.
    pub exclude: Vec<String>,
    /// Run these names even when their registry entry is disabled.
    pub run_disabled: Vec<String>,
    /// Ignore the ledger and re-run recorded migrations.
    pub force: bool,
    /// Actually persist; without this every migration rolls back (dry run).
    pub commit: bool,
    /// Skip the snapshot before the first migration.
    pub skip_pre_snapshot: bool,
    /// Skip the snapshot after the last migration.
    pub skip_post_snapshot: bool,
}

/// Terminal state of one migration within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MigrationStatus {
    /// Ledger already records this migration.
    SkippedAlreadyRun,
    /// Registry entry is disabled and was not explicitly run.
    SkippedDisabled,
    /// Not in the requested `only` set.
    SkippedNotSelected,
    /// In the requested `exclude` set.
    SkippedExcluded,
    /// Constructing the migration failed.
    SkippedConstructFailed,
    /// Ran, reported success, committed, recorded.
    Succeeded,
    /// Ran, reported success, rolled back because the run was dry.
    SucceededDryRun,
    /// Ran and reported failure, or raised an error: rolled back.
    Failed,
    /// Ran and asked for log inspection: rolled back.
    CheckLogs,
}

impl MigrationStatus {
    fn describe(&self) -> &'static str {
        match self {
            MigrationStatus::SkippedAlreadyRun => "skipped: already run",
            MigrationStatus::SkippedDisabled => "skipped: disabled",
            MigrationStatus::SkippedNotSelected => "skipped: not selected",
            MigrationStatus::SkippedExcluded => "skipped: excluded",
            MigrationStatus::SkippedConstructFailed => "skipped: construction failed",
            MigrationStatus::Succeeded => "succeeded: committed",
            MigrationStatus::SucceededDryRun => "succeeded: rolled back (dry run)",
            MigrationStatus::Failed => "failed: rolled back",
            MigrationStatus::CheckLogs => "check logs: rolled back",
        }
    }
}

/// One line of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Migration name.
    pub name: String,
    /// Terminal state.
    pub status: MigrationStatus,
    /// Error or context detail, when there is one.
    pub detail: Option<String>,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One entry per registered migration, in execution order.
    pub results: Vec<MigrationResult>,
    /// Artifact path of the pre-run snapshot, when taken.
    pub pre_snapshot: Option<PathBuf>,
    /// Artifact path of the post-run snapshot, when taken.
    pub post_snapshot: Option<PathBuf>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    /// Human-readable summary, one line per migration outcome.
    pub fn summary_lines(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|result| match &result.detail {
                Some(detail) => {
                    format!("{}: {} ({detail})", result.name, result.status.describe())
                }
                None => format!("{}: {}", result.name, result.status.describe()),
            })
            .collect()
    }
}

/// One row of the `--list` view.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    /// Migration name.
    pub name: String,
    /// Execution priority.
    pub priority: i32,
    /// Registry enabled flag.
    pub enabled: bool,
    /// Whether the ledger records a completed run.
    pub already_run: bool,
}

/// Lists every registered migration with its gating state. No mutation
/// beyond ensuring the ledger exists.
pub fn list(store: &dyn GraphStore, registry: &MigrationRegistry) -> Result<Vec<ListEntry>> {
    let names: Vec<&str> = registry.ordered().iter().map(|s| s.name.as_str()).collect();
    let ledger = ledger::ensure(store, &names)?;
    let txn = store.begin()?;
    let mut entries = Vec::with_capacity(names.len());
    for spec in registry.ordered() {
        entries.push(ListEntry {
            name: spec.name.clone(),
            priority: spec.priority,
            enabled: spec.enabled,
            already_run: ledger::is_recorded(txn.as_ref(), ledger, &spec.name)?,
        });
    }
    txn.rollback()?;
    Ok(entries)
}

/// Runs every selected, enabled (or explicitly forced) migration not already
/// present in the ledger, in priority order, each as one atomic unit.
pub fn run(
    store: &dyn GraphStore,
    registry: &MigrationRegistry,
    catalog: &RuleCatalog,
    snapshots: &dyn SnapshotService,
    sink: &mut dyn NotificationSink,
    options: &RunOptions,
) -> Result<RunReport> {
    let start = Instant::now();
    let names: Vec<&str> = registry.ordered().iter().map(|s| s.name.as_str()).collect();
    let ledger = ledger::ensure(store, &names)?;

    let mut report = RunReport::default();
    if !options.skip_pre_snapshot {
        match snapshots.dump(SnapshotPhase::Pre) {
            Ok(path) => report.pre_snapshot = Some(path),
            Err(err) => warn!(error = %err, "orchestrator.snapshot.pre_failed"),
        }
    }

    for spec in registry.ordered() {
        let name = spec.name.as_str();
        if !options.only.is_empty() && !options.only.iter().any(|n| n == name) {
            report.results.push(outcome(name, MigrationStatus::SkippedNotSelected, None));
            continue;
        }
        if options.exclude.iter().any(|n| n == name) {
            report.results.push(outcome(name, MigrationStatus::SkippedExcluded, None));
            continue;
        }
        if !spec.enabled && !options.run_disabled.iter().any(|n| n == name) {
            report.results.push(outcome(name, MigrationStatus::SkippedDisabled, None));
            continue;
        }

        let mut txn = store.begin()?;
        if !options.force && ledger::is_recorded(txn.as_ref(), ledger, name)? {
            txn.rollback()?;
            report.results.push(outcome(name, MigrationStatus::SkippedAlreadyRun, None));
            continue;
        }

        let mut migration = match spec.build() {
            Ok(migration) => migration,
            Err(err) => {
                warn!(migration = name, error = %err, "orchestrator.run.construct_failed");
                txn.rollback()?;
                report.results.push(outcome(
                    name,
                    MigrationStatus::SkippedConstructFailed,
                    Some(err.to_string()),
                ));
                continue;
            }
        };

        info!(migration = name, priority = spec.priority, "orchestrator.run.begin");
        let mut queued = BufferedSink::new();
        let ran = {
            let mut ctx = MigrationContext {
                store,
                txn: txn.as_mut(),
                catalog,
                notifications: &mut queued,
            };
            migration.run(&mut ctx)
        };

        let result = match ran {
            Ok(Outcome::Success) => {
                ledger::record(txn.as_mut(), ledger, name)?;
                if options.commit {
                    txn.commit()?;
                    if let Err(err) = queued.flush_into(sink) {
                        warn!(migration = name, error = %err, "orchestrator.notifications_dropped");
                    }
                    outcome(name, MigrationStatus::Succeeded, None)
                } else {
                    txn.rollback()?;
                    outcome(name, MigrationStatus::SucceededDryRun, None)
                }
            }
            Ok(Outcome::Failure) => {
                txn.rollback()?;
                outcome(name, MigrationStatus::Failed, None)
            }
            Ok(Outcome::CheckLogs) => {
                txn.rollback()?;
                outcome(name, MigrationStatus::CheckLogs, None)
            }
            Err(err) => {
                warn!(migration = name, error = %err, "orchestrator.run.failed");
                txn.rollback()?;
                outcome(name, MigrationStatus::Failed, Some(err.to_string()))
            }
        };
        info!(migration = name, status = ?result.status, "orchestrator.run.finished");
        report.results.push(result);
    }

    if !options.skip_post_snapshot {
        match snapshots.dump(SnapshotPhase::Post) {
            Ok(path) => report.post_snapshot = Some(path),
            Err(err) => warn!(error = %err, "orchestrator.snapshot.post_failed"),
        }
    }

    report.duration_ms = start.elapsed().as_secs_f64() * 1_000.0;
    for line in report.summary_lines() {
        info!("{line}");
    }
    Ok(report)
}

fn outcome(name: &str, status: MigrationStatus, detail: Option<String>) -> MigrationResult {
    MigrationResult {
        name: name.to_string(),
        status,
        detail,
    }
}
