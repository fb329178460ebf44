//! Migration orchestrator CLI.
//!
//! Discovers the registered migrations, gates them against the idempotency
//! ledger and the selection flags, runs each inside its own transaction, and
//! emits a one-line-per-migration run summary. Without `--commit` every
//! migration rolls back (dry run).
#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use nu_ansi_term::Color;
use regraft::cli::{self, open_store, persist_store, CliError};
use regraft::config::StoreConfig;
use regraft::engine;
use regraft::engine::reconcile::{reconcile, LabelTable, ReconcileScope};
use regraft::model::{PropertyValue, VertexId};
use regraft::notify::{EventKind, LogSink, NotificationSink, VertexEvent};
use regraft::orchestrator::{
    self, Migration, MigrationContext, MigrationRegistry, MigrationStatus, Outcome, RunOptions,
};
use regraft::rules::{RelationKind, PARENTAGE_KEY};
use regraft::snapshot::JsonSnapshotService;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "graph-migrate",
    version,
    about = "Run the registered graph migrations against the configured store"
)]
struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        value_name = "CONFIG",
        default_value = "migration.toml",
        help = "Store connection descriptor"
    )]
    config: PathBuf,

    #[arg(
        short = 'm',
        value_name = "NAMES",
        value_delimiter = ',',
        help = "Run only these migrations"
    )]
    only: Vec<String>,

    #[arg(short = 'l', help = "List migrations with enabled/already-run status")]
    list: bool,

    #[arg(
        short = 'd',
        value_name = "SNAPSHOT",
        help = "Load from a snapshot artifact instead of the live store (in-memory backend only)"
    )]
    snapshot: Option<PathBuf>,

    #[arg(short = 'f', help = "Force re-run, ignoring the ledger")]
    force: bool,

    #[arg(long = "commit", help = "Actually persist; omission runs dry")]
    commit: bool,

    #[arg(
        short = 'e',
        value_name = "NAMES",
        value_delimiter = ',',
        help = "Exclude these migrations"
    )]
    exclude: Vec<String>,

    #[arg(long = "skipPreMigrationSnapShot", help = "Skip the pre-run snapshot")]
    skip_pre_snapshot: bool,

    #[arg(long = "skipPostMigrationSnapShot", help = "Skip the post-run snapshot")]
    skip_post_snapshot: bool,

    #[arg(
        long = "runDisabled",
        value_name = "NAMES",
        value_delimiter = ',',
        help = "Run these migrations even though they are disabled"
    )]
    run_disabled: Vec<String>,
}

fn main() {
    cli::init_tracing();
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    };
    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), CliError> {
    let config = StoreConfig::load(&args.config)?;
    let store = open_store(&config, args.snapshot.as_deref())?;
    let catalog = config.load_rules()?;
    let registry = builtin_registry();

    if args.list {
        for entry in orchestrator::list(&store, &registry)? {
            let gate = if entry.enabled {
                Color::Green.paint("enabled")
            } else {
                Color::DarkGray.paint("disabled")
            };
            let state = if entry.already_run {
                Color::Yellow.paint("already run")
            } else {
                Color::Default.paint("pending")
            };
            println!(
                "{:>4}  {:<28} {gate:<10} {state}",
                entry.priority, entry.name
            );
        }
        return Ok(());
    }

    let snapshots = JsonSnapshotService::new(config.snapshot_dir(), store.clone());
    let mut sink = LogSink;
    let options = RunOptions {
        only: args.only,
        exclude: args.exclude,
        run_disabled: args.run_disabled,
        force: args.force,
        commit: args.commit,
        skip_pre_snapshot: args.skip_pre_snapshot,
        skip_post_snapshot: args.skip_post_snapshot,
    };
    let report = orchestrator::run(&store, &registry, &catalog, &snapshots, &mut sink, &options)?;

    for result in &report.results {
        let line = match &result.detail {
            Some(detail) => format!("{}: {detail}", result.name),
            None => result.name.clone(),
        };
        let painted = match result.status {
            MigrationStatus::Succeeded => Color::Green.paint(format!("{line}: committed")),
            MigrationStatus::SucceededDryRun => {
                Color::Cyan.paint(format!("{line}: succeeded (dry run, rolled back)"))
            }
            MigrationStatus::Failed => Color::Red.paint(format!("{line}: failed, rolled back")),
            MigrationStatus::CheckLogs => {
                Color::Red.paint(format!("{line}: check logs, rolled back"))
            }
            MigrationStatus::SkippedAlreadyRun => {
                Color::DarkGray.paint(format!("{line}: skipped (already run)"))
            }
            MigrationStatus::SkippedDisabled => {
                Color::DarkGray.paint(format!("{line}: skipped (disabled)"))
            }
            MigrationStatus::SkippedNotSelected => {
                Color::DarkGray.paint(format!("{line}: skipped (not selected)"))
            }
            MigrationStatus::SkippedExcluded => {
                Color::DarkGray.paint(format!("{line}: skipped (excluded)"))
            }
            MigrationStatus::SkippedConstructFailed => {
                Color::Red.paint(format!("{line}: skipped (construction failed)"))
            }
        };
        println!("{painted}");
    }

    if args.commit {
        persist_store(&config, &store)?;
    }
    Ok(())
}

/// The compile-time migration table: name, priority, enabled flag, builder.
fn builtin_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .register("reconcile-edge-rules", 10, true, || {
            Ok(Box::new(ReconcileEdgeRules))
        })
        .register("dedupe-cousin-edges", 20, true, || {
            Ok(Box::new(DedupeCousinEdges))
        })
        .register("trim-name-whitespace", 90, false, || {
            Ok(Box::new(TrimNameWhitespace))
        });
    registry
}

/// Rewrites every edge to conform to the configured rule catalogue.
struct ReconcileEdgeRules;

impl Migration for ReconcileEdgeRules {
    fn run(&mut self, ctx: &mut MigrationContext<'_>) -> engine::Result<Outcome> {
        let report = reconcile(ctx.txn, ctx.catalog, &ReconcileScope::all(), &LabelTable::new())?;
        if !report.multiplicity.is_empty() {
            for (shape, count) in &report.multiplicity {
                warn!(%shape, count, "reconcile-edge-rules: multiplicity violations left in place");
            }
        }
        Ok(Outcome::Success)
    }
}

/// Removes parallel duplicate cousin edges, keeping the oldest of each
/// (out, in, label) group and notifying for the surviving endpoints.
struct DedupeCousinEdges;

impl Migration for DedupeCousinEdges {
    fn run(&mut self, ctx: &mut MigrationContext<'_>) -> engine::Result<Outcome> {
        let mut seen: BTreeSet<(VertexId, VertexId, String)> = BTreeSet::new();
        let mut touched: BTreeSet<VertexId> = BTreeSet::new();
        for edge in ctx.txn.all_edges()? {
            let is_tree = edge
                .properties
                .get(PARENTAGE_KEY)
                .and_then(RelationKind::from_marker)
                == Some(RelationKind::Tree);
            if is_tree {
                continue;
            }
            if !seen.insert((edge.out_v, edge.in_v, edge.label.clone())) {
                ctx.txn.remove_edge(edge.id)?;
                touched.insert(edge.out_v);
            }
        }
        for id in touched {
            if let Some(vertex) = ctx.txn.vertex(id)? {
                let _ = ctx.notifications.publish(VertexEvent {
                    kind: EventKind::Update,
                    vertex,
                    related: Vec::new(),
                });
            }
        }
        Ok(Outcome::Success)
    }
}

/// Trims surrounding whitespace from every `name` value. Disabled by
/// default; run explicitly with `--runDisabled trim-name-whitespace`.
struct TrimNameWhitespace;

impl Migration for TrimNameWhitespace {
    fn run(&mut self, ctx: &mut MigrationContext<'_>) -> engine::Result<Outcome> {
        for id in ctx.txn.vertices_with_property("name")? {
            let values = ctx.txn.vertex_property(id, "name")?;
            let trimmed: Vec<PropertyValue> = values
                .iter()
                .map(|value| match value {
                    PropertyValue::Str(s) => PropertyValue::Str(s.trim().to_string()),
                    other => other.clone(),
                })
                .collect();
            if trimmed != values {
                ctx.txn.set_vertex_property(id, "name", trimmed)?;
            }
        }
        Ok(Outcome::Success)
    }
}
