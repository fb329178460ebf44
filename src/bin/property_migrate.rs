//! Single-pass property migration tool.
//!
//! Usage: `property-migrate [-c CONFIG] propertyName targetType indexKind
//! preserveData consistencyLock [blockSize]`. A 5-second abortable countdown
//! precedes any mutation.
#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use indicatif::ProgressBar;
use regraft::cli::{
    self, countdown, open_store, parse_bool, parse_index_kind, parse_target_type, persist_store,
    CliError,
};
use regraft::config::StoreConfig;
use regraft::engine::property::{self, PropertyMigration};

#[derive(Parser, Debug)]
#[command(
    name = "property-migrate",
    version,
    about = "Migrate a vertex property to a new type, cardinality, and index"
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

    #[arg(value_name = "propertyName")]
    property: String,

    #[arg(
        value_name = "targetType",
        help = "String, Set<String>, Integer, Long, or Boolean"
    )]
    target_type: String,

    #[arg(value_name = "indexKind", help = "uniqueIndex, index, or noIndex")]
    index_kind: String,

    #[arg(value_name = "preserveData", help = "true or false")]
    preserve_data: String,

    #[arg(value_name = "consistencyLock", help = "true or false")]
    consistency_lock: String,

    #[arg(value_name = "blockSize", default_value_t = 120_000)]
    block_size: usize,
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
    let (target_type, cardinality) = parse_target_type(&args.target_type)?;
    let index = parse_index_kind(&args.index_kind, true)?;
    let preserve_data = parse_bool(&args.preserve_data, "preserveData")?;
    let consistency_lock = parse_bool(&args.consistency_lock, "consistencyLock")?;
    if args.block_size == 0 {
        return Err(CliError::Message("blockSize must be positive".into()));
    }

    let config = StoreConfig::load(&args.config)?;
    let store = open_store(&config, None)?;

    countdown(5, &format!("migration of `{}`", args.property));

    let migration = PropertyMigration {
        property: args.property,
        target_type,
        cardinality,
        index,
        preserve_data,
        consistency_lock,
        block_size: Some(args.block_size),
    };

    let bar = ProgressBar::new(0);
    let report = property::run_with_observer(&store, &migration, &mut |done, total| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    })?;
    bar.finish_and_clear();

    println!(
        "migrated {} of {} vertices across {} batch(es); {} value(s) skipped",
        report.vertices_migrated, report.vertices_total, report.batches_total, report.values_skipped
    );
    if report.failed_batches.is_empty() {
        persist_store(&config, &store)?;
    } else {
        println!(
            "{} batch(es) failed; their vertices still hold `{}` and need manual reconciliation:",
            report.failed_batches.len(),
            report.retired_key
        );
        for failure in &report.failed_batches {
            println!(
                "  batch {} ({} vertices): {}",
                failure.batch, failure.vertices, failure.error
            );
        }
        persist_store(&config, &store)?;
    }
    Ok(())
}
