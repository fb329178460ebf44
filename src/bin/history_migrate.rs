//! History-mode property migration tool: always preserves data and always
//! targets list cardinality, so prior values accumulate instead of being
//! replaced.
//!
//! Usage: `history-migrate [-c CONFIG] propertyName targetType indexKind
//! preserveData`.
#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use regraft::cli::{
    self, open_store, parse_bool, parse_index_kind, parse_target_type, persist_store, CliError,
};
use regraft::config::StoreConfig;
use regraft::engine::property::{self, PropertyMigration};
use regraft::model::Cardinality;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "history-migrate",
    version,
    about = "Migrate a vertex property to list cardinality, keeping its data"
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

    #[arg(value_name = "indexKind", help = "index or noIndex")]
    index_kind: String,

    #[arg(value_name = "preserveData", help = "true or false")]
    preserve_data: String,
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
    let (target_type, _) = parse_target_type(&args.target_type)?;
    let index = parse_index_kind(&args.index_kind, false)?;
    if !parse_bool(&args.preserve_data, "preserveData")? {
        warn!("history mode always preserves data; ignoring preserveData=false");
    }

    let config = StoreConfig::load(&args.config)?;
    let store = open_store(&config, None)?;

    let migration = PropertyMigration {
        property: args.property,
        target_type,
        cardinality: Cardinality::List,
        index,
        preserve_data: true,
        consistency_lock: false,
        block_size: None,
    };
    let report = property::run(&store, &migration)?;
    println!(
        "migrated {} vertex(es) onto list-cardinality `{}`; retired key `{}`",
        report.vertices_migrated, report.property, report.retired_key
    );
    persist_store(&config, &store)?;
    Ok(())
}
