use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courtside_core::TableKind;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Live roster memory inspector and editor")]
struct Args {
    /// Executable name of the target process.
    #[arg(long, default_value = courtside_core::config::DEFAULT_PROCESS_NAME)]
    process: String,

    /// Schema document to load.
    #[arg(long, default_value = "schema.json")]
    schema: PathBuf,

    /// Schema version label to materialize.
    #[arg(long, default_value = "2K26")]
    version: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a base discovery pass for one table and print the report.
    Discover {
        table: TableKind,
        /// Emit the full report as JSON instead of the summary view.
        #[arg(long)]
        json: bool,
    },
    /// Read one field.
    Get {
        table: TableKind,
        index: u32,
        category: String,
        field: String,
    },
    /// Write one field.
    Set {
        table: TableKind,
        index: u32,
        category: String,
        field: String,
        value: String,
    },
    /// List readable memory regions of the target process.
    Regions {
        #[arg(long, value_parser = parse_address, default_value = "0x10000")]
        low: u64,
        #[arg(long, value_parser = parse_address, default_value = "0x7FFFFFFFFFFF")]
        high: u64,
    },
    /// Resolve and validate every table base via the configured chains.
    Probe,
}

fn parse_address(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| format!("bad address '{raw}': {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("courtside_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    match &args.command {
        Command::Discover { table, json } => commands::discover::run(&args, *table, *json),
        Command::Get {
            table,
            index,
            category,
            field,
        } => commands::field::get(&args, *table, *index, category, field),
        Command::Set {
            table,
            index,
            category,
            field,
            value,
        } => commands::field::set(&args, *table, *index, category, field, value),
        Command::Regions { low, high } => commands::regions::run(&args, *low, *high),
        Command::Probe => commands::probe::run(&args),
    }
}
