//! Purpose: `hbtable` CLI entry point over the file-backed reference store.
//! Role: Binary crate root; parses args, runs one table command, emits JSON on stdout.
//! Invariants: Commands emit a single JSON document on stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `api::to_exit_code`.
//! Invariants: The store file is rewritten only after a mutating command succeeds.
#![allow(clippy::result_large_err)]
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use hbtable::api::{
    ConnectionPool, CreationProperties, Error, ErrorKind, KeyType, MemoryPool, MemoryStore, Row,
    ScanPlan, Variables, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `hbtable --help`."));
            }
        },
    };

    let vars = variables_from_args(&cli.vars)?;
    let store_path = cli.store.unwrap_or_else(default_store_path);
    let mutates = cli.command.mutates();
    let pool = Arc::new(MemoryPool::with_store(MemoryStore::load(&store_path)?));
    let shared: Arc<dyn ConnectionPool> = pool.clone();

    let outcome = command_dispatch::dispatch_command(cli.command, &shared, &vars)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)?;
    if mutates {
        pool.snapshot()?.save(&store_path)?;
    }
    Ok(outcome)
}

#[derive(Parser)]
#[command(
    name = "hbtable",
    version,
    about = "Table access over a sorted wide-column store",
    long_about = None,
    after_help = r#"EXAMPLES
  $ hbtable table create events --family d
  $ hbtable put events 42 --key-type long --column d:name=alice
  $ hbtable scan events --key-type long --start 10 --stop 100
  $ hbtable scan events --key-type date --start '2024-01-01@yyyy-MM-dd'
  $ hbtable plan events --key-type long --key-mask '#,##0' --start '1,000' --cache 500"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Store file (default: ~/.hbtable/store.json)",
        value_hint = ValueHint::FilePath
    )]
    store: Option<PathBuf>,
    #[arg(
        long = "var",
        global = true,
        value_name = "NAME=VALUE",
        help = "Substitution variable for ${NAME} and %%NAME%% (repeatable, overrides env)"
    )]
    vars: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Manage table lifecycle",
        after_help = r#"EXAMPLES
  $ hbtable table create events --family d --family m --property COMPRESSION=NONE
  $ hbtable table disable events
  $ hbtable table delete events"#
    )]
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },
    #[command(about = "Check whether a row key exists")]
    KeyExists {
        table: String,
        key: String,
        #[command(flatten)]
        key_args: KeyArgs,
    },
    #[command(about = "Write one row")]
    Put {
        table: String,
        key: String,
        #[command(flatten)]
        key_args: KeyArgs,
        #[arg(
            long = "column",
            value_name = "FAMILY:QUALIFIER=VALUE",
            required = true,
            help = "Cell to write (repeatable)"
        )]
        columns: Vec<String>,
        #[command(flatten)]
        encoding: CellEncodingArgs,
        #[arg(long, help = "Skip the write-ahead log for this put")]
        no_wal: bool,
        #[arg(long, value_name = "BYTES", help = "Client write buffer size")]
        write_buffer_size: Option<u64>,
    },
    #[command(about = "Delete one row")]
    DeleteRow {
        table: String,
        key: String,
        #[command(flatten)]
        key_args: KeyArgs,
    },
    #[command(about = "Resolve scan bounds and caching without touching the store")]
    Plan {
        table: String,
        #[command(flatten)]
        scan: ScanArgs,
    },
    #[command(about = "Scan rows between two key literals")]
    Scan {
        table: String,
        #[command(flatten)]
        scan: ScanArgs,
        #[arg(
            long = "column",
            value_name = "FAMILY:QUALIFIER",
            help = "Restrict output to a column (repeatable)"
        )]
        columns: Vec<String>,
        #[command(flatten)]
        encoding: CellEncodingArgs,
        #[arg(long, help = "Stop after this many rows")]
        limit: Option<usize>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    fn mutates(&self) -> bool {
        match self {
            Command::Table { command } => command.mutates(),
            Command::Put { .. } | Command::DeleteRow { .. } => true,
            Command::KeyExists { .. }
            | Command::Plan { .. }
            | Command::Scan { .. }
            | Command::Completion { .. } => false,
        }
    }
}

#[derive(Subcommand)]
enum TableCommand {
    #[command(about = "Create a table with column families")]
    Create {
        table: String,
        #[arg(long = "family", required = true, help = "Column family (repeatable, order kept)")]
        families: Vec<String>,
        #[arg(long = "property", value_name = "KEY=VALUE", help = "Creation property")]
        properties: Vec<String>,
    },
    #[command(about = "Report whether a table exists")]
    Exists { table: String },
    #[command(about = "Report whether a table is disabled")]
    Disabled { table: String },
    #[command(about = "Report whether a table is available")]
    Available { table: String },
    #[command(about = "Enable a table")]
    Enable { table: String },
    #[command(about = "Disable a table")]
    Disable { table: String },
    #[command(about = "Delete a disabled table")]
    Delete { table: String },
    #[command(about = "List column families")]
    Families { table: String },
}

impl TableCommand {
    fn mutates(&self) -> bool {
        matches!(
            self,
            TableCommand::Create { .. }
                | TableCommand::Enable { .. }
                | TableCommand::Disable { .. }
                | TableCommand::Delete { .. }
        )
    }
}

#[derive(clap::Args)]
struct KeyArgs {
    #[arg(long, default_value = "string", help = "Row key type")]
    key_type: KeyType,
    #[arg(long, help = "Date or decimal mask for the key literal")]
    key_mask: Option<String>,
}

#[derive(clap::Args)]
struct ScanArgs {
    #[arg(
        long,
        value_hint = ValueHint::FilePath,
        conflicts_with = "key_type",
        help = "Mapping file giving key_type and key_mask"
    )]
    mapping: Option<PathBuf>,
    #[arg(long, help = "Row key type (default: string)")]
    key_type: Option<KeyType>,
    #[arg(long, help = "Date or decimal mask; overrides the mapping's mask")]
    key_mask: Option<String>,
    #[arg(long, help = "Start key literal, inclusive (LITERAL or LITERAL@MASK)")]
    start: Option<String>,
    #[arg(long, help = "Stop key literal, exclusive; ignored without --start")]
    stop: Option<String>,
    #[arg(long, help = "Rows fetched per batch (0 = store default)")]
    cache: Option<String>,
}

#[derive(clap::Args)]
struct CellEncodingArgs {
    #[arg(long, help = "Qualifiers are hex encoded")]
    binary_qualifier: bool,
    #[arg(long, help = "Values are hex encoded")]
    hex_values: bool,
}

fn default_store_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".hbtable").join("store.json")
}

fn variables_from_args(args: &[String]) -> Result<Variables, Error> {
    let mut vars = Variables::from_env();
    for arg in args {
        let (name, value) = split_assignment(arg, "--var")?;
        vars.set(name, value);
    }
    Ok(vars)
}

fn creation_properties(args: &[String]) -> Result<CreationProperties, Error> {
    args.iter()
        .map(|arg| split_assignment(arg, "--property"))
        .collect()
}

fn split_assignment<'a>(arg: &'a str, flag: &str) -> Result<(&'a str, &'a str), Error> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {flag} value '{arg}'"))
            .with_hint(format!("Use {flag} NAME=VALUE."))),
    }
}

/// Splits `FAMILY:QUALIFIER[=VALUE]`; the qualifier may be empty.
fn split_column_spec(spec: &str) -> Result<(&str, &str, Option<&str>), Error> {
    let (column, value) = match spec.split_once('=') {
        Some((column, value)) => (column, Some(value)),
        None => (spec, None),
    };
    match column.split_once(':') {
        Some((family, qualifier)) if !family.is_empty() => Ok((family, qualifier, value)),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid column '{spec}'"))
            .with_hint("Use FAMILY:QUALIFIER (and =VALUE for put).")),
    }
}

fn decode_value(value: &str, hex_values: bool) -> Result<Vec<u8>, Error> {
    if !hex_values {
        return Ok(value.as_bytes().to_vec());
    }
    hex::decode(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("cell value is not valid hex")
            .with_hint("Drop --hex-values to write the value as text.")
            .with_source(err)
    })
}

fn plan_json(plan: &ScanPlan) -> Value {
    json!({
        "table": plan.table,
        "cache_size": plan.cache_size,
        "lower": plan.lower().map(hex::encode),
        "upper": plan.upper().map(hex::encode),
    })
}

fn row_json(row: &Row) -> Value {
    let cells = row
        .cells
        .iter()
        .map(|cell| {
            json!({
                "family": cell.column.family,
                "qualifier": String::from_utf8_lossy(&cell.column.qualifier),
                "qualifier_hex": hex::encode(&cell.column.qualifier),
                "value": std::str::from_utf8(&cell.value).ok(),
                "value_hex": hex::encode(&cell.value),
            })
        })
        .collect::<Vec<_>>();
    json!({ "key": hex::encode(&row.key), "cells": cells })
}

fn emit_json(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn add_io_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("Store call failed. Check that the table exists and is enabled.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Parse => "parse error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(bound) = err.bound() {
        inner.insert("bound".to_string(), json!(bound.as_str()));
    }
    if let Some(literal) = err.literal() {
        inner.insert("literal".to_string(), json!(literal));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
