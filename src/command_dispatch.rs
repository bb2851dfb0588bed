//! Purpose: Hold top-level CLI command dispatch for `hbtable`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command talks to the store only through `api::Table`.
//! Invariants: Key literals are resolved with the same rules as library scan bounds.

use super::*;

use hbtable::api::{
    Mapping, OrderedKeyEncoder, ScanKeys, ScanPlanBuilder, Table, TableOps, TracingLog,
};
use hbtable::core::boundary::resolve_row_key;

pub(super) fn dispatch_command(
    command: Command,
    pool: &Arc<dyn ConnectionPool>,
    vars: &Variables,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Table { command } => dispatch_table_command(command, pool),
        Command::KeyExists {
            table,
            key,
            key_args,
        } => {
            let row_key = encode_key(&key, &key_args, vars)?;
            let exists = Table::new(&table, Arc::clone(pool)).key_exists(&row_key)?;
            emit_json(json!({ "table": table, "key": hex::encode(&row_key), "exists": exists }));
            Ok(RunOutcome::ok())
        }
        Command::Put {
            table,
            key,
            key_args,
            columns,
            encoding,
            no_wal,
            write_buffer_size,
        } => {
            let row_key = encode_key(&key, &key_args, vars)?;
            let mut cells = Vec::with_capacity(columns.len());
            for spec in &columns {
                let (family, qualifier, value) = split_column_spec(spec)?;
                let Some(value) = value else {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("column '{spec}' has no value"))
                        .with_hint("Use --column FAMILY:QUALIFIER=VALUE."));
                };
                cells.push((family, qualifier, decode_value(value, encoding.hex_values)?));
            }

            let target = Table::new(&table, Arc::clone(pool));
            let mut manager = target.create_write_operation_manager(write_buffer_size)?;
            let buffered = manager.write_buffer_configured();
            let mut put = manager.create_put(row_key.clone());
            for (family, qualifier, value) in cells {
                put.add_column(family, qualifier, encoding.binary_qualifier, value)?;
            }
            put.set_write_to_wal(!no_wal);
            put.execute()?;
            manager.close()?;
            emit_json(json!({
                "table": table,
                "key": hex::encode(&row_key),
                "cells": columns.len(),
                "write_buffer_configured": buffered,
                "write_to_wal": !no_wal,
            }));
            Ok(RunOutcome::ok())
        }
        Command::DeleteRow {
            table,
            key,
            key_args,
        } => {
            let row_key = encode_key(&key, &key_args, vars)?;
            let target = Table::new(&table, Arc::clone(pool));
            let mut manager = target.create_write_operation_manager(None)?;
            manager.create_delete(row_key.clone()).execute()?;
            manager.close()?;
            emit_json(json!({ "table": table, "key": hex::encode(&row_key), "deleted": true }));
            Ok(RunOutcome::ok())
        }
        Command::Plan { table, scan } => {
            let builder = scanner_builder(&table, &scan, pool, vars)?;
            emit_json(plan_json(builder.plan()));
            Ok(RunOutcome::ok())
        }
        Command::Scan {
            table,
            scan,
            columns,
            encoding,
            limit,
        } => {
            let mut builder = scanner_builder(&table, &scan, pool, vars)?;
            for spec in &columns {
                let (family, qualifier, value) = split_column_spec(spec)?;
                if value.is_some() {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("scan column '{spec}' must not carry a value"))
                        .with_hint("Use --column FAMILY:QUALIFIER."));
                }
                builder.add_column(family, qualifier, encoding.binary_qualifier)?;
            }
            let plan = plan_json(builder.plan());
            let mut scanner = builder.build()?;
            let mut rows = Vec::new();
            for row in scanner.by_ref().take(limit.unwrap_or(usize::MAX)) {
                rows.push(row_json(&row?));
            }
            scanner.close()?;
            emit_json(json!({ "table": table, "plan": plan, "count": rows.len(), "rows": rows }));
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "hbtable", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn dispatch_table_command(
    command: TableCommand,
    pool: &Arc<dyn ConnectionPool>,
) -> Result<RunOutcome, Error> {
    let value = match command {
        TableCommand::Create {
            table,
            families,
            properties,
        } => {
            let properties = creation_properties(&properties)?;
            Table::new(&table, Arc::clone(pool)).create(&families, &properties)?;
            json!({ "table": table, "created": true, "families": families })
        }
        TableCommand::Exists { table } => {
            let exists = Table::new(&table, Arc::clone(pool)).exists()?;
            json!({ "table": table, "exists": exists })
        }
        TableCommand::Disabled { table } => {
            let disabled = Table::new(&table, Arc::clone(pool)).disabled()?;
            json!({ "table": table, "disabled": disabled })
        }
        TableCommand::Available { table } => {
            let available = Table::new(&table, Arc::clone(pool)).available()?;
            json!({ "table": table, "available": available })
        }
        TableCommand::Enable { table } => {
            Table::new(&table, Arc::clone(pool)).enable()?;
            json!({ "table": table, "enabled": true })
        }
        TableCommand::Disable { table } => {
            Table::new(&table, Arc::clone(pool)).disable()?;
            json!({ "table": table, "disabled": true })
        }
        TableCommand::Delete { table } => {
            Table::new(&table, Arc::clone(pool)).delete()?;
            json!({ "table": table, "deleted": true })
        }
        TableCommand::Families { table } => {
            let families = Table::new(&table, Arc::clone(pool)).column_families()?;
            json!({ "table": table, "families": families })
        }
    };
    emit_json(value);
    Ok(RunOutcome::ok())
}

fn encode_key(key: &str, args: &KeyArgs, vars: &Variables) -> Result<Vec<u8>, Error> {
    resolve_row_key(
        key,
        args.key_type,
        args.key_mask.as_deref(),
        vars,
        &OrderedKeyEncoder,
    )
}

fn scanner_builder(
    table: &str,
    scan: &ScanArgs,
    pool: &Arc<dyn ConnectionPool>,
    vars: &Variables,
) -> Result<hbtable::api::ScannerBuilder, Error> {
    let mapping = match &scan.mapping {
        Some(path) => {
            let mapping = Mapping::load(path)?;
            if mapping.table != table {
                tracing::warn!(mapping = %mapping.table, table, "mapping names a different table");
            }
            mapping
        }
        None => Mapping::new(table, scan.key_type.unwrap_or(KeyType::String)),
    };
    let keys = ScanKeys {
        start: scan.start.clone(),
        stop: scan.stop.clone(),
        key_mask: scan.key_mask.clone(),
        cache_size: scan.cache.clone(),
    };
    Table::new(table, Arc::clone(pool)).create_scanner_builder_for(
        &mapping,
        &keys,
        Some(&TracingLog),
        vars,
    )
}
