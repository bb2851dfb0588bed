//! Purpose: In-process sorted wide-column store plus a counting connection pool over it.
//! Exports: `MemoryStore`, `MemoryPool`, `PoolStats`, `DEFAULT_SCANNER_CACHING`, `DEFAULT_WRITE_BUFFER_SIZE`.
//! Role: Reference backend for the CLI and tests; persists as a JSON snapshot.
//! Invariants: Rows are ordered by raw key bytes; scans are lower-inclusive, upper-exclusive.
//! Invariants: Every acquire is matched by at most one release; counters never go backwards.
//! Invariants: A connection with auto-flush off buffers mutations until flush or release.
//! Invariants: A failed buffered mutation never prevents the rest of the buffer from applying.
//! Invariants: Only puts written to the WAL and deletes advance a table's WAL edit count.
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound as RangeBound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::conn::{Connection, ConnectionPool, CreationProperties, HandleRequest};
use crate::core::error::{Error, ErrorKind};
use crate::core::plan::ScanPlan;
use crate::core::row::{Cell, ColumnRef, Mutation, Row};

/// Rows per scan batch when a plan asks for the engine default (cache size 0).
pub const DEFAULT_SCANNER_CACHING: usize = 100;
pub const DEFAULT_WRITE_BUFFER_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct MemoryTable {
    families: Vec<String>,
    disabled: bool,
    properties: BTreeMap<String, String>,
    wal_edits: u64,
    rows: BTreeMap<Vec<u8>, BTreeMap<ColumnRef, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(|table| table.rows.len())
    }

    pub fn creation_property(&self, table: &str, key: &str) -> Option<&str> {
        self.tables
            .get(table)
            .and_then(|table| table.properties.get(key))
            .map(String::as_str)
    }

    /// Number of mutations recorded in the table's write-ahead log.
    pub fn wal_edits(&self, table: &str) -> Option<u64> {
        self.tables.get(table).map(|table| table.wal_edits)
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, Error> {
        self.tables.get(name).ok_or_else(|| missing_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, Error> {
        self.tables.get_mut(name).ok_or_else(|| missing_table(name))
    }

    fn enabled_table(&self, name: &str) -> Result<&MemoryTable, Error> {
        let table = self.table(name)?;
        if table.disabled {
            return Err(disabled_table(name));
        }
        Ok(table)
    }

    fn create_table(
        &mut self,
        name: &str,
        families: &[String],
        properties: &CreationProperties,
    ) -> Result<(), Error> {
        if self.tables.contains_key(name) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("table '{name}' already exists")));
        }
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                families: families.to_vec(),
                disabled: false,
                properties: properties
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
                wal_edits: 0,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn delete_table(&mut self, name: &str) -> Result<(), Error> {
        if !self.table(name)?.disabled {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("table '{name}' must be disabled before it is deleted")));
        }
        self.tables.remove(name);
        Ok(())
    }

    fn apply(&mut self, name: &str, mutation: Mutation) -> Result<(), Error> {
        self.enabled_table(name)?;
        let table = self.table_mut(name)?;
        match mutation {
            Mutation::Put {
                key,
                cells,
                write_to_wal,
            } => {
                if let Some(cell) = cells
                    .iter()
                    .find(|cell| !table.families.contains(&cell.column.family))
                {
                    return Err(Error::new(ErrorKind::Usage).with_message(format!(
                        "column family '{}' does not exist in table '{name}'",
                        cell.column.family
                    )));
                }
                if write_to_wal {
                    table.wal_edits += 1;
                }
                let row = table.rows.entry(key).or_default();
                for cell in cells {
                    row.insert(cell.column, cell.value);
                }
            }
            Mutation::Delete { key } => {
                table.wal_edits += 1;
                table.rows.remove(&key);
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        plan: &ScanPlan,
        columns: &[ColumnRef],
        resume_after: Option<&[u8]>,
    ) -> Result<Vec<Row>, Error> {
        let table = self.enabled_table(&plan.table)?;
        let limit = match plan.cache_size {
            0 => DEFAULT_SCANNER_CACHING,
            size => size as usize,
        };
        if plan.bounds.is_empty_range() {
            return Ok(Vec::new());
        }
        if let (Some(after), Some(upper)) = (resume_after, plan.upper()) {
            if after >= upper {
                return Ok(Vec::new());
            }
        }
        let start = match (resume_after, plan.lower()) {
            (Some(after), _) => RangeBound::Excluded(after.to_vec()),
            (None, Some(lower)) => RangeBound::Included(lower.to_vec()),
            (None, None) => RangeBound::Unbounded,
        };
        let end = match plan.upper() {
            Some(upper) => RangeBound::Excluded(upper.to_vec()),
            None => RangeBound::Unbounded,
        };

        let mut rows = Vec::new();
        for (key, cells) in table.rows.range((start, end)) {
            let cells: Vec<Cell> = cells
                .iter()
                .filter(|(column, _)| columns.is_empty() || columns.contains(column))
                .map(|(column, value)| Cell {
                    column: column.clone(),
                    value: value.clone(),
                })
                .collect();
            if cells.is_empty() {
                continue;
            }
            rows.push(Row {
                key: key.clone(),
                cells,
            });
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let snapshot = StoreSnapshot {
            tables: self
                .tables
                .iter()
                .map(|(name, table)| TableSnapshot {
                    name: name.clone(),
                    families: table.families.clone(),
                    disabled: table.disabled,
                    properties: table.properties.clone(),
                    wal_edits: table.wal_edits,
                    rows: table
                        .rows
                        .iter()
                        .map(|(key, cells)| RowSnapshot {
                            key: hex::encode(key),
                            cells: cells
                                .iter()
                                .map(|(column, value)| CellSnapshot {
                                    family: column.family.clone(),
                                    qualifier: hex::encode(&column.qualifier),
                                    value: hex::encode(value),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&snapshot).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode store snapshot")
                .with_source(err)
        })
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        let snapshot: StoreSnapshot = serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message("invalid store snapshot")
                .with_source(err)
        })?;
        let mut store = MemoryStore::new();
        for table in snapshot.tables {
            let mut rows = BTreeMap::new();
            for row in table.rows {
                let mut cells = BTreeMap::new();
                for cell in row.cells {
                    let column = ColumnRef::new(cell.family, decode_snapshot_hex(&cell.qualifier)?);
                    cells.insert(column, decode_snapshot_hex(&cell.value)?);
                }
                rows.insert(decode_snapshot_hex(&row.key)?, cells);
            }
            store.tables.insert(
                table.name,
                MemoryTable {
                    families: table.families,
                    disabled: table.disabled,
                    properties: table.properties,
                    wal_edits: table.wal_edits,
                    rows,
                },
            );
        }
        Ok(store)
    }

    /// Loads a snapshot file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, Error> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(Error::new(ErrorKind::Io)
                .with_message(format!("failed to read store file {}", path.display()))
                .with_source(err)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to create directory {}", parent.display()))
                    .with_source(err)
            })?;
        }
        let json = self.to_json()?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to write store file {}", staging.display()))
                .with_source(err)
        })?;
        fs::rename(&staging, path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to replace store file {}", path.display()))
                .with_source(err)
        })
    }
}

fn missing_table(name: &str) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("table '{name}' does not exist"))
}

fn disabled_table(name: &str) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("table '{name}' is disabled"))
}

fn decode_snapshot_hex(value: &str) -> Result<Vec<u8>, Error> {
    hex::decode(value).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message("invalid hex in store snapshot")
            .with_literal(value)
            .with_source(err)
    })
}

#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    tables: Vec<TableSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct TableSnapshot {
    name: String,
    families: Vec<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    wal_edits: u64,
    #[serde(default)]
    rows: Vec<RowSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct RowSnapshot {
    key: String,
    cells: Vec<CellSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct CellSnapshot {
    family: String,
    qualifier: String,
    value: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
}

impl PoolStats {
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPool {
    store: Arc<Mutex<MemoryStore>>,
    acquired: AtomicU64,
    released: AtomicU64,
    unavailable: AtomicBool,
    last_request: Mutex<Option<HandleRequest>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }

    pub fn last_request(&self) -> Option<HandleRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|request| request.clone())
    }

    /// Makes subsequent acquires fail, as when the store cannot be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Result<MemoryStore, Error> {
        Ok(lock_store(&self.store)?.clone())
    }
}

impl ConnectionPool for MemoryPool {
    fn acquire(&self, request: &HandleRequest) -> Result<Box<dyn Connection>, Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io).with_message("store is unavailable"));
        }
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
            table: request.table.clone(),
            write_buffer_size: request
                .properties
                .write_buffer_size
                .unwrap_or(DEFAULT_WRITE_BUFFER_SIZE),
            auto_flush: true,
            pending: Vec::new(),
            pending_bytes: 0,
        }))
    }

    fn release(&self, mut connection: Box<dyn Connection>) -> Result<(), Error> {
        self.released.fetch_add(1, Ordering::SeqCst);
        connection.flush()
    }
}

fn lock_store(store: &Mutex<MemoryStore>) -> Result<MutexGuard<'_, MemoryStore>, Error> {
    store
        .lock()
        .map_err(|_| Error::new(ErrorKind::Internal).with_message("store lock poisoned"))
}

struct MemoryConnection {
    store: Arc<Mutex<MemoryStore>>,
    table: Option<String>,
    write_buffer_size: u64,
    auto_flush: bool,
    pending: Vec<Mutation>,
    pending_bytes: u64,
}

impl MemoryConnection {
    fn bound(&self) -> Result<&str, Error> {
        self.table.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("connection is not bound to a table")
        })
    }
}

impl Connection for MemoryConnection {
    fn bound_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        Ok(lock_store(&self.store)?.tables.contains_key(table))
    }

    fn is_table_disabled(&self, table: &str) -> Result<bool, Error> {
        Ok(lock_store(&self.store)?.table(table)?.disabled)
    }

    fn is_table_available(&self, table: &str) -> Result<bool, Error> {
        Ok(lock_store(&self.store)?
            .tables
            .get(table)
            .is_some_and(|table| !table.disabled))
    }

    fn disable_table(&mut self, table: &str) -> Result<(), Error> {
        lock_store(&self.store)?.table_mut(table)?.disabled = true;
        Ok(())
    }

    fn enable_table(&mut self, table: &str) -> Result<(), Error> {
        lock_store(&self.store)?.table_mut(table)?.disabled = false;
        Ok(())
    }

    fn delete_table(&mut self, table: &str) -> Result<(), Error> {
        lock_store(&self.store)?.delete_table(table)
    }

    fn create_table(
        &mut self,
        table: &str,
        families: &[String],
        properties: &CreationProperties,
    ) -> Result<(), Error> {
        lock_store(&self.store)?.create_table(table, families, properties)
    }

    fn table_families(&self, table: &str) -> Result<Vec<String>, Error> {
        Ok(lock_store(&self.store)?.table(table)?.families.clone())
    }

    fn row_exists(&self, key: &[u8]) -> Result<bool, Error> {
        let table = self.bound()?;
        Ok(lock_store(&self.store)?
            .enabled_table(table)?
            .rows
            .contains_key(key))
    }

    fn scan_batch(
        &self,
        plan: &ScanPlan,
        columns: &[ColumnRef],
        resume_after: Option<&[u8]>,
    ) -> Result<Vec<Row>, Error> {
        lock_store(&self.store)?.scan(plan, columns, resume_after)
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), Error> {
        let table = self.bound()?.to_string();
        if self.auto_flush {
            return lock_store(&self.store)?.apply(&table, mutation);
        }
        self.pending_bytes += mutation.heap_size() as u64;
        self.pending.push(mutation);
        if self.pending_bytes >= self.write_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let table = self.bound()?.to_string();
        let mut store = lock_store(&self.store)?;
        let pending = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;
        let total = pending.len();
        let mut failures: Vec<Error> = pending
            .into_iter()
            .filter_map(|mutation| store.apply(&table, mutation).err())
            .collect();
        if failures.is_empty() {
            return Ok(());
        }
        let failed = failures.len();
        let first = failures.swap_remove(0);
        Err(Error::new(first.kind())
            .with_message(format!(
                "{failed} of {total} buffered mutations failed: {}",
                first.message().unwrap_or("store error")
            ))
            .with_table(table)
            .with_source(first))
    }

    fn is_auto_flush(&self) -> bool {
        self.auto_flush
    }

    fn set_auto_flush(&mut self, auto_flush: bool) -> Result<(), Error> {
        self.auto_flush = auto_flush;
        if auto_flush {
            self.flush()?;
        }
        Ok(())
    }
}
