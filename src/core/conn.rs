//! Purpose: Contracts for pooled store connections and the scoped handle that owns one.
//! Exports: `Connection`, `ConnectionPool`, `ConnectionHandle`, `ConnectionScope`,
//!          `HandleRequest`, `ConnectionProperties`, `CreationProperties`, `WRITE_BUFFER_SIZE_KEY`.
//! Role: Every table operation borrows exactly one connection through a `ConnectionHandle`.
//! Invariants: A handle is released exactly once, on `close` or on drop (including unwinds).
//! Invariants: `with_handle` reports every acquire/operation/release failure as `ErrorKind::Io`.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::plan::ScanPlan;
use crate::core::row::{ColumnRef, Mutation, Row};

/// Store property carrying the client-side write buffer size in bytes.
pub const WRITE_BUFFER_SIZE_KEY: &str = "hbase.client.write.buffer";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnectionProperties {
    pub write_buffer_size: Option<u64>,
}

impl ConnectionProperties {
    pub fn with_write_buffer_size(mut self, size: Option<u64>) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Renders the recognized options as store property strings.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(size) = self.write_buffer_size {
            map.insert(WRITE_BUFFER_SIZE_KEY.to_string(), size.to_string());
        }
        map
    }
}

/// Opaque store-specific options passed through to table creation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreationProperties {
    entries: BTreeMap<String, String>,
}

impl CreationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CreationProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// What to ask the pool for: an admin connection, or one bound to a table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HandleRequest {
    pub table: Option<String>,
    pub properties: ConnectionProperties,
}

impl HandleRequest {
    pub fn admin() -> Self {
        Self::default()
    }

    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            properties: ConnectionProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// One live connection to the store. Row-level calls act on the bound table.
pub trait Connection: Send {
    fn bound_table(&self) -> Option<&str>;

    fn table_exists(&self, table: &str) -> Result<bool, Error>;
    fn is_table_disabled(&self, table: &str) -> Result<bool, Error>;
    fn is_table_available(&self, table: &str) -> Result<bool, Error>;
    fn disable_table(&mut self, table: &str) -> Result<(), Error>;
    fn enable_table(&mut self, table: &str) -> Result<(), Error>;
    fn delete_table(&mut self, table: &str) -> Result<(), Error>;
    fn create_table(
        &mut self,
        table: &str,
        families: &[String],
        properties: &CreationProperties,
    ) -> Result<(), Error>;
    fn table_families(&self, table: &str) -> Result<Vec<String>, Error>;

    fn row_exists(&self, key: &[u8]) -> Result<bool, Error>;
    /// Returns up to `plan.cache_size` rows (engine default when zero) strictly after
    /// `resume_after`, or from the plan's lower bound when `None`.
    fn scan_batch(
        &self,
        plan: &ScanPlan,
        columns: &[ColumnRef],
        resume_after: Option<&[u8]>,
    ) -> Result<Vec<Row>, Error>;
    fn apply(&mut self, mutation: Mutation) -> Result<(), Error>;
    fn flush(&mut self) -> Result<(), Error>;
    fn is_auto_flush(&self) -> bool;
    fn set_auto_flush(&mut self, auto_flush: bool) -> Result<(), Error>;
}

pub trait ConnectionPool: Send + Sync {
    fn acquire(&self, request: &HandleRequest) -> Result<Box<dyn Connection>, Error>;
    fn release(&self, connection: Box<dyn Connection>) -> Result<(), Error>;
}

pub struct ConnectionHandle {
    pool: Arc<dyn ConnectionPool>,
    connection: Option<Box<dyn Connection>>,
    table: Option<String>,
}

impl ConnectionHandle {
    pub fn acquire(pool: &Arc<dyn ConnectionPool>, request: &HandleRequest) -> Result<Self, Error> {
        let connection = pool.acquire(request)?;
        tracing::debug!(table = request.table.as_deref(), "acquired connection handle");
        Ok(Self {
            pool: Arc::clone(pool),
            connection: Some(connection),
            table: request.table.clone(),
        })
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn connection(&self) -> &dyn Connection {
        match self.connection.as_deref() {
            Some(connection) => connection,
            None => unreachable!("connection handle used after release"),
        }
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        match self.connection.as_deref_mut() {
            Some(connection) => connection,
            None => unreachable!("connection handle used after release"),
        }
    }

    /// Returns the connection to the pool, reporting a failed release.
    pub fn close(mut self) -> Result<(), Error> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), Error> {
        match self.connection.take() {
            Some(connection) => {
                tracing::debug!(table = self.table.as_deref(), "releasing connection handle");
                self.pool.release(connection)
            }
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            tracing::warn!(table = self.table.as_deref(), error = %err, "connection release failed");
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("table", &self.table)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

pub trait ConnectionScope {
    /// Runs `op` against one pooled connection and releases it before returning.
    fn with_handle<T, F>(&self, table: &str, request: &HandleRequest, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T, Error>;
}

impl ConnectionScope for Arc<dyn ConnectionPool> {
    fn with_handle<T, F>(&self, table: &str, request: &HandleRequest, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T, Error>,
    {
        let mut handle = ConnectionHandle::acquire(self, request)
            .map_err(|err| io_error(table, "failed to acquire connection handle", err))?;
        let result = op(handle.connection_mut());
        let released = handle.close();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(io_error(table, "failed to release connection handle", err)),
            (Err(err), released) => {
                if let Err(release_err) = released {
                    tracing::warn!(table, error = %release_err, "connection release failed");
                }
                Err(io_error(table, "table operation failed", err))
            }
        }
    }
}

pub(crate) fn io_error(table: &str, context: &str, cause: Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(format!("{context}: {}", cause.message().unwrap_or("store error")))
        .with_table(table)
        .with_source(cause)
}
