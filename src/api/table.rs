//! Purpose: The per-table entry point: lifecycle calls, scanner builders and write managers.
//! Exports: `Table`, `TableOps`, `ScanPlanBuilder`.
//! Role: Thin layer that routes every call through one scoped pooled connection.
//! Invariants: Each lifecycle call acquires and releases exactly one handle, on every path.
//! Invariants: Lifecycle failures are reported as `ErrorKind::Io` naming this table.
//! Invariants: The write manager factory is the only call that leaves a handle open.
use std::fmt;
use std::sync::Arc;

use crate::core::boundary::{resolve_cache_size, resolve_scan_boundary};
use crate::core::conn::{
    Connection, ConnectionHandle, ConnectionPool, ConnectionProperties, ConnectionScope,
    CreationProperties, HandleRequest, io_error,
};
use crate::core::error::Error;
use crate::core::key::{KeyEncoder, OrderedKeyEncoder};
use crate::core::log::LogChannel;
use crate::core::plan::build_scan_plan;
use crate::core::vars::VariableSpace;

use super::mapping::{Mapping, ScanKeys};
use super::scanner::ScannerBuilder;
use super::write::WriteOperationManager;

pub trait TableOps {
    fn exists(&self) -> Result<bool, Error>;
    fn disabled(&self) -> Result<bool, Error>;
    fn available(&self) -> Result<bool, Error>;
    fn disable(&self) -> Result<(), Error>;
    fn enable(&self) -> Result<(), Error>;
    fn delete(&self) -> Result<(), Error>;
    /// Family order is kept and duplicates are passed through as given.
    fn create(&self, families: &[String], properties: &CreationProperties) -> Result<(), Error>;
    fn column_families(&self) -> Result<Vec<String>, Error>;
    fn key_exists(&self, key: &[u8]) -> Result<bool, Error>;
}

pub trait ScanPlanBuilder {
    /// Scanner over already-encoded bounds, using the engine's default caching.
    fn create_scanner_builder(
        &self,
        lower: Option<Vec<u8>>,
        upper: Option<Vec<u8>>,
    ) -> ScannerBuilder;

    /// Scanner over typed key literals, resolved through the mapping's key type.
    fn create_scanner_builder_for(
        &self,
        mapping: &Mapping,
        keys: &ScanKeys,
        log: Option<&dyn LogChannel>,
        vars: &dyn VariableSpace,
    ) -> Result<ScannerBuilder, Error>;
}

#[derive(Clone)]
pub struct Table {
    name: String,
    pool: Arc<dyn ConnectionPool>,
    encoder: Arc<dyn KeyEncoder>,
}

impl Table {
    pub fn new(name: impl Into<String>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            name: name.into(),
            pool,
            encoder: Arc::new(OrderedKeyEncoder),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn KeyEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires a handle bound to this table and hands it to the returned manager.
    /// A requested buffer size is set on the connection before it is acquired.
    pub fn create_write_operation_manager(
        &self,
        write_buffer_size: Option<u64>,
    ) -> Result<WriteOperationManager, Error> {
        let request = HandleRequest::for_table(&self.name).with_properties(
            ConnectionProperties::default().with_write_buffer_size(write_buffer_size),
        );
        tracing::debug!(table = %self.name, write_buffer_size, "creating write operation manager");
        let handle = ConnectionHandle::acquire(&self.pool, &request)
            .map_err(|err| io_error(&self.name, "failed to acquire connection handle", err))?;
        WriteOperationManager::new(handle, &self.name, write_buffer_size.is_some())
    }

    fn admin<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Connection, &str) -> Result<T, Error>,
    {
        let name = self.name.as_str();
        self.pool
            .with_handle(name, &HandleRequest::admin(), |conn| op(conn, name))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl TableOps for Table {
    fn exists(&self) -> Result<bool, Error> {
        self.admin(|conn, name| conn.table_exists(name))
    }

    fn disabled(&self) -> Result<bool, Error> {
        self.admin(|conn, name| conn.is_table_disabled(name))
    }

    fn available(&self) -> Result<bool, Error> {
        self.admin(|conn, name| conn.is_table_available(name))
    }

    fn disable(&self) -> Result<(), Error> {
        tracing::debug!(table = %self.name, "disabling table");
        self.admin(|conn, name| conn.disable_table(name))
    }

    fn enable(&self) -> Result<(), Error> {
        tracing::debug!(table = %self.name, "enabling table");
        self.admin(|conn, name| conn.enable_table(name))
    }

    fn delete(&self) -> Result<(), Error> {
        tracing::debug!(table = %self.name, "deleting table");
        self.admin(|conn, name| conn.delete_table(name))
    }

    fn create(&self, families: &[String], properties: &CreationProperties) -> Result<(), Error> {
        tracing::debug!(table = %self.name, families = families.len(), "creating table");
        self.admin(|conn, name| conn.create_table(name, families, properties))
    }

    fn column_families(&self) -> Result<Vec<String>, Error> {
        self.admin(|conn, name| conn.table_families(name))
    }

    fn key_exists(&self, key: &[u8]) -> Result<bool, Error> {
        self.pool
            .with_handle(&self.name, &HandleRequest::for_table(&self.name), |conn| {
                conn.row_exists(key)
            })
    }
}

impl ScanPlanBuilder for Table {
    fn create_scanner_builder(
        &self,
        lower: Option<Vec<u8>>,
        upper: Option<Vec<u8>>,
    ) -> ScannerBuilder {
        ScannerBuilder::new(
            Arc::clone(&self.pool),
            build_scan_plan(&self.name, 0, lower, upper),
        )
    }

    fn create_scanner_builder_for(
        &self,
        mapping: &Mapping,
        keys: &ScanKeys,
        log: Option<&dyn LogChannel>,
        vars: &dyn VariableSpace,
    ) -> Result<ScannerBuilder, Error> {
        let bounds = resolve_scan_boundary(
            keys.start.as_deref(),
            keys.stop.as_deref(),
            mapping.key_type,
            keys.effective_mask(mapping),
            vars,
            self.encoder.as_ref(),
        )
        .map_err(|err| err.with_table(&self.name))?;
        let cache_size = resolve_cache_size(keys.cache_size.as_deref(), vars, log)
            .map_err(|err| err.with_table(&self.name))?;
        Ok(ScannerBuilder::new(
            Arc::clone(&self.pool),
            build_scan_plan(&self.name, cache_size, bounds.lower, bounds.upper),
        ))
    }
}
