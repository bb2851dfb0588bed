//! Purpose: Buffered row writes against one table through a long-lived connection handle.
//! Exports: `WriteOperationManager`, `Put`, `Delete`.
//! Role: Returned by `Table::create_write_operation_manager`, which hands over an open handle.
//! Invariants: The manager owns its handle; it is released on `close` or drop, never earlier.
//! Invariants: An explicitly configured write buffer turns auto-flush off at construction.
use crate::core::conn::{ConnectionHandle, io_error};
use crate::core::error::Error;
use crate::core::row::{Cell, ColumnRef, Mutation};

use super::scanner::decode_qualifier;

#[derive(Debug)]
pub struct WriteOperationManager {
    handle: ConnectionHandle,
    table: String,
    write_buffer_configured: bool,
}

impl WriteOperationManager {
    pub(crate) fn new(
        mut handle: ConnectionHandle,
        table: impl Into<String>,
        write_buffer_configured: bool,
    ) -> Result<Self, Error> {
        let table = table.into();
        if write_buffer_configured {
            handle
                .connection_mut()
                .set_auto_flush(false)
                .map_err(|err| io_error(&table, "failed to enable write buffering", err))?;
        }
        Ok(Self {
            handle,
            table,
            write_buffer_configured,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// True when the caller asked for a specific write buffer size.
    pub fn write_buffer_configured(&self) -> bool {
        self.write_buffer_configured
    }

    pub fn is_auto_flush(&self) -> bool {
        self.handle.connection().is_auto_flush()
    }

    pub fn set_auto_flush(&mut self, auto_flush: bool) -> Result<(), Error> {
        self.handle
            .connection_mut()
            .set_auto_flush(auto_flush)
            .map_err(|err| io_error(&self.table, "failed to change auto-flush", err))
    }

    pub fn create_put(&mut self, key: impl Into<Vec<u8>>) -> Put<'_> {
        Put {
            manager: self,
            key: key.into(),
            cells: Vec::new(),
            write_to_wal: true,
        }
    }

    pub fn create_delete(&mut self, key: impl Into<Vec<u8>>) -> Delete<'_> {
        Delete {
            manager: self,
            key: key.into(),
        }
    }

    pub fn flush_commits(&mut self) -> Result<(), Error> {
        self.handle
            .connection_mut()
            .flush()
            .map_err(|err| io_error(&self.table, "failed to flush buffered writes", err))
    }

    /// Flushes buffered writes, then releases the handle even if the flush failed.
    pub fn close(mut self) -> Result<(), Error> {
        let flushed = self.flush_commits();
        let table = self.table.clone();
        let released = self
            .handle
            .close()
            .map_err(|err| io_error(&table, "failed to release connection handle", err));
        flushed.and(released)
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), Error> {
        tracing::debug!(table = %self.table, key = %hex::encode(mutation.key()), "applying mutation");
        self.handle
            .connection_mut()
            .apply(mutation)
            .map_err(|err| io_error(&self.table, "write failed", err))
    }
}

pub struct Put<'a> {
    manager: &'a mut WriteOperationManager,
    key: Vec<u8>,
    cells: Vec<Cell>,
    write_to_wal: bool,
}

impl Put<'_> {
    pub fn add_column(
        &mut self,
        family: &str,
        qualifier: &str,
        qualifier_is_binary: bool,
        value: impl Into<Vec<u8>>,
    ) -> Result<&mut Self, Error> {
        let qualifier = decode_qualifier(qualifier, qualifier_is_binary)?;
        self.cells.push(Cell {
            column: ColumnRef::new(family, qualifier),
            value: value.into(),
        });
        Ok(self)
    }

    pub fn set_write_to_wal(&mut self, write_to_wal: bool) -> &mut Self {
        self.write_to_wal = write_to_wal;
        self
    }

    pub fn execute(self) -> Result<(), Error> {
        self.manager.apply(Mutation::Put {
            key: self.key,
            cells: self.cells,
            write_to_wal: self.write_to_wal,
        })
    }
}

pub struct Delete<'a> {
    manager: &'a mut WriteOperationManager,
    key: Vec<u8>,
}

impl Delete<'_> {
    pub fn execute(self) -> Result<(), Error> {
        self.manager.apply(Mutation::Delete { key: self.key })
    }
}
