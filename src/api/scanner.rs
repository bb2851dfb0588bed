//! Purpose: Configure a scan over one table and stream its rows in batches.
//! Exports: `ScannerBuilder`, `ResultScanner`.
//! Role: `ScannerBuilder` is pure until `build`; `ResultScanner` owns the connection handle.
//! Invariants: The scanner's handle is released exactly once, on `close` or drop.
//! Invariants: Batches resume strictly after the last key already yielded.
//! Invariants: Store failures surface as `ErrorKind::Io` carrying the table name.
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::conn::{ConnectionHandle, ConnectionPool, HandleRequest, io_error};
use crate::core::error::{Error, ErrorKind};
use crate::core::plan::ScanPlan;
use crate::core::row::{ColumnRef, Row};

pub struct ScannerBuilder {
    pool: Arc<dyn ConnectionPool>,
    plan: ScanPlan,
    columns: Vec<ColumnRef>,
}

impl ScannerBuilder {
    pub(crate) fn new(pool: Arc<dyn ConnectionPool>, plan: ScanPlan) -> Self {
        Self {
            pool,
            plan,
            columns: Vec::new(),
        }
    }

    /// Restricts the scan to one column. A binary qualifier is given as hex text.
    pub fn add_column(
        &mut self,
        family: &str,
        qualifier: &str,
        qualifier_is_binary: bool,
    ) -> Result<&mut Self, Error> {
        let qualifier = decode_qualifier(qualifier, qualifier_is_binary)?;
        self.columns.push(ColumnRef::new(family, qualifier));
        Ok(self)
    }

    pub fn set_caching(&mut self, cache_size: u32) -> &mut Self {
        self.plan.cache_size = cache_size;
        self
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    pub fn table_name(&self) -> &str {
        &self.plan.table
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Opens the scan. The first batch is fetched here so a missing or
    /// disabled table fails at build time.
    pub fn build(self) -> Result<ResultScanner, Error> {
        let table = self.plan.table.clone();
        let handle = ConnectionHandle::acquire(&self.pool, &HandleRequest::for_table(&table))
            .map_err(|err| io_error(&table, "failed to acquire connection handle", err))?;
        let mut scanner = ResultScanner {
            handle: Some(handle),
            plan: self.plan,
            columns: self.columns,
            buffered: VecDeque::new(),
            resume_after: None,
            exhausted: false,
        };
        scanner.fill()?;
        Ok(scanner)
    }
}

pub(crate) fn decode_qualifier(qualifier: &str, is_binary: bool) -> Result<Vec<u8>, Error> {
    if !is_binary {
        return Ok(qualifier.as_bytes().to_vec());
    }
    hex::decode(qualifier).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message("binary column qualifier is not valid hex")
            .with_literal(qualifier)
            .with_source(err)
    })
}

pub struct ResultScanner {
    handle: Option<ConnectionHandle>,
    plan: ScanPlan,
    columns: Vec<ColumnRef>,
    buffered: VecDeque<Row>,
    resume_after: Option<Vec<u8>>,
    exhausted: bool,
}

impl ResultScanner {
    fn fill(&mut self) -> Result<(), Error> {
        let Some(handle) = self.handle.as_ref() else {
            self.exhausted = true;
            return Ok(());
        };
        let batch = handle
            .connection()
            .scan_batch(&self.plan, &self.columns, self.resume_after.as_deref())
            .map_err(|err| io_error(&self.plan.table, "scan failed", err))?;
        match batch.last() {
            Some(last) => self.resume_after = Some(last.key.clone()),
            None => self.exhausted = true,
        }
        tracing::debug!(table = %self.plan.table, rows = batch.len(), "fetched scan batch");
        self.buffered.extend(batch);
        Ok(())
    }

    /// Releases the connection handle; rows not yet pulled are discarded.
    pub fn close(mut self) -> Result<(), Error> {
        self.buffered.clear();
        match self.handle.take() {
            Some(handle) => handle
                .close()
                .map_err(|err| io_error(&self.plan.table, "failed to release connection handle", err)),
            None => Ok(()),
        }
    }
}

impl Iterator for ResultScanner {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}
