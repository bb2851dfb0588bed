//! Purpose: Define the public Rust API boundary for hbtable.
//! Exports: `Table` and its capability traits, scanner/write handles, mapping config, errors.
//! Role: Public, additive-only surface used by the CLI and embedding programs.
//! Invariants: Connection and pool contracts are re-exported so callers can supply backends.
//! Invariants: Encoding, masks and planning stay reachable only through `crate::core`.

mod mapping;
mod scanner;
mod table;
mod write;

pub use crate::core::conn::{
    Connection, ConnectionHandle, ConnectionPool, ConnectionProperties, ConnectionScope,
    CreationProperties, HandleRequest, WRITE_BUFFER_SIZE_KEY,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Bound, Error, ErrorKind};
pub use crate::core::key::{KeyEncoder, KeyType, KeyValue, Number, OrderedKeyEncoder};
pub use crate::core::log::{LogChannel, TracingLog};
pub use crate::core::memory::{MemoryPool, MemoryStore, PoolStats};
pub use crate::core::plan::{ScanBoundary, ScanPlan};
pub use crate::core::row::{Cell, ColumnRef, Mutation, Row};
pub use crate::core::vars::{VariableSpace, Variables};
pub use mapping::{Mapping, ScanKeys};
pub use scanner::{ResultScanner, ScannerBuilder};
pub use table::{ScanPlanBuilder, Table, TableOps};
pub use write::{Delete, Put, WriteOperationManager};
