// Core modules: key encoding, literal resolution, scan planning, connections, errors.
pub mod boundary;
pub mod conn;
pub mod error;
pub mod key;
pub mod log;
pub mod mask;
pub mod memory;
pub mod plan;
pub mod row;
pub mod vars;
