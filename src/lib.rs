//! Purpose: Library crate behind the `hbtable` CLI and its tests.
//! Exports: `api` (table access surface), `core` (keys, masks, planning, connections, errors).
//! Role: Table-access layer over a sorted wide-column store reached through a connection pool.
//! Invariants: Every store call goes through a scoped, released-once connection handle.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
