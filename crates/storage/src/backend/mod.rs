//! Engine implementations behind the [`crate::api::KvEngine`] seam.
//!
//! [`RocksDbEngine`] is the production choice: durable synchronous
//! commits, one column family per table. [`MemoryEngine`] keeps the same
//! ordering contract in process memory for tests and ephemeral runs.

mod in_memory;
mod rocksdb;

pub use in_memory::MemoryEngine;
pub use rocksdb::RocksDbEngine;
