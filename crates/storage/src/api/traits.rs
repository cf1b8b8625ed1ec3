//! The seam between the store and its embedded key-value engine.
//!
//! The store assumes an engine with atomic, durable write transactions and
//! byte-ordered iteration inside each table. Everything above this module
//! is engine-agnostic; everything below it knows nothing about epochs or
//! signing roots.

use super::Table;

/// Opaque failure surfaced by the key-value engine.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Stream of raw key-value pairs produced by a scan.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), EngineError>> + 'a>;

/// An embedded key-value engine hosting the store's tables.
pub trait KvEngine: Send + Sync {
    /// Start a read transaction over a consistent snapshot.
    fn read_txn(&self) -> Result<Box<dyn ReadTxn + '_>, EngineError>;

    /// Start a write transaction. Nothing it stages is visible until commit.
    fn write_txn(&self) -> Result<Box<dyn WriteTxn + 'static>, EngineError>;
}

/// Read access to the tables.
pub trait ReadTxn {
    /// Look up a single record by its full key.
    fn fetch(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Walk every record whose key carries `prefix`, in ascending byte
    /// order of the full key. The surround scan and the lowest-epoch
    /// queries lean on this ordering.
    fn scan(&self, table: Table, prefix: &[u8]) -> Result<KvIter<'_>, EngineError>;

    /// Walk records carrying `prefix` in descending key order, beginning
    /// at the largest key not above `upper`. Callers pass an `upper` that
    /// itself carries `prefix`.
    fn scan_rev(&self, table: Table, prefix: &[u8], upper: &[u8])
    -> Result<KvIter<'_>, EngineError>;
}

/// Mutations staged against the tables.
///
/// Staged operations apply in the order they were issued. Commit is
/// all-or-nothing, and once it returns the records are durable; an
/// acknowledged record that does not survive a crash can get the validator
/// it protects slashed.
pub trait WriteTxn: Send {
    /// Stage one record write.
    fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError>;

    /// Stage one record removal.
    fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), EngineError>;

    /// Atomically apply everything staged.
    fn commit(self: Box<Self>) -> Result<(), EngineError>;
}
