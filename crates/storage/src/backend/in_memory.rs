//! Ordered in-memory engine for tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::api::{EngineError, KvEngine, KvIter, ReadTxn, Table, WriteTxn};

type Records = BTreeMap<Vec<u8>, Vec<u8>>;
type TableSet = BTreeMap<Table, Records>;

/// Engine holding every table in an ordered map. Nothing touches disk, so
/// the contents die with the process.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    tables: Arc<RwLock<TableSet>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemoryEngine {
    fn read_txn(&self) -> Result<Box<dyn ReadTxn + '_>, EngineError> {
        let tables = self.tables.read().map_err(|err| err.to_string())?;
        Ok(Box::new(MemoryReadTxn { tables }))
    }

    fn write_txn(&self) -> Result<Box<dyn WriteTxn + 'static>, EngineError> {
        Ok(Box::new(MemoryWriteTxn {
            tables: Arc::clone(&self.tables),
            staged: Vec::new(),
        }))
    }
}

/// Smallest key strictly above every key carrying `prefix`, if one exists.
///
/// An all-0xff or empty prefix has no such bound; scans then run to the
/// end of the table.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

/// Read transaction pinning the table set through a read lock.
struct MemoryReadTxn<'a> {
    tables: RwLockReadGuard<'a, TableSet>,
}

impl ReadTxn for MemoryReadTxn<'_> {
    fn fetch(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self
            .tables
            .get(&table)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<KvIter<'_>, EngineError> {
        let Some(records) = self.tables.get(&table) else {
            return Ok(Box::new(std::iter::empty()));
        };
        let matches = match prefix_end(prefix) {
            Some(end) => records.range(prefix.to_vec()..end),
            None => records.range(prefix.to_vec()..),
        };
        Ok(Box::new(
            matches.map(|(key, value)| Ok((key.clone(), value.clone()))),
        ))
    }

    fn scan_rev(
        &self,
        table: Table,
        prefix: &[u8],
        upper: &[u8],
    ) -> Result<KvIter<'_>, EngineError> {
        let Some(records) = self.tables.get(&table) else {
            return Ok(Box::new(std::iter::empty()));
        };
        if upper < prefix {
            return Ok(Box::new(std::iter::empty()));
        }
        // Every key between `prefix` and an upper bound carrying that
        // prefix shares the prefix too, so the range needs no filtering.
        let matches = records.range(prefix.to_vec()..=upper.to_vec()).rev();
        Ok(Box::new(
            matches.map(|(key, value)| Ok((key.clone(), value.clone()))),
        ))
    }
}

enum Staged {
    Put(Table, Vec<u8>, Vec<u8>),
    Delete(Table, Vec<u8>),
}

/// Mutations recorded in issue order and replayed under the write lock on
/// commit.
struct MemoryWriteTxn {
    tables: Arc<RwLock<TableSet>>,
    staged: Vec<Staged>,
}

impl WriteTxn for MemoryWriteTxn {
    fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.staged.push(Staged::Put(table, key, value));
        Ok(())
    }

    fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), EngineError> {
        self.staged.push(Staged::Delete(table, key));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let MemoryWriteTxn { tables, staged } = *self;
        let mut tables = tables.write().map_err(|err| err.to_string())?;
        for op in staged {
            match op {
                Staged::Put(table, key, value) => {
                    tables.entry(table).or_default().insert(key, value);
                }
                Staged::Delete(table, key) => {
                    if let Some(records) = tables.get_mut(&table) {
                        records.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
