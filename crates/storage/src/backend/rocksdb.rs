//! Production engine on top of RocksDB.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch, WriteOptions,
};

use crate::api::{ALL_TABLES, EngineError, KvEngine, KvIter, ReadTxn, Table, WriteTxn};

type Db = DBWithThreadMode<MultiThreaded>;

/// RocksDB engine. Every [`Table`] lives in its own column family, named
/// by [`Table::name`].
#[derive(Clone)]
pub struct RocksDbEngine {
    db: Arc<Db>,
}

impl RocksDbEngine {
    /// Open the database at `path`, creating the file and any missing
    /// column families on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut families = Vec::with_capacity(ALL_TABLES.len());
        for table in ALL_TABLES {
            families.push(ColumnFamilyDescriptor::new(table.name(), Options::default()));
        }

        let db = Db::open_cf_descriptors(&opts, path, families)?;
        Ok(Self { db: Arc::new(db) })
    }
}

fn family<'a>(db: &'a Db, table: Table) -> Result<Arc<BoundColumnFamily<'a>>, EngineError> {
    db.cf_handle(table.name())
        .ok_or_else(|| format!("table {} has no column family", table.name()).into())
}

/// Clamp a raw RocksDB iterator to `prefix` and translate its item type.
fn clamped<'a>(
    raw: impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> + 'a,
    prefix: Vec<u8>,
) -> KvIter<'a> {
    Box::new(
        raw.take_while(move |step| match step {
            Ok((key, _)) => key.starts_with(&prefix),
            Err(_) => true, // keep errors so they reach the caller
        })
        .map(|step| match step {
            Ok((key, value)) => Ok((key.into_vec(), value.into_vec())),
            Err(err) => Err(Box::new(err) as EngineError),
        }),
    )
}

impl KvEngine for RocksDbEngine {
    fn read_txn(&self) -> Result<Box<dyn ReadTxn + '_>, EngineError> {
        Ok(Box::new(RocksDbReadTxn {
            db: Arc::clone(&self.db),
        }))
    }

    fn write_txn(&self) -> Result<Box<dyn WriteTxn + 'static>, EngineError> {
        Ok(Box::new(RocksDbWriteTxn {
            db: Arc::clone(&self.db),
            staged: WriteBatch::default(),
        }))
    }
}

struct RocksDbReadTxn {
    db: Arc<Db>,
}

impl ReadTxn for RocksDbReadTxn {
    fn fetch(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let cf = family(&self.db, table)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<KvIter<'_>, EngineError> {
        let cf = family(&self.db, table)?;
        let raw = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        Ok(clamped(raw, prefix.to_vec()))
    }

    fn scan_rev(
        &self,
        table: Table,
        prefix: &[u8],
        upper: &[u8],
    ) -> Result<KvIter<'_>, EngineError> {
        let cf = family(&self.db, table)?;
        // Seeks to the last key at or below `upper`, then walks backward.
        let raw = self
            .db
            .iterator_cf(&cf, IteratorMode::From(upper, Direction::Reverse));
        Ok(clamped(raw, prefix.to_vec()))
    }
}

/// Mutations staged in a RocksDB write batch, applied on commit.
struct RocksDbWriteTxn {
    db: Arc<Db>,
    staged: WriteBatch,
}

impl WriteTxn for RocksDbWriteTxn {
    fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        let cf = family(&self.db, table)?;
        self.staged.put_cf(&cf, key, value);
        Ok(())
    }

    fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), EngineError> {
        let cf = family(&self.db, table)?;
        self.staged.delete_cf(&cf, key);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let RocksDbWriteTxn { db, staged } = *self;
        // Records acknowledged to a signer must survive a crash, so pay
        // the fsync here instead of trusting the OS cache.
        let mut durability = WriteOptions::default();
        durability.set_sync(true);
        db.write_opt(staged, &durability)?;
        Ok(())
    }
}
