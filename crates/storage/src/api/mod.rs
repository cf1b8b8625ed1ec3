mod tables;
mod traits;

pub use tables::{ALL_TABLES, Table};
pub use traits::{EngineError, KvEngine, KvIter, ReadTxn, WriteTxn};
