//! RocksDB-backed implementation of [`Engine`]. Each tree maps to one
//! column family, created on first use — callers never declare a schema
//! up front.

use std::path::Path;
use std::sync::RwLock;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use tracing::debug;

use crate::{Cursor, Engine, Op, StoreError, StoreResult, WriteBatch};

pub struct RocksdbEngine {
    db: DB,
    // rocksdb hands out `&ColumnFamily` borrowed from `&DB`; we only need
    // this lock to serialize *creation* of new column families, since
    // `DB::create_cf` takes `&self` but mutates shared state under the hood.
    cf_guard: RwLock<()>,
}

impl RocksdbEngine {
    /// Open (or create) a database at `path`, discovering any column
    /// families already present so existing trees remain reachable across
    /// restarts.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let existing_cfs = DB::list_cf(&opts, path).unwrap_or_default();
        let descriptors: Vec<_> = existing_cfs
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = if descriptors.is_empty() {
            DB::open(&opts, path).map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            DB::open_cf_descriptors(&opts, path, descriptors)
                .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        Ok(Self { db, cf_guard: RwLock::new(()) })
    }

    fn ensure_cf(&self, tree: &str) -> StoreResult<()> {
        if self.db.cf_handle(tree).is_some() {
            return Ok(());
        }
        let _guard = self.cf_guard.write().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        if self.db.cf_handle(tree).is_some() {
            return Ok(());
        }
        debug!(tree, "creating column family");
        self.db
            .create_cf(tree, &Options::default())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

struct RocksCursor<'a> {
    inner: rocksdb::DBIteratorWithThreadMode<'a, DB>,
}

impl Cursor for RocksCursor<'_> {
    fn next(&mut self) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        match self.inner.next() {
            Some(Ok((k, v))) => Ok(Some((k.to_vec(), v.to_vec()))),
            Some(Err(e)) => Err(StoreError::Backend(e.to_string())),
            None => Ok(None),
        }
    }
}

impl Engine for RocksdbEngine {
    fn get(&self, tree: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_cf(tree)?;
        let cf = self
            .db
            .cf_handle(tree)
            .ok_or_else(|| StoreError::Backend(format!("column family {tree:?} vanished")))?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn cursor(&self, tree: &str) -> StoreResult<Box<dyn Cursor + '_>> {
        self.ensure_cf(tree)?;
        let cf = self
            .db
            .cf_handle(tree)
            .ok_or_else(|| StoreError::Backend(format!("column family {tree:?} vanished")))?;
        let inner = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);
        Ok(Box::new(RocksCursor { inner }))
    }

    fn cursor_from(&self, tree: &str, start: &[u8]) -> StoreResult<Box<dyn Cursor + '_>> {
        self.ensure_cf(tree)?;
        let cf = self
            .db
            .cf_handle(tree)
            .ok_or_else(|| StoreError::Backend(format!("column family {tree:?} vanished")))?;
        let inner = self
            .db
            .iterator_cf(cf, rocksdb::IteratorMode::From(start, rocksdb::Direction::Forward));
        Ok(Box::new(RocksCursor { inner }))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        for tree in batch.trees() {
            self.ensure_cf(tree)?;
        }

        let mut native = rocksdb::WriteBatch::default();
        for (tree, op) in batch.ops {
            let cf = self
                .db
                .cf_handle(&tree)
                .ok_or_else(|| StoreError::Backend(format!("column family {tree:?} vanished")))?;
            match op {
                Op::Put(key, value) => native.put_cf(cf, key, value),
                Op::Delete(key) => native.delete_cf(cf, key),
            }
        }
        self.db.write(native).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_and_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = RocksdbEngine::open(dir.path()).unwrap();
            engine.put("kind:1", b"abc", b"hello").unwrap();
        }
        // column families survive a reopen.
        let engine = RocksdbEngine::open(dir.path()).unwrap();
        assert_eq!(engine.get("kind:1", b"abc").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn commit_spans_multiple_new_trees() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RocksdbEngine::open(dir.path()).unwrap();
        let mut batch = WriteBatch::new();
        batch.put("a", b"k", b"1");
        batch.put("b", b"k", b"2");
        engine.commit(batch).unwrap();

        assert_eq!(engine.get("a", b"k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get("b", b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn cursor_from_skips_earlier_keys() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RocksdbEngine::open(dir.path()).unwrap();
        engine.put("t", b"a", b"1").unwrap();
        engine.put("t", b"b", b"2").unwrap();
        engine.put("t", b"c", b"3").unwrap();

        let mut cursor = engine.cursor_from("t", b"b").unwrap();
        let mut seen = Vec::new();
        while let Some((k, _)) = cursor.next().unwrap() {
            seen.push(k);
        }
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }
}
