//! A dependency-free backend for tests and doc examples. Each tree is a
//! `BTreeMap` so cursor order falls out of the map's own ordering instead
//! of needing a separate sort step.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{Cursor, Engine, Op, StoreError, StoreResult, WriteBatch};

#[derive(Default)]
pub struct InMemoryEngine {
    trees: Mutex<BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryCursor {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.entries.next())
    }
}

impl Engine for InMemoryEngine {
    fn get(&self, tree: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let trees = self.trees.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        Ok(trees.get(tree).and_then(|t| t.get(key)).cloned())
    }

    fn cursor(&self, tree: &str) -> StoreResult<Box<dyn Cursor + '_>> {
        let trees = self.trees.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        let entries: Vec<_> = trees
            .get(tree)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Box::new(MemoryCursor { entries: entries.into_iter() }))
    }

    fn cursor_from(&self, tree: &str, start: &[u8]) -> StoreResult<Box<dyn Cursor + '_>> {
        let trees = self.trees.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        let entries: Vec<_> = trees
            .get(tree)
            .map(|t| {
                t.range(start.to_vec()..)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(MemoryCursor { entries: entries.into_iter() }))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut trees = self.trees.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        for (tree, op) in batch.ops {
            let tree = trees.entry(tree).or_default();
            match op {
                Op::Put(key, value) => {
                    tree.insert(key, value);
                }
                Op::Delete(key) => {
                    tree.remove(&key);
                }
            }
        }
        Ok(())
    }
}
