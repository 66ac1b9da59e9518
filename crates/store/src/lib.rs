//! A versioned key-value storage engine providing named trees ("buckets"),
//! point get/put/delete, ordered cursors, atomic multi-tree commit, and
//! snapshot reads.
//!
//! Trees are created implicitly on first access — there is no up-front
//! schema. A [`WriteBatch`] accumulates writes against any number of trees
//! and [`Engine::commit`] makes them visible atomically: either all of the
//! batch's operations land, or none do.
//!
//! [`RocksdbEngine`] is the production backend (one RocksDB column family
//! per tree). [`memory::InMemoryEngine`] is a dependency-free backend used
//! by tests and doc examples.

pub mod memory;
mod rocks;

use thiserror::Error;

pub use rocks::RocksdbEngine;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single write queued against a named tree.
#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of writes against one or more trees, applied atomically by
/// [`Engine::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<(String, Op)>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, tree: impl Into<String>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push((tree.into(), Op::Put(key.into(), value.into())));
        self
    }

    pub fn delete(&mut self, tree: impl Into<String>, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push((tree.into(), Op::Delete(key.into())));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The distinct trees touched by this batch, in first-use order.
    #[must_use]
    pub fn trees(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (tree, _) in &self.ops {
            if !seen.contains(&tree.as_str()) {
                seen.push(tree.as_str());
            }
        }
        seen
    }
}

/// A forward cursor over a tree's entries, in ascending key order.
pub trait Cursor {
    fn next(&mut self) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>>;
}

/// The storage engine contract: snapshot-based reads, atomic batched
/// writes, across an arbitrary set of named trees.
pub trait Engine: Send + Sync {
    /// Point lookup. `Ok(None)` is a lookup miss, distinguishable from an
    /// I/O failure (`Err`).
    fn get(&self, tree: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// A forward cursor starting at the first key in `tree`.
    fn cursor(&self, tree: &str) -> StoreResult<Box<dyn Cursor + '_>>;

    /// A forward cursor starting at the first key `>= start`.
    fn cursor_from(&self, tree: &str, start: &[u8]) -> StoreResult<Box<dyn Cursor + '_>>;

    /// Apply `batch` atomically: either every operation in it lands, or
    /// none do. Readers that began before `commit` returns observe the
    /// pre-commit state.
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Convenience: a single put, via a one-operation batch.
    fn put(&self, tree: &str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(tree, key, value);
        self.commit(batch)
    }

    /// Convenience: collects a whole tree into memory. Only meant for small
    /// trees (tests, admin tooling) — production paths should use
    /// [`Engine::cursor`] directly.
    fn collect(&self, tree: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut cursor = self.cursor(tree)?;
        let mut out = Vec::new();
        while let Some(entry) = cursor.next()? {
            out.push(entry);
        }
        Ok(out)
    }
}
