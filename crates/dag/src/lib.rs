//! The content-addressed blob store: leaves are stored under a bucket
//! derived deterministically from their name or an override tag, and a
//! whole tree can be reconstructed by walking child links from its root.
//!
//! Every operation here works in terms of [`relay_store::Engine`] trees —
//! this crate owns no storage of its own.

mod cache;
mod leaf;

use std::collections::{HashMap, VecDeque};

use relay_store::{Engine, WriteBatch};
use thiserror::Error;

pub use cache::{named_extractor, CacheExtractors};
pub use leaf::{DagLeaf, DagLeafData, LeafType};

const TREE_CONTENT: &str = "content";
const TREE_ROOT_INDEX: &str = "root_index";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DagError {
    #[error("leaf has a content hash but no content")]
    ContentHashWithoutContent,
    #[error("leaf has content but no content hash")]
    ContentWithoutContentHash,
    #[error("root leaf {0} not found")]
    RootNotFound(String),
    #[error("bucket for root {0} not found")]
    BucketNotFound(String),
    #[error("leaf {0} not found")]
    LeafNotFound(String),
    #[error("content {0} not found")]
    ContentNotFound(String),
    #[error("leaf {0} referenced as a link but never stored")]
    MissingLink(String),
    #[error("leaf encoding failed: {0}")]
    Encoding(#[from] serde_cbor::Error),
    #[error(transparent)]
    Store(#[from] relay_store::StoreError),
}

pub type DagResult<T> = Result<T, DagError>;

/// A fully reconstructed tree, keyed by leaf hash.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    pub leaves: HashMap<String, DagLeafData>,
}

/// Determine the bucket a root leaf's (and therefore its whole tree's)
/// entries live in.
///
/// 1. `hkind` override (when present and not `"1"`).
/// 2. The second `.`-separated segment of `item_name` (index 1 of a full
///    split, not merely the text after the first dot — `archive.tar.gz`
///    buckets as `tar`, not `tar.gz`).
/// 3. `directory` or `file`, by leaf type.
fn bucket_for(leaf: &DagLeaf) -> String {
    if let Some(hkind) = leaf.additional_data.get("hkind") {
        if hkind != "1" {
            return format!("hkind:{hkind}");
        }
    }

    let parts: Vec<&str> = leaf.item_name.split('.').collect();
    if parts.len() > 1 {
        return parts[1].to_string();
    }

    match leaf.leaf_type {
        LeafType::Directory => "directory".to_string(),
        _ => "file".to_string(),
    }
}

/// Store a single leaf, updating the root index and per-user cache when
/// `leaf_data` is itself the root. Whether the root additionally populates
/// `cache:<bucket>` is decided entirely by whether `extractors` has an
/// entry registered for that bucket (built from the `query_cache` config
/// table at startup) — there is no separate "is caching on" flag to thread
/// through on top of that.
pub fn store_leaf(
    engine: &dyn Engine,
    root: &str,
    mut leaf_data: DagLeafData,
    extractors: &CacheExtractors,
) -> DagResult<()> {
    if leaf_data.leaf.content_hash.is_some() && leaf_data.leaf.content.is_none() {
        return Err(DagError::ContentHashWithoutContent);
    }
    if leaf_data.leaf.content.is_some() && leaf_data.leaf.content_hash.is_none() {
        return Err(DagError::ContentWithoutContentHash);
    }

    let mut batch = WriteBatch::new();

    if let Some(content) = leaf_data.leaf.content.take() {
        let Some(hash) = leaf_data.leaf.content_hash.as_ref() else {
            return Err(DagError::ContentWithoutContentHash);
        };
        batch.put(TREE_CONTENT, content_tree_key(hash), content);
    }

    let is_root = leaf_data.leaf.hash == root;
    let root_leaf = if is_root {
        leaf_data.leaf.clone()
    } else {
        let stored = fetch_leaf(engine, root, root)?.ok_or_else(|| DagError::RootNotFound(root.to_string()))?;
        stored.leaf
    };

    let bucket = bucket_for(&root_leaf);
    tracing::debug!(bucket, root, "storing leaf");

    let key = leaf_data.leaf.hash.clone();
    let encoded = serde_cbor::to_vec(&leaf_data)?;
    batch.put(bucket.clone(), key.into_bytes(), encoded);

    if is_root {
        batch.put(TREE_ROOT_INDEX, root.to_string().into_bytes(), bucket.clone().into_bytes());

        if leaf_data.public_key.starts_with("npub") {
            let mut cache = load_cache_data(engine, &leaf_data.public_key, &bucket)?;
            cache.keys.push(root.to_string());
            let encoded_cache = serde_cbor::to_vec(&cache)?;
            batch.put(leaf_data.public_key.clone(), bucket.clone().into_bytes(), encoded_cache);
        }

        if let Some(extractor) = extractors.get(&bucket) {
            if let Some(value) = extractor(&root_leaf) {
                if !value.is_empty() {
                    tracing::debug!(bucket, value, "cache updated");
                    batch.put(format!("cache:{bucket}"), value.into_bytes(), root.to_string().into_bytes());
                }
            }
        }
    }

    engine.commit(batch)?;
    Ok(())
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct CacheData {
    #[serde(default)]
    keys: Vec<String>,
}

fn load_cache_data(engine: &dyn Engine, user_tree: &str, bucket: &str) -> DagResult<CacheData> {
    match engine.get(user_tree, bucket.as_bytes())? {
        Some(bytes) => Ok(serde_cbor::from_slice(&bytes)?),
        None => Ok(CacheData::default()),
    }
}

fn bucket_for_root(engine: &dyn Engine, root: &str) -> DagResult<String> {
    let bytes = engine
        .get(TREE_ROOT_INDEX, root.as_bytes())?
        .ok_or_else(|| DagError::BucketNotFound(root.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn fetch_leaf(engine: &dyn Engine, root: &str, hash: &str) -> DagResult<Option<DagLeafData>> {
    let bucket = match bucket_for_root(engine, root) {
        Ok(bucket) => bucket,
        Err(DagError::BucketNotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    match engine.get(&bucket, hash.as_bytes())? {
        Some(bytes) => Ok(Some(serde_cbor::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// The `content` tree key for a given `content_hash`: hex-decoded when it
/// is valid hex (the common case — a SHA-256 digest), otherwise the raw
/// bytes of the string itself. Store and retrieve must agree on this or a
/// non-hex `content_hash` round-trips to a different key on each side.
fn content_tree_key(content_hash: &str) -> Vec<u8> {
    hex::decode(content_hash).unwrap_or_else(|_| content_hash.as_bytes().to_vec())
}

pub fn retrieve_leaf_content(engine: &dyn Engine, content_hash: &str) -> DagResult<Vec<u8>> {
    let key = content_tree_key(content_hash);
    engine
        .get(TREE_CONTENT, &key)?
        .ok_or_else(|| DagError::ContentNotFound(content_hash.to_string()))
}

pub fn retrieve_leaf(
    engine: &dyn Engine,
    root: &str,
    hash: &str,
    include_content: bool,
) -> DagResult<DagLeafData> {
    let mut data = fetch_leaf(engine, root, hash)?.ok_or_else(|| DagError::LeafNotFound(hash.to_string()))?;

    if include_content {
        if let Some(content_hash) = data.leaf.content_hash.clone() {
            data.leaf.content = Some(retrieve_leaf_content(engine, &content_hash)?);
        }
    }

    Ok(data)
}

/// Walk the DAG from `root` in deterministic link order, producing a full
/// [`Dag`]. Iterative — deep trees never recurse.
pub fn build_dag_from_store(engine: &dyn Engine, root: &str, include_content: bool) -> DagResult<Dag> {
    let mut dag = Dag::default();
    let mut queue = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(hash) = queue.pop_front() {
        if dag.leaves.contains_key(&hash) {
            continue;
        }
        let data = fetch_leaf(engine, root, &hash)?.ok_or_else(|| DagError::MissingLink(hash.clone()))?;
        for link in &data.leaf.links {
            queue.push_back(link.clone());
        }

        let mut data = data;
        if include_content {
            if let Some(content_hash) = data.leaf.content_hash.clone() {
                data.leaf.content = Some(retrieve_leaf_content(engine, &content_hash)?);
            }
        }
        dag.leaves.insert(hash, data);
    }

    Ok(dag)
}

/// The walk order `build_dag_from_store` uses: a breadth-first traversal
/// from `root` following links, each hash visited once.
fn walk_order(engine: &dyn Engine, root: &str) -> DagResult<Vec<String>> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(hash) = queue.pop_front() {
        if !seen.insert(hash.clone()) {
            continue;
        }
        let data = fetch_leaf(engine, root, &hash)?.ok_or_else(|| DagError::MissingLink(hash.clone()))?;
        for link in &data.leaf.links {
            queue.push_back(link.clone());
        }
        order.push(hash);
    }

    Ok(order)
}

/// Return the contiguous slice of leaves (by walk order) whose hash falls
/// within `[from, to]` inclusive.
pub fn retrieve_leaf_range(
    engine: &dyn Engine,
    root: &str,
    from: &str,
    to: &str,
    include_content: bool,
) -> DagResult<Vec<DagLeafData>> {
    let order = walk_order(engine, root)?;
    let start = order.iter().position(|h| h == from);
    let end = order.iter().position(|h| h == to);

    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if s <= e => (s, e),
        _ => return Ok(Vec::new()),
    };

    order[start..=end]
        .iter()
        .map(|hash| retrieve_leaf(engine, root, hash, include_content))
        .collect()
}
