use std::collections::HashMap;

use crate::leaf::DagLeaf;

/// Resolves the configured cache field for a bucket without runtime
/// reflection: each bucket that opts into `query_cache` gets a plain
/// function extracting the value to index by.
#[derive(Default, Clone)]
pub struct CacheExtractors {
    extractors: HashMap<String, fn(&DagLeaf) -> Option<String>>,
}

impl CacheExtractors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bucket: impl Into<String>, extractor: fn(&DagLeaf) -> Option<String>) -> &mut Self {
        self.extractors.insert(bucket.into(), extractor);
        self
    }

    #[must_use]
    pub fn get(&self, bucket: &str) -> Option<fn(&DagLeaf) -> Option<String>> {
        self.extractors.get(bucket).copied()
    }
}

/// The extractor used for the common `query_cache` configuration of
/// indexing a bucket by its leaves' `item_name`.
pub fn item_name(leaf: &DagLeaf) -> Option<String> {
    if leaf.item_name.is_empty() {
        None
    } else {
        Some(leaf.item_name.clone())
    }
}

/// Indexes a bucket by the root leaf's own hash (a no-op lookup, useful
/// mostly for tests and for buckets that want a cache keyed identically to
/// `root_index` but scoped by bucket).
pub fn leaf_hash(leaf: &DagLeaf) -> Option<String> {
    Some(leaf.hash.clone())
}

/// Indexes a bucket by a well-known `additional_data` entry, `"d"` — the
/// replaceable-event identifier convention also used by several event
/// kinds, reused here for leaves that carry the same convention.
pub fn replaceable_d_tag(leaf: &DagLeaf) -> Option<String> {
    leaf.additional_data.get("d").filter(|v| !v.is_empty()).cloned()
}

/// Resolve one of the functions above by its configured field name. This is
/// the crate's half of the "no runtime reflection" redesign (§9): a
/// configuration value is a plain string key into a small, fixed table
/// rather than a field name resolved dynamically against the leaf struct.
#[must_use]
pub fn named_extractor(field: &str) -> Option<fn(&DagLeaf) -> Option<String>> {
    match field {
        "item_name" => Some(item_name),
        "hash" => Some(leaf_hash),
        "d" => Some(replaceable_d_tag),
        _ => None,
    }
}
