//! CBOR message shapes for the binary DAG upload/download transport (§6 of
//! the spec). Framing (length prefix) is left to
//! [`tokio_util::codec::LengthDelimitedCodec`] — this module only defines
//! what goes inside each frame.

use relay_dag::DagLeaf;
use serde::{Deserialize, Serialize};

/// One leaf of an upload, plus the branch proof connecting it back to the
/// declared root (the original scionic-merkle-tree transport's
/// `ClassicTreeBranch`; carried opaquely here since nothing in the core
/// storage path needs to interpret it — verification happens against the
/// root CID signature, not the branch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMessage {
    pub root: String,
    pub count: u64,
    pub leaf: DagLeaf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Vec<u8>>,
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafLabelRange {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub include_content: bool,
}

/// What part of a DAG a `DownloadMessage` wants back: an explicit leaf
/// list, one or more contiguous label ranges, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadFilter {
    #[serde(default)]
    pub leaves: Vec<String>,
    #[serde(default)]
    pub leaf_ranges: Vec<LeafLabelRange>,
    /// Overridden per-range by `LeafLabelRange::include_content` when a
    /// range sets it explicitly; this is the default for `leaves` and for
    /// ranges that don't override it.
    #[serde(default)]
    pub include_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadMessage {
    pub root: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default)]
    pub filter: Option<DownloadFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn upload_message_round_trips_through_cbor() {
        let msg = UploadMessage {
            root: "root1".into(),
            count: 3,
            leaf: DagLeaf {
                hash: "root1".into(),
                leaf_type: relay_dag::LeafType::File,
                item_name: "a.txt".into(),
                additional_data: HashMap::new(),
                content_hash: None,
                content: None,
                links: vec![],
            },
            parent: None,
            branch: None,
            public_key: "pk".into(),
            signature: "sig".into(),
        };
        let bytes = serde_cbor::to_vec(&msg).unwrap();
        let decoded: UploadMessage = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(decoded.root, "root1");
        assert_eq!(decoded.count, 3);
    }

    #[test]
    fn download_filter_defaults_to_no_constraints() {
        let filter = DownloadFilter::default();
        assert!(filter.leaves.is_empty());
        assert!(filter.leaf_ranges.is_empty());
    }
}
