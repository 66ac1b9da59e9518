use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafType {
    File,
    Directory,
    Chunk,
}

/// A node in a content-addressed tree. `content` is always `None` once the
/// leaf has been persisted — it lives in the `content` tree instead,
/// reachable through `content_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagLeaf {
    pub hash: String,
    pub leaf_type: LeafType,
    pub item_name: String,
    #[serde(default)]
    pub additional_data: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "serde_bytes_option")]
    pub content: Option<Vec<u8>>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// A leaf plus the uploader's authorization over the root CID it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagLeafData {
    pub leaf: DagLeaf,
    pub public_key: String,
    pub signature: String,
}

mod serde_bytes_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serde_bytes::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wrapped: Option<serde_bytes::ByteBuf> = Option::deserialize(deserializer)?;
        Ok(wrapped.map(serde_bytes::ByteBuf::into_vec))
    }
}
