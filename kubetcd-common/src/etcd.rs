//! etcd request and response shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_KEY_LIMIT: u32 = 100;
pub const DEFAULT_TREE_LIMIT: u32 = 500;
pub const MAX_KEY_LIMIT: u32 = 1000;

/// Query parameters for a prefixed key listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListQuery {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub keys_only: bool,
    pub limit: Option<u32>,
}

/// Query parameters for the tree view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeQuery {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutValueRequest {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKeyRequest {
    pub key: String,
    #[serde(default)]
    pub prefix: bool,
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// Key/value pair returned by a full (non keys-only) listing.
///
/// A value that is not valid UTF-8 is returned base64-encoded with `binary`
/// set, never as lossily decoded text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub binary: bool,
}

/// Result of a prefixed range scan, in etcd's lexicographic order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyList {
    pub keys: Vec<String>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<KvEntry>,
}

/// Single key lookup; `binary` has the same meaning as in [`KvEntry`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub found: bool,
    #[serde(default)]
    pub binary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub key: String,
    pub deleted: u64,
}

/// Aggregated endpoint health, endpoint status and member list.
///
/// Each field is filled independently; a failed sub-query leaves its field
/// `None` and records the reason in `errors` under the field's name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtcdHealthReport {
    pub health: Option<serde_json::Value>,
    pub status: Option<serde_json::Value>,
    pub members: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

/// Node of the hierarchical key view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub key: String,
    pub is_dir: bool,
    /// An etcd key ends exactly at this node
    pub has_value: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyTree {
    pub tree: Vec<TreeNode>,
    pub count: usize,
}
