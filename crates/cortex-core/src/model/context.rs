//! Source context blob
//!
//! `source_context` is schema-lite: different sources stamp different keys.
//! This type models the recognized keys and tolerates anything else via a
//! flattened map. Read sites must survive parse failures, so `parse`
//! returns an Option instead of an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Recognized keys of the `source_context` JSON blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    /// Git branch active when the memory was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Recent commit subjects (extraction stamps up to 3)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<String>,
    /// Recently changed files (extraction stamps up to 10)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Indexed file path (code_index memories)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u64>,
    /// Ids of the memories a consolidation merge superseded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Unrecognized keys survive a parse/serialize round trip
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SourceContext {
    /// Parse a stored blob. Any failure (not JSON, not an object) is None.
    pub fn parse(raw: &str) -> Option<SourceContext> {
        serde_json::from_str(raw).ok()
    }

    /// Branch from a stored blob, degrading silently on parse failure.
    pub fn branch_of(raw: &str) -> Option<String> {
        Self::parse(raw)?.branch
    }

    /// Serialize for storage. Serialization of this shape cannot fail.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
