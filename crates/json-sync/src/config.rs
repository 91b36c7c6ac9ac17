use serde::Deserialize;

use crate::error::SyncError;

/// Tunables for a [`SyncTree`](crate::sync::SyncTree).
///
/// ```toml
/// first_write_id = 1
/// first_query_tag = 1
/// verify_indexed = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncTreeConfig {
    /// First id handed out to a user write. Ids increase by one per write.
    pub first_write_id: u64,
    /// First tag handed out to a filtered query listen.
    pub first_query_tag: u64,
    /// Assert after every view operation that both cache nodes are indexed
    /// by the view's index.
    pub verify_indexed: bool,
}

impl Default for SyncTreeConfig {
    fn default() -> Self {
        SyncTreeConfig {
            first_write_id: 1,
            first_query_tag: 1,
            verify_indexed: cfg!(debug_assertions),
        }
    }
}

impl SyncTreeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }
}
