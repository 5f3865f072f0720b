//! Outcome of a bulk upsert.

use serde::{Deserialize, Serialize};

/// Counters reported by the server after an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    #[serde(rename = "Rows Updated", default)]
    pub rows_updated: u64,
    #[serde(rename = "Rows Created", default)]
    pub rows_created: u64,
    #[serde(rename = "Rows Deleted", default)]
    pub rows_deleted: u64,
    #[serde(rename = "Errors", default)]
    pub error_count: u64,
}
