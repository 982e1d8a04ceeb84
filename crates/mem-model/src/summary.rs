//! The catalog entry: a lightweight projection of a [`crate::MemoryItem`]
//! cheap enough to keep entirely in memory for every item in a scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{MemoryItemType, Scope, Sensitivity};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItemSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: MemoryItemType,
    pub scope: Scope,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    pub sensitivity: Sensitivity,
    pub content_hash: String,
    pub size_bytes: u64,
}

impl MemoryItemSummary {
    pub fn from_item(item: &crate::MemoryItem, content_hash: String, size_bytes: u64) -> Self {
        Self {
            id: item.id.clone(),
            item_type: item.item_type,
            scope: item.scope,
            title: item.title.clone(),
            updated_at: item.updated_at,
            pinned: item.quality.pinned,
            sensitivity: item.security.sensitivity,
            content_hash,
            size_bytes,
        }
    }
}
