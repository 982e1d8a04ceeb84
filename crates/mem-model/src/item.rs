//! The addressable record: [`MemoryItem`] and its component structs.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What kind of knowledge a [`MemoryItem`] represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemoryItemType {
    Snippet,
    Pattern,
    Config,
    Insight,
    Runbook,
    Fact,
    Note,
}

/// The partition an item belongs to. Each scope owns its own filesystem root
/// and independent indexes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Local,
    Committed,
}

/// Access sensitivity carried on every item; the core does not enforce this,
/// it merely preserves and surfaces it for an external collaborator to act on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Public,
    Team,
    Private,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Sensitivity::Team
    }
}

/// Relationship kind for a [`Link`] between two items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rel {
    Refines,
    Duplicates,
    Depends,
    Fixes,
    Relates,
}

/// A directed edge from the owning item to another item. Links are data, not
/// pointers: cycles are allowed and are not followed transitively at read
/// time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub to: String,
    pub rel: Rel,
}

/// Tag/file/symbol associations used both for filtering and for BM25 field
/// boosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facets {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub files: BTreeSet<String>,
    #[serde(default)]
    pub symbols: BTreeSet<String>,
}

/// Reuse/trust signals attached to an item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quality {
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub reuse_count: u64,
    pub pinned: bool,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            reuse_count: 0,
            pinned: false,
        }
    }
}

/// Security metadata; `sensitivity` is the only field today but the struct
/// leaves room for future fields without breaking the wire format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Security {
    pub sensitivity: Sensitivity,
}

/// The addressable record the whole core revolves around.
///
/// Every mutation — edits, pin/unpin, tag add/remove, link add — is modeled
/// as a new `MemoryItem` version with a bumped `version` and (usually) a new
/// `content_hash`; see `mem-manager`'s `upsert`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: MemoryItemType,
    pub scope: Scope,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub facets: Facets,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub security: Security,
    #[serde(default)]
    pub links: Vec<Link>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl MemoryItem {
    /// An item is valid iff at least one of `title`/`text`/`code` is
    /// non-empty. Everything else is structurally guaranteed by the type
    /// system.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let has_title = !self.title.trim().is_empty();
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_code = self.code.as_deref().is_some_and(|c| !c.trim().is_empty());
        if !(has_title || has_text || has_code) {
            return Err(ValidationError::EmptyBody);
        }
        Ok(())
    }

    /// Content hash over the canonical serialization of this item's logical
    /// payload: type, title, text, code, language, facets, context, quality,
    /// security, and links. Deliberately excludes `id`, `scope`,
    /// `created_at`, `updated_at`, and `version` — those are identity and
    /// bookkeeping, not content, and the video backend's cross-id dedup
    /// (`spec.md` §3 "Multiple items MAY share a content hash") only works
    /// if two items with the same payload under different ids (or the same
    /// id revised at a later timestamp with the same payload) hash equal.
    /// Pin/tag/link/feedback edits still produce a new content hash because
    /// they change `quality`/`facets`/`links`, which this does cover.
    pub fn content_hash(&self) -> String {
        mem_hash::content_hash(&HashablePayload {
            item_type: self.item_type,
            title: &self.title,
            text: &self.text,
            code: &self.code,
            language: &self.language,
            facets: &self.facets,
            context: &self.context,
            quality: &self.quality,
            security: &self.security,
            links: &self.links,
        })
    }
}

/// The subset of [`MemoryItem`] that defines its content, used only to
/// compute [`MemoryItem::content_hash`]. Never (de)serialized to disk.
#[derive(Serialize)]
struct HashablePayload<'a> {
    item_type: MemoryItemType,
    title: &'a str,
    text: &'a Option<String>,
    code: &'a Option<String>,
    language: &'a Option<String>,
    facets: &'a Facets,
    context: &'a BTreeMap<String, String>,
    quality: &'a Quality,
    security: &'a Security,
    links: &'a Vec<Link>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_item() -> MemoryItem {
        MemoryItem {
            id: "01HQZ2YX9K7M8N5P6Q3R4S".to_string(),
            item_type: MemoryItemType::Snippet,
            scope: Scope::Local,
            title: String::new(),
            text: None,
            code: None,
            language: None,
            facets: Facets::default(),
            context: BTreeMap::new(),
            quality: Quality::default(),
            security: Security::default(),
            links: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn rejects_fully_empty_body() {
        let item = base_item();
        assert!(matches!(item.validate(), Err(ValidationError::EmptyBody)));
    }

    #[test]
    fn accepts_title_only() {
        let mut item = base_item();
        item.title = "api call".to_string();
        assert!(item.validate().is_ok());
    }

    #[test]
    fn content_hash_is_stable_for_equal_items() {
        let mut a = base_item();
        a.title = "x".to_string();
        let b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_ignores_id_and_timestamps_but_not_payload() {
        // Two items with the same payload under different ids/timestamps
        // must hash equal: this is what lets the video backend dedup
        // identical bodies across distinct ids (spec.md §3).
        let mut a = base_item();
        a.title = "hello".to_string();
        a.id = "id-one".to_string();

        let mut b = base_item();
        b.title = "hello".to_string();
        b.id = "id-two".to_string();
        b.created_at = a.created_at + chrono::Duration::seconds(5);
        b.updated_at = b.created_at;
        b.version = a.version + 7;

        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = b.clone();
        c.title = "goodbye".to_string();
        assert_ne!(b.content_hash(), c.content_hash());
    }

    #[test]
    fn content_hash_changes_when_pin_or_tags_change() {
        let mut a = base_item();
        a.title = "x".to_string();
        let mut pinned = a.clone();
        pinned.quality.pinned = true;
        assert_ne!(a.content_hash(), pinned.content_hash());

        let mut tagged = a.clone();
        tagged.facets.tags.insert("api".to_string());
        assert_ne!(a.content_hash(), tagged.content_hash());
    }
}
