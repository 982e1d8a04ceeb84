//! The shapes `MemoryManager::query` accepts and returns (`spec.md` §4.11,
//! §4.12).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use mem_model::{MemoryItem, MemoryItemType, Scope};

/// Post-filters applied after fusion, before sort+truncate (`spec.md` §4.11
/// step 5: "scope, type, tags, file patterns, date range, pinned, min_score").
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub scope: Option<Scope>,
    pub item_type: Option<MemoryItemType>,
    /// An item passes iff it carries every listed tag.
    pub tags: Vec<String>,
    /// An item passes iff at least one of its `facets.files` contains one of
    /// these substrings (a lightweight stand-in for glob matching).
    pub file_patterns: Vec<String>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub pinned_only: bool,
    pub min_score: f32,
}

impl QueryFilters {
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(scope) = self.scope {
            if item.scope != scope {
                return false;
            }
        }
        if let Some(item_type) = self.item_type {
            if item.item_type != item_type {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|t| item.facets.tags.contains(t)) {
            return false;
        }
        if !self.file_patterns.is_empty() {
            let hit = self.file_patterns.iter().any(|pat| item.facets.files.iter().any(|f| f.contains(pat.as_str())));
            if !hit {
                return false;
            }
        }
        if let Some((from, to)) = self.date_range {
            if item.updated_at < from || item.updated_at > to {
                return false;
            }
        }
        if self.pinned_only && !item.quality.pinned {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnMode {
    Items,
    /// Trim the returned item bodies to fit a character budget, for feeding
    /// straight into a prompt context window.
    ContextPack { budget_chars: usize },
}

impl Default for ReturnMode {
    fn default() -> Self {
        ReturnMode::Items
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    /// Precomputed query embedding; `None` disables the vector channel for
    /// this query even if the scope's vector index is populated.
    pub embedding: Option<Vec<f32>>,
    pub k: usize,
    pub filters: QueryFilters,
    pub return_mode: ReturnMode,
}

impl Query {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            embedding: None,
            k,
            filters: QueryFilters::default(),
            return_mode: ReturnMode::default(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_return_mode(mut self, mode: ReturnMode) -> Self {
        self.return_mode = mode;
        self
    }
}

fn type_label(item_type: MemoryItemType) -> &'static str {
    match item_type {
        MemoryItemType::Snippet => "snippet",
        MemoryItemType::Pattern => "pattern",
        MemoryItemType::Config => "config",
        MemoryItemType::Insight => "insight",
        MemoryItemType::Runbook => "runbook",
        MemoryItemType::Fact => "fact",
        MemoryItemType::Note => "note",
    }
}

/// Aggregate counts over the final top-k, computed for free during
/// materialization so callers can render facet breakdowns without a second
/// pass over the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFacets {
    pub tag_counts: BTreeMap<String, u64>,
    pub type_counts: BTreeMap<String, u64>,
}

impl QueryFacets {
    pub fn from_items(items: &[MemoryItem]) -> Self {
        let mut facets = QueryFacets::default();
        for item in items {
            *facets.type_counts.entry(type_label(item.item_type).to_string()).or_insert(0) += 1;
            for tag in &item.facets.tags {
                *facets.tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        facets
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub items: Vec<MemoryItem>,
    /// Fused scores, aligned index-for-index with `items`.
    pub scores: Vec<f32>,
    pub facets: QueryFacets,
    /// Populated only when the query asked for `ReturnMode::ContextPack`.
    pub context_pack: Option<String>,
}

/// Concatenate item bodies (title, then text/code) into one budgeted blob,
/// truncating whole items once the running character count would exceed
/// `budget_chars` rather than cutting mid-item.
pub fn build_context_pack(items: &[MemoryItem], budget_chars: usize) -> String {
    let mut pack = String::new();
    for item in items {
        let mut block = format!("# {}\n", item.title);
        if let Some(text) = &item.text {
            block.push_str(text);
            block.push('\n');
        }
        if let Some(code) = &item.code {
            block.push_str("```\n");
            block.push_str(code);
            block.push_str("\n```\n");
        }
        if pack.len() + block.len() > budget_chars {
            break;
        }
        pack.push_str(&block);
        pack.push('\n');
    }
    pack
}
