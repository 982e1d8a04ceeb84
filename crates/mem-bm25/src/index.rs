//! Incremental BM25 inverted index (`spec.md` §4.9).
//!
//! Posting lists are keyed by token, mapping document id to a field-weighted
//! term frequency; document frequency for a token is simply the size of its
//! posting list, so no separate df table needs to stay in sync. Each
//! [`DocEntry`] also keeps its own term-weight map so `remove_item` can undo
//! exactly what `index_item` did without a second pass over the corpus.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mem_model::MemoryItem;

use crate::config::Bm25Config;
use crate::tokenizer::tokenize;

/// One hit from [`InvertedIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

struct DocEntry {
    /// Field-weighted length, used for the `b` length-normalization term.
    length: f64,
    /// The exact weighted term frequencies this document contributed to
    /// `postings`, kept so `remove_item` can undo them precisely.
    term_weights: HashMap<String, f32>,
    title_lower: String,
    pinned: bool,
    updated_at: DateTime<Utc>,
    tags_lower: BTreeSet<String>,
}

/// Incrementally maintained BM25 index over a scope's catalog.
pub struct InvertedIndex {
    config: Bm25Config,
    postings: HashMap<String, HashMap<String, f32>>,
    docs: HashMap<String, DocEntry>,
    total_length: f64,
}

fn field_tokens_into(text: &str, weight: f32, tf: &mut HashMap<String, f32>) {
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += weight;
    }
}

impl InvertedIndex {
    pub fn new(config: Bm25Config) -> Self {
        Self {
            config,
            postings: HashMap::new(),
            docs: HashMap::new(),
            total_length: 0.0,
        }
    }

    pub fn config(&self) -> &Bm25Config {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Document frequency of `token`: the posting list's size is exactly
    /// this, since every doc appears at most once per token.
    fn doc_freq(&self, token: &str) -> usize {
        self.postings.get(token).map(|m| m.len()).unwrap_or(0)
    }

    fn avgdl(&self) -> f64 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_length / self.docs.len() as f64
        }
    }

    /// BM25+ idf: always non-negative, unlike the classic Robertson-Sparck
    /// Jones form which can go negative for very common terms.
    fn idf(&self, token: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq(token) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// idf of a token against the current index, for the hybrid ranker's
    /// `mean_idf` input (`spec.md` §4.11). Absent tokens score 0, distinct
    /// from "present but common" — the caller should also check
    /// [`InvertedIndex::contains_token`] to compute `oov_rate`.
    pub fn idf_of(&self, token: &str) -> f32 {
        if self.doc_freq(token) == 0 {
            return 0.0;
        }
        self.idf(token) as f32
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.postings.contains_key(token)
    }

    /// (Re-)index one document. Idempotent: re-indexing the same id simply
    /// replaces its postings and doc entry.
    pub fn index_item(&mut self, item: &MemoryItem) {
        self.remove_item(&item.id);

        let mut tf: HashMap<String, f32> = HashMap::new();
        field_tokens_into(&item.title, self.config.boost_title, &mut tf);
        if let Some(text) = &item.text {
            field_tokens_into(text, 1.0, &mut tf);
        }
        if let Some(code) = &item.code {
            field_tokens_into(code, 1.0, &mut tf);
        }
        for tag in &item.facets.tags {
            field_tokens_into(tag, 1.0, &mut tf);
        }
        for file in &item.facets.files {
            field_tokens_into(file, 1.0, &mut tf);
        }
        for symbol in &item.facets.symbols {
            field_tokens_into(symbol, 1.0, &mut tf);
        }

        let length: f64 = tf.values().map(|w| *w as f64).sum();
        for (token, weight) in &tf {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(item.id.clone(), *weight);
        }

        self.total_length += length;
        self.docs.insert(
            item.id.clone(),
            DocEntry {
                length,
                term_weights: tf,
                title_lower: item.title.to_lowercase(),
                pinned: item.quality.pinned,
                updated_at: item.updated_at,
                tags_lower: item.facets.tags.iter().map(|t| t.to_lowercase()).collect(),
            },
        );
    }

    /// Returns `false` if `id` was not indexed.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let Some(entry) = self.docs.remove(id) else {
            return false;
        };
        for token in entry.term_weights.keys() {
            if let Some(posting) = self.postings.get_mut(token) {
                posting.remove(id);
                if posting.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
        self.total_length -= entry.length;
        true
    }

    /// Re-tokenize and replace every posting list from scratch. Used after
    /// a scope rebuild, where the catalog is the only source of truth.
    pub fn rebuild(&mut self, items: &[MemoryItem]) {
        self.postings.clear();
        self.docs.clear();
        self.total_length = 0.0;
        for item in items {
            self.index_item(item);
        }
    }

    fn recency_multiplier(&self, updated_at: DateTime<Utc>) -> f32 {
        let half_life = self.config.recency_half_life_days.max(f32::MIN_POSITIVE);
        let age_days = (Utc::now() - updated_at).num_milliseconds() as f32 / 86_400_000.0;
        let age_days = age_days.max(0.0);
        let decay = 2f32.powf(-age_days / half_life);
        1.0 + (self.config.boost_recent - 1.0) * decay
    }

    /// Score and rank the top `k` documents for `query`. Boosts compound
    /// multiplicatively on top of the summed BM25 term score, per
    /// `spec.md` §4.9.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredId> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let avgdl = self.avgdl();
        let query_lower = query.trim().to_lowercase();

        let mut candidates: HashMap<&str, f64> = HashMap::new();
        for token in &query_tokens {
            let Some(posting) = self.postings.get(token) else {
                continue;
            };
            let idf = self.idf(token);
            for (id, &tf) in posting {
                let entry = &self.docs[id];
                let tf = tf as f64;
                let denom = tf + self.config.k1 as f64 * (1.0 - self.config.b as f64 + self.config.b as f64 * entry.length / avgdl.max(1.0));
                let term_score = idf * (tf * (self.config.k1 as f64 + 1.0)) / denom.max(1e-9);
                *candidates.entry(id.as_str()).or_insert(0.0) += term_score;
            }
        }

        let mut scored: Vec<ScoredId> = candidates
            .into_iter()
            .map(|(id, bm25_sum)| {
                let entry = &self.docs[id];
                let mut score = bm25_sum as f32;
                if entry.pinned {
                    score *= self.config.boost_pinned;
                }
                if !query_lower.is_empty() && entry.title_lower == query_lower {
                    score *= self.config.boost_exact_match;
                }
                if query_tokens.iter().any(|t| entry.tags_lower.contains(t)) {
                    score *= self.config.boost_tag_exact;
                }
                score *= self.recency_multiplier(entry.updated_at);
                ScoredId { id: id.to_string(), score }
            })
            .filter(|s| s.score >= self.config.min_score)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mem_model::{Facets, MemoryItemType, Quality, Scope, Security};

    fn item(id: &str, title: &str, text: &str) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            item_type: MemoryItemType::Snippet,
            scope: Scope::Local,
            title: title.to_string(),
            text: Some(text.to_string()),
            code: None,
            language: None,
            facets: Facets::default(),
            context: Default::default(),
            quality: Quality::default(),
            security: Security::default(),
            links: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn exact_title_and_title_boost_beat_incidental_mentions() {
        let mut index = InvertedIndex::new(Bm25Config::default());
        index.index_item(&item("i1", "react hook useApi", "a hook for calling an api"));
        index.index_item(&item("i2", "kafka consumer group", "mentions useApi once in passing"));
        index.index_item(&item("i3", "sql window function", "no relation"));

        let hits = index.search("useApi", 3);
        assert_eq!(hits[0].id, "i1");
        assert!(hits[0].score >= hits[1].score * 2.0, "title boost + exact match should dominate");
    }

    #[test]
    fn pinned_boost_raises_score() {
        let mut index = InvertedIndex::new(Bm25Config::default());
        let mut pinned = item("p1", "runbook for deploys", "deploy the service safely");
        pinned.quality.pinned = true;
        let unpinned = item("p2", "runbook for deploys redux", "deploy the service safely too");
        index.index_item(&pinned);
        index.index_item(&unpinned);

        let hits = index.search("deploy service", 2);
        assert_eq!(hits[0].id, "p1");
    }

    #[test]
    fn remove_item_drops_it_from_search() {
        let mut index = InvertedIndex::new(Bm25Config::default());
        index.index_item(&item("a", "alpha", "alpha body"));
        assert!(index.remove_item("a"));
        assert!(index.search("alpha", 5).is_empty());
        assert!(!index.remove_item("a"));
    }

    #[test]
    fn rebuild_matches_incremental_indexing() {
        let items: Vec<MemoryItem> = (0..5).map(|i| item(&format!("id{i}"), "title words here", "body text words")).collect();

        let mut incremental = InvertedIndex::new(Bm25Config::default());
        for it in &items {
            incremental.index_item(it);
        }

        let mut rebuilt = InvertedIndex::new(Bm25Config::default());
        rebuilt.rebuild(&items);

        let a = incremental.search("title words", 10);
        let b = rebuilt.search("title words", 10);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert!((x.score - y.score).abs() < 1e-6);
        }
    }

    #[test]
    fn reindexing_same_id_replaces_rather_than_duplicates() {
        let mut index = InvertedIndex::new(Bm25Config::default());
        index.index_item(&item("x", "alpha", "alpha body"));
        index.index_item(&item("x", "beta", "beta body"));
        assert_eq!(index.len(), 1);
        assert!(index.search("alpha", 5).is_empty());
        assert!(!index.search("beta", 5).is_empty());
    }
}
