// Copyright 2025 mobile_rag_engine contributors
// SPDX-License-Identifier: MIT
//
// Licensed under the MIT License. You may obtain a copy of the License at
// https://opensource.org/licenses/MIT
//
// This software is provided "AS IS", without warranty of any kind, express or
// implied, including but not limited to the warranties of merchantability,
// fitness for a particular purpose, and noninfringement. In no event shall the
// authors or copyright holders be liable for any claim, damages, or other
// liability arising from the use of this software.
//
// CONTRIBUTOR GUIDELINES:
// This file is part of the core engine. Any modifications require owner approval.
// Please submit a PR with detailed explanation of changes before modifying.
//
//! Note retrieval: cosine, hybrid (cosine + keyword overlap) and strict
//! keyword-gated modes over every stored note.

use std::collections::HashSet;
use std::sync::Arc;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::config::{RagConfig, RetrievalMode};
use crate::api::embedder::EmbeddingEngine;
use crate::api::error::RagError;
use crate::api::note_store::{NoteStore, StoredItem};
use crate::api::ranker::{sort_by_score, ScoredItem};
use crate::api::vector_math::cosine_similarity;

pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.6;
pub const STRICT_SEMANTIC_WEIGHT: f64 = 0.5;
pub const DEFAULT_STRICT_MIN_SCORE: f64 = 0.2;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Lowercase keywords longer than two characters, punctuation removed,
/// deduplicated in first-seen order.
pub fn extract_query_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    let mut seen = HashSet::new();
    stripped
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// Fraction of query keywords that also appear among the item keywords.
pub fn keyword_overlap(query_keywords: &[String], item_keywords: &HashSet<String>) -> f64 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let hits = query_keywords.iter().filter(|k| item_keywords.contains(*k)).count();
    hits as f64 / query_keywords.len() as f64
}

fn similarity(query_vec: &[f32], item: &StoredItem) -> Result<f64, RagError> {
    cosine_similarity(query_vec, &item.vector)
        .map(f64::from)
        .map_err(|e| {
            error!("[retriever] Note {} not comparable with query: {}", item.id, e);
            RagError::InvalidInput(format!("Note {}: {}", item.id, e))
        })
}

/// Cosine-score every item, sorted descending (ties keep storage order).
pub fn score_plain(query_vec: &[f32], items: Vec<StoredItem>) -> Result<Vec<ScoredItem>, RagError> {
    let mut scored = items
        .into_iter()
        .map(|item| -> Result<ScoredItem, RagError> {
            Ok(ScoredItem { score: similarity(query_vec, &item)?, item })
        })
        .collect::<Result<Vec<_>, RagError>>()?;
    sort_by_score(&mut scored);
    Ok(scored)
}

/// `semantic_weight * cosine + (1 - semantic_weight) * keyword_overlap`, sorted descending.
pub fn score_hybrid(
    query_vec: &[f32],
    query: &str,
    items: Vec<StoredItem>,
    semantic_weight: f64,
) -> Result<Vec<ScoredItem>, RagError> {
    let query_keywords = extract_query_keywords(query);
    debug!("[retriever] Query keywords: {:?}", query_keywords);

    let mut scored = items
        .into_iter()
        .map(|item| -> Result<ScoredItem, RagError> {
            let cosine = similarity(query_vec, &item)?;
            let item_keywords: HashSet<String> = extract_query_keywords(&item.text).into_iter().collect();
            let overlap = keyword_overlap(&query_keywords, &item_keywords);
            let score = semantic_weight * cosine + (1.0 - semantic_weight) * overlap;
            Ok(ScoredItem { item, score })
        })
        .collect::<Result<Vec<_>, RagError>>()?;
    sort_by_score(&mut scored);
    Ok(scored)
}

/// Keep items containing at least one query keyword (case-insensitive
/// substring) whose score reaches `min_score`.
pub fn filter_strict(scored: Vec<ScoredItem>, query: &str, min_score: f64) -> Vec<ScoredItem> {
    let query_keywords = extract_query_keywords(query);
    scored
        .into_iter()
        .filter(|s| {
            let text = s.item.text.to_lowercase();
            query_keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .filter(|s| s.score >= min_score)
        .collect()
}

/// Scores stored notes against a query.
pub struct Retriever {
    engine: Arc<EmbeddingEngine>,
    store: Arc<dyn NoteStore>,
}

impl Retriever {
    pub fn new(engine: Arc<EmbeddingEngine>, store: Arc<dyn NoteStore>) -> Self {
        Self { engine, store }
    }

    async fn embed_and_load(&self, query: &str) -> Result<(Vec<f32>, Vec<StoredItem>), RagError> {
        let query_vec = self.engine.embed(query).await.map_err(|e| {
            error!("[retriever] Query embedding failed: {}", e);
            e
        })?;
        let items = self.store.list_all().await?;
        debug!("[retriever] Loaded {} notes", items.len());
        Ok((query_vec, items))
    }

    /// Plain cosine retrieval.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredItem>, RagError> {
        let (query_vec, items) = self.embed_and_load(query).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let scored = score_plain(&query_vec, items)?;
        info!("[retriever] Plain retrieval scored {} notes", scored.len());
        Ok(scored)
    }

    /// Weighted cosine + keyword overlap retrieval.
    pub async fn retrieve_hybrid(&self, query: &str, semantic_weight: f64) -> Result<Vec<ScoredItem>, RagError> {
        let (query_vec, items) = self.embed_and_load(query).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let scored = score_hybrid(&query_vec, query, items, semantic_weight)?;
        info!("[retriever] Hybrid retrieval scored {} notes (semantic_weight={})", scored.len(), semantic_weight);
        Ok(scored)
    }

    /// Hybrid at [`STRICT_SEMANTIC_WEIGHT`], keeping only keyword-bearing notes
    /// scoring at least `min_score`.
    pub async fn retrieve_strict(&self, query: &str, min_score: f64) -> Result<Vec<ScoredItem>, RagError> {
        self.retrieve_strict_weighted(query, STRICT_SEMANTIC_WEIGHT, min_score).await
    }

    pub async fn retrieve_strict_weighted(
        &self,
        query: &str,
        semantic_weight: f64,
        min_score: f64,
    ) -> Result<Vec<ScoredItem>, RagError> {
        let scored = self.retrieve_hybrid(query, semantic_weight).await?;
        let total = scored.len();
        let kept = filter_strict(scored, query, min_score);
        info!("[retriever] Strict retrieval kept {}/{} notes (min_score={})", kept.len(), total, min_score);
        Ok(kept)
    }

    /// Run the mode configured in `config` with its tuning values.
    pub async fn retrieve_with_config(&self, query: &str, config: &RagConfig) -> Result<Vec<ScoredItem>, RagError> {
        match config.retrieval_mode {
            RetrievalMode::Plain => self.retrieve(query).await,
            RetrievalMode::Hybrid => self.retrieve_hybrid(query, config.hybrid_semantic_weight).await,
            RetrievalMode::Strict => {
                self.retrieve_strict_weighted(query, config.strict_semantic_weight, config.strict_min_score)
                    .await
            }
        }
    }
}
