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
//! End-to-end note RAG: embed and store notes, retrieve, narrow, build
//! context and summarize it.

use std::sync::Arc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::api::config::RagConfig;
use crate::api::context_builder::{build_context_with_limit, Context};
use crate::api::embedder::EmbeddingEngine;
use crate::api::error::RagError;
use crate::api::note_store::{NoteStore, SqliteNoteStore};
use crate::api::ranker::{mmr_rank, top_k, ScoredItem};
use crate::api::retriever::Retriever;
use crate::api::summarizer::{extract_keywords, summarize, summarize_with_position_bias};

/// Everything produced for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAnswer {
    pub results: Vec<ScoredItem>,
    pub context: Context,
    pub summary: String,
    pub keywords: Vec<String>,
}

pub struct RagPipeline {
    engine: Arc<EmbeddingEngine>,
    store: Arc<dyn NoteStore>,
    retriever: Retriever,
    config: RagConfig,
}

impl RagPipeline {
    pub fn new(engine: Arc<EmbeddingEngine>, store: Arc<dyn NoteStore>, config: RagConfig) -> Result<Self, RagError> {
        config.validate()?;
        let tokenizer_len = engine.tokenizer().max_len();
        if config.max_sequence_length != tokenizer_len {
            return Err(RagError::InvalidInput(format!(
                "max_sequence_length {} does not match the tokenizer's {}",
                config.max_sequence_length, tokenizer_len
            )));
        }
        let retriever = Retriever::new(Arc::clone(&engine), Arc::clone(&store));
        Ok(Self { engine, store, retriever, config })
    }

    /// Pipeline over a SQLite store at `db_path`, pooled per `config.db_pool_size`.
    pub fn with_sqlite(engine: Arc<EmbeddingEngine>, db_path: &str, config: RagConfig) -> Result<Self, RagError> {
        let store = SqliteNoteStore::open(db_path, config.db_pool_size)?;
        Self::new(engine, Arc::new(store), config)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<EmbeddingEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn NoteStore> {
        &self.store
    }

    /// Embed and persist a note, returning its id.
    pub async fn add_note(&self, text: &str) -> Result<i64, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("Note text is empty".to_string()));
        }
        let vector = self.engine.embed(text).await?;
        let id = self.store.insert(text.to_string(), vector).await?;
        info!("[pipeline] Added note {}", id);
        Ok(id)
    }

    pub async fn delete_note(&self, id: i64) -> Result<bool, RagError> {
        self.store.delete_by_id(id).await
    }

    /// Retrieve with the configured mode, then narrow to `k` by top-K or MMR.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredItem>, RagError> {
        let scored = self.retriever.retrieve_with_config(query, &self.config).await?;
        let narrowed = if self.config.use_mmr {
            mmr_rank(&scored, k, self.config.mmr_lambda)
        } else {
            top_k(&scored, k)
        };
        debug!(
            "[pipeline] {:?} search kept {}/{} notes",
            self.config.retrieval_mode,
            narrowed.len(),
            scored.len()
        );
        Ok(narrowed)
    }

    pub async fn build_context(&self, query: &str) -> Result<Context, RagError> {
        let results = self.search(query, self.config.context_top_k).await?;
        Ok(self.context_for(&results))
    }

    fn context_for(&self, results: &[ScoredItem]) -> Context {
        build_context_with_limit(results, self.config.context_top_k, self.config.max_key_sentences)
    }

    /// Search, build context and summarize the context's key sentences.
    pub async fn answer(&self, query: &str) -> Result<PipelineAnswer, RagError> {
        let results = self.search(query, self.config.context_top_k).await?;
        let context = self.context_for(&results);

        // Key sentences are period-terminated, so notes never merge into one sentence.
        let source_text = context.key_sentences.join(" ");
        let summary = if self.config.summary_position_bias {
            summarize_with_position_bias(&source_text, self.config.summary_sentences)
        } else {
            summarize(&source_text, self.config.summary_sentences)
        };
        let keywords = extract_keywords(&source_text, self.config.summary_keywords);

        info!("[pipeline] Answered from {} notes ({} summary chars)", results.len(), summary.chars().count());
        Ok(PipelineAnswer { results, context, summary, keywords })
    }
}
