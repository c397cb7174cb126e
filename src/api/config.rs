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
//! Pipeline configuration with tuned defaults.

use serde::{Deserialize, Serialize};
use crate::api::error::RagError;

/// Which retrieval strategy the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Cosine similarity only.
    Plain,
    /// Weighted cosine + keyword overlap.
    Hybrid,
    /// Hybrid, gated on keyword presence and a minimum score.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Fixed token sequence length fed to the model.
    pub max_sequence_length: usize,
    pub retrieval_mode: RetrievalMode,
    /// Semantic share of the hybrid score (keyword share is 1 - this).
    pub hybrid_semantic_weight: f64,
    /// Semantic share used by strict retrieval.
    pub strict_semantic_weight: f64,
    pub strict_min_score: f64,
    /// Use MMR instead of plain top-K when narrowing results.
    pub use_mmr: bool,
    pub mmr_lambda: f64,
    pub context_top_k: usize,
    pub max_key_sentences: usize,
    pub summary_sentences: usize,
    pub summary_position_bias: bool,
    pub summary_keywords: usize,
    /// Max pooled SQLite connections.
    pub db_pool_size: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: 128,
            retrieval_mode: RetrievalMode::Hybrid,
            hybrid_semantic_weight: 0.6,
            strict_semantic_weight: 0.5,
            strict_min_score: 0.2,
            use_mmr: false,
            mmr_lambda: 0.7,
            context_top_k: 3,
            max_key_sentences: 2,
            summary_sentences: 3,
            summary_position_bias: false,
            summary_keywords: 5,
            db_pool_size: 4,
        }
    }
}

impl RagConfig {
    /// Parse a JSON override document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RagError> {
        let config: RagConfig = serde_json::from_str(json)
            .map_err(|e| RagError::InvalidInput(format!("Bad config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        // Room for [CLS] and [SEP]
        if self.max_sequence_length < 2 {
            return Err(RagError::InvalidInput(format!(
                "max_sequence_length must be >= 2, got {}",
                self.max_sequence_length
            )));
        }
        for (name, value) in [
            ("hybrid_semantic_weight", self.hybrid_semantic_weight),
            ("strict_semantic_weight", self.strict_semantic_weight),
            ("mmr_lambda", self.mmr_lambda),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::InvalidInput(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.db_pool_size == 0 {
            return Err(RagError::InvalidInput("db_pool_size must be > 0".to_string()));
        }
        Ok(())
    }
}
