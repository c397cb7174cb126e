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
//! Sentence embedding engine: tokenize, run the model, mean-pool, normalize.
//!
//! The model session is loaded lazily on first use. Concurrent callers that
//! arrive while a load is in flight all await that same load; a failed load
//! leaves the engine in `Failed` so the next call starts over.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use ndarray::{Array1, Array2};

use crate::api::error::RagError;
use crate::api::inference::{select_output, InferenceSession, ModelInputs, ModelLoader, ModelOutput};
use crate::api::tokenizer::{Vocabulary, WordPieceTokenizer};
use crate::api::vector_math::normalize;

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<dyn InferenceSession>, RagError>>>;

enum LoadState {
    Unloaded,
    Loading(LoadFuture),
    Loaded(Arc<dyn InferenceSession>),
    Failed(String),
}

/// Snapshot of the model load state for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Loaded,
    Failed(String),
}

pub struct EmbeddingEngine {
    model_path: PathBuf,
    loader: Arc<dyn ModelLoader>,
    tokenizer: WordPieceTokenizer,
    state: Mutex<LoadState>,
    // 0 until the first embedding is produced
    dimensions: AtomicUsize,
}

impl EmbeddingEngine {
    pub fn new(model_path: impl Into<PathBuf>, tokenizer: WordPieceTokenizer, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model_path: model_path.into(),
            loader,
            tokenizer,
            state: Mutex::new(LoadState::Unloaded),
            dimensions: AtomicUsize::new(0),
        }
    }

    /// Convenience constructor reading the vocabulary from disk.
    pub fn from_files(
        model_path: impl Into<PathBuf>,
        vocab_path: &Path,
        max_sequence_length: usize,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self, RagError> {
        let vocab = Vocabulary::from_file(vocab_path)?;
        let tokenizer = WordPieceTokenizer::new(vocab, max_sequence_length)?;
        Ok(Self::new(model_path, tokenizer, loader))
    }

    pub fn tokenizer(&self) -> &WordPieceTokenizer {
        &self.tokenizer
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, LoadState>, RagError> {
        self.state
            .lock()
            .map_err(|e| RagError::InternalError(format!("Embedder state lock poisoned: {}", e)))
    }

    pub fn load_status(&self) -> LoadStatus {
        match self.lock_state() {
            Ok(state) => match &*state {
                LoadState::Unloaded => LoadStatus::Unloaded,
                LoadState::Loading(_) => LoadStatus::Loading,
                LoadState::Loaded(_) => LoadStatus::Loaded,
                LoadState::Failed(msg) => LoadStatus::Failed(msg.clone()),
            },
            Err(e) => LoadStatus::Failed(e.to_string()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.load_status() == LoadStatus::Loaded
    }

    /// Embedding width, known after the first successful `embed`.
    pub fn dimensions(&self) -> Option<usize> {
        match self.dimensions.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    fn start_load(&self) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let path = self.model_path.clone();
        async move {
            // A single local stat, run inline before handing off to the loader.
            if !path.is_file() {
                return Err(RagError::ModelLoadError(format!("Model file {} does not exist", path.display())));
            }
            info!("[embedder] Loading model from {}", path.display());
            loader.load(&path).await.map_err(|e| match e {
                RagError::ModelLoadError(_) => e,
                other => RagError::ModelLoadError(other.to_string()),
            })
        }
        .boxed()
        .shared()
    }

    /// Resolve the model session, loading it at most once per attempt.
    async fn session(&self) -> Result<Arc<dyn InferenceSession>, RagError> {
        // Check-then-set happens under the lock with no await in between.
        let pending = {
            let mut state = self.lock_state()?;
            let in_flight = match &*state {
                LoadState::Loaded(session) => return Ok(Arc::clone(session)),
                LoadState::Loading(pending) => Some(pending.clone()),
                LoadState::Unloaded | LoadState::Failed(_) => None,
            };
            match in_flight {
                Some(pending) => {
                    debug!("[embedder] Joining in-flight model load");
                    pending
                }
                None => {
                    let pending = self.start_load();
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.lock_state()?;
        let still_current = matches!(&*state, LoadState::Loading(current) if current.ptr_eq(&pending));
        if still_current {
            *state = match &result {
                Ok(session) => {
                    info!("[embedder] Model loaded");
                    LoadState::Loaded(Arc::clone(session))
                }
                Err(e) => {
                    error!("[embedder] Model load failed: {}", e);
                    LoadState::Failed(e.to_string())
                }
            };
        }
        result
    }

    /// Load the model without embedding anything.
    pub async fn preload(&self) -> Result<(), RagError> {
        self.session().await.map(|_| ())
    }

    /// Embed `text` into an L2-normalized vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let session = self.session().await?;

        let encoding = self.tokenizer.tokenize(text);
        let inputs = ModelInputs::from_encoding(&encoding);

        let outputs = session.run(&inputs).await.map_err(|e| {
            error!("[embedder] Inference failed: {}", e);
            match e {
                RagError::InferenceError(_) => e,
                other => RagError::InferenceError(other.to_string()),
            }
        })?;

        let tensor = select_output(&outputs)?;
        let pooled = match ModelOutput::from_tensor(tensor)? {
            ModelOutput::Pooled(vector) => vector,
            ModelOutput::PerToken(hidden) => mean_pool(&hidden, &encoding.mask),
        };

        let embedding = normalize(&pooled);
        let previous = self.dimensions.swap(embedding.len(), Ordering::AcqRel);
        if previous != 0 && previous != embedding.len() {
            warn!("[embedder] Embedding width changed from {} to {}", previous, embedding.len());
        }
        debug!("[embedder] Embedded {} chars into {} dims", text.chars().count(), embedding.len());
        Ok(embedding)
    }

    /// Embed several texts in order. Stops at the first failure.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        info!("[embedder] Embedded batch of {}", out.len());
        Ok(out)
    }
}

/// Average the rows of `hidden` (`[seq, hidden]`) whose mask value is 1.
/// With no unmasked rows every dimension is 0.
pub fn mean_pool(hidden: &Array2<f32>, mask: &[u8]) -> Vec<f32> {
    let hidden_dim = hidden.ncols();
    let mut sum = Array1::<f32>::zeros(hidden_dim);
    let mut count = 0usize;

    for (row, &m) in hidden.rows().into_iter().zip(mask.iter()) {
        if m == 1 {
            sum += &row;
            count += 1;
        }
    }

    if count == 0 {
        return vec![0.0; hidden_dim];
    }
    (sum / count as f32).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{test_engine, test_engine_with, CountingLoader, FixedOutputSession};
    use crate::api::inference::NamedTensor;
    use crate::api::vector_math::{cosine_similarity, norm};
    use futures_util::future::join_all;
    use ndarray::array;

    #[test]
    fn test_mean_pool_respects_mask() {
        let hidden = array![[1.0, 2.0], [3.0, 4.0], [100.0, 100.0]];
        assert_eq!(mean_pool(&hidden, &[1, 1, 0]), vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_all_masked() {
        let hidden = array![[1.0, 2.0, 3.0]];
        assert_eq!(mean_pool(&hidden, &[0]), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_is_unit_length() {
        let (engine, _loader, _model) = test_engine();
        let v = engine.embed("rust ownership and borrow checker").await.unwrap();
        assert!((norm(&v) - 1.0).abs() < 1e-5);
        assert_eq!(engine.dimensions(), Some(v.len()));
        assert!(engine.is_loaded());
    }

    #[tokio::test]
    async fn test_identical_text_identical_embedding() {
        let (engine, _loader, _model) = test_engine();
        let a = engine.embed("pasta with tomato sauce").await.unwrap();
        let b = engine.embed("pasta with tomato sauce").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_load() {
        let (engine, loader, _model) = test_engine_with(CountingLoader::new().with_delay_ms(20));
        let texts = ["rust", "memory", "safety", "pasta", "tomato", "sauce"];
        let results = join_all(texts.iter().map(|t| engine.embed(t))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loader.load_count(), 1);
        assert_eq!(engine.load_status(), LoadStatus::Loaded);
    }

    #[tokio::test]
    async fn test_failed_load_is_shared_then_retried() {
        let (engine, loader, _model) = test_engine_with(CountingLoader::new().with_delay_ms(10).failing_first(1));

        let results = join_all((0..4).map(|_| engine.embed("rust"))).await;
        assert!(results.iter().all(|r| matches!(r, Err(RagError::ModelLoadError(_)))));
        assert_eq!(loader.load_count(), 1);
        assert!(matches!(engine.load_status(), LoadStatus::Failed(_)));

        engine.embed("rust").await.unwrap();
        assert_eq!(loader.load_count(), 2);
        assert!(engine.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_model_file() {
        let loader = Arc::new(CountingLoader::new());
        let tokenizer = crate::api::testing::test_tokenizer();
        let engine = EmbeddingEngine::new("/nonexistent/model.onnx", tokenizer, loader.clone());

        let err = engine.embed("rust").await.unwrap_err();
        assert!(matches!(err, RagError::ModelLoadError(_)));
        assert_eq!(loader.load_count(), 0);
    }

    #[tokio::test]
    async fn test_model_path_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(CountingLoader::new());
        let tokenizer = crate::api::testing::test_tokenizer();
        let engine = EmbeddingEngine::new(dir.path(), tokenizer, loader.clone());

        let err = engine.preload().await.unwrap_err();
        assert!(matches!(err, RagError::ModelLoadError(msg) if msg.contains("does not exist")));
        assert_eq!(loader.load_count(), 0);
        assert!(matches!(engine.load_status(), LoadStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_pooled_output_used_directly() {
        let output = NamedTensor::from_raw("sentence_embedding", &[1, 2], vec![3.0, 4.0]).unwrap();
        let loader = CountingLoader::new().with_session(Arc::new(FixedOutputSession::new(vec![output])));
        let (engine, _loader, _model) = test_engine_with(loader);

        let v = engine.embed("anything").await.unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_outputs_is_inference_error() {
        let loader = CountingLoader::new().with_session(Arc::new(FixedOutputSession::new(vec![])));
        let (engine, _loader, _model) = test_engine_with(loader);

        let err = engine.embed("anything").await.unwrap_err();
        assert!(matches!(err, RagError::InferenceError(_)));
        // Inference failures do not unload the model
        assert!(engine.is_loaded());
    }

    #[tokio::test]
    async fn test_preload() {
        let (engine, loader, _model) = test_engine();
        assert_eq!(engine.load_status(), LoadStatus::Unloaded);
        engine.preload().await.unwrap();
        engine.preload().await.unwrap();
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let (engine, _loader, _model) = test_engine();
        let texts = vec!["rust memory".to_string(), "pasta sauce".to_string()];
        let out = engine.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_ne!(out[0], out[1]);
    }
}
