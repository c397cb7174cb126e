//! Fakes for the inference and storage boundaries used across unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::path::Path;
use async_trait::async_trait;

use crate::api::embedder::EmbeddingEngine;
use crate::api::error::RagError;
use crate::api::inference::{InferenceSession, ModelInputs, ModelLoader, NamedTensor, LAST_HIDDEN_STATE};
use crate::api::note_store::{MemoryNoteStore, NoteStore};
use crate::api::tokenizer::{Vocabulary, WordPieceTokenizer, DEFAULT_MAX_SEQUENCE_LENGTH};

pub const HIDDEN_SIZE: usize = 64;

const WORDS: &[&str] = &[
    "rust", "memory", "safety", "ownership", "borrow", "checker", "python", "garbage",
    "collector", "cooking", "pasta", "recipe", "tomato", "sauce", "the", "is", "a", "and",
    "for", "with", "without", "language", "systems", "dinner", "quick", "fresh", "basil",
    "notes", "meeting", "project", "deadline", "friday",
];

pub fn test_vocab() -> Vocabulary {
    let specials = ["[PAD]", "[UNK]", "[CLS]", "[SEP]"];
    Vocabulary::from_entries(
        specials
            .iter()
            .chain(WORDS.iter())
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32)),
    )
    .unwrap()
}

pub fn test_tokenizer() -> WordPieceTokenizer {
    WordPieceTokenizer::new(test_vocab(), DEFAULT_MAX_SEQUENCE_LENGTH).unwrap()
}

/// Per-token one-hot hidden states (`[1, seq, HIDDEN_SIZE]`). Padding rows are
/// filled with a large constant so a pooling bug that ignores the mask shows up.
pub struct BagOfWordsSession;

#[async_trait]
impl InferenceSession for BagOfWordsSession {
    async fn run(&self, inputs: &ModelInputs) -> Result<Vec<NamedTensor>, RagError> {
        let seq = inputs.seq_len();
        let mut data = vec![0.0f32; seq * HIDDEN_SIZE];
        for (s, (&id, &m)) in inputs.input_ids.iter().zip(inputs.attention_mask.iter()).enumerate() {
            let row = &mut data[s * HIDDEN_SIZE..(s + 1) * HIDDEN_SIZE];
            if m == 0 {
                row.iter_mut().for_each(|x| *x = 50.0);
            } else {
                row[id as usize % HIDDEN_SIZE] = 1.0;
            }
        }
        Ok(vec![NamedTensor::from_raw(LAST_HIDDEN_STATE, &[1, seq, HIDDEN_SIZE], data)?])
    }
}

/// Returns the same outputs for every input.
pub struct FixedOutputSession {
    outputs: Vec<NamedTensor>,
}

impl FixedOutputSession {
    pub fn new(outputs: Vec<NamedTensor>) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl InferenceSession for FixedOutputSession {
    async fn run(&self, _inputs: &ModelInputs) -> Result<Vec<NamedTensor>, RagError> {
        Ok(self.outputs.clone())
    }
}

/// Loader that counts calls, can sleep, and can fail its first N loads.
pub struct CountingLoader {
    loads: AtomicUsize,
    fail_first: usize,
    delay_ms: u64,
    session: Option<Arc<dyn InferenceSession>>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self { loads: AtomicUsize::new(0), fail_first: 0, delay_ms: 0, session: None }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn InferenceSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self, _model_path: &Path) -> Result<Arc<dyn InferenceSession>, RagError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if attempt <= self.fail_first {
            return Err(RagError::ModelLoadError(format!("simulated failure #{}", attempt)));
        }
        Ok(match &self.session {
            Some(session) => Arc::clone(session),
            None => Arc::new(BagOfWordsSession),
        })
    }
}

pub fn test_engine_with(loader: CountingLoader) -> (Arc<EmbeddingEngine>, Arc<CountingLoader>, tempfile::NamedTempFile) {
    let model_file = tempfile::NamedTempFile::new().unwrap();
    let loader = Arc::new(loader);
    let engine = EmbeddingEngine::new(model_file.path(), test_tokenizer(), loader.clone());
    (Arc::new(engine), loader, model_file)
}

pub fn test_engine() -> (Arc<EmbeddingEngine>, Arc<CountingLoader>, tempfile::NamedTempFile) {
    test_engine_with(CountingLoader::new())
}

/// In-memory store holding `texts` embedded with `engine`, inserted in order.
pub async fn seeded_store(engine: &EmbeddingEngine, texts: &[&str]) -> Arc<MemoryNoteStore> {
    let store = Arc::new(MemoryNoteStore::new());
    for text in texts {
        let vector = engine.embed(text).await.unwrap();
        store.insert(text.to_string(), vector).await.unwrap();
    }
    store
}
