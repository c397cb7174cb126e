// rust/src/api/context_builder.rs
//! Assemble a bounded LLM context from the top retrieved notes.
//!
//! Each note contributes at most a couple of salient sentences, tagged with a
//! relevance tier so the reader can weigh sources.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::note_store::StoredItem;
use crate::api::ranker::{top_k, ScoredItem};

pub const DEFAULT_MAX_KEY_SENTENCES: usize = 2;
const MIN_SENTENCE_CHARS: usize = 10;
const KEY_PHRASES: &[&str] = &["important", "key", "main", "note", "remember", "summary"];

static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());
static CAPITALIZED_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").unwrap());

/// Context handed to the summarizer / LLM, plus the notes it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub text: String,
    pub source_items: Vec<StoredItem>,
    /// Period-terminated key sentences of every block, in block order.
    pub key_sentences: Vec<String>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.source_items.is_empty()
    }
}

pub fn relevance_label(score: f64) -> &'static str {
    if score > 0.7 {
        "High"
    } else if score > 0.5 {
        "Medium"
    } else {
        "Low"
    }
}

fn split_fragments(text: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Heuristic salience of a sentence at `position` within its note.
fn sentence_score(sentence: &str, position: usize) -> f64 {
    let mut score = 0.0;
    if position == 0 {
        score += 3.0;
    }

    let word_count = sentence.split_whitespace().count();
    if (5..=30).contains(&word_count) {
        score += 2.0;
    }

    let lower = sentence.to_lowercase();
    score += KEY_PHRASES.iter().filter(|p| lower.contains(*p)).count() as f64;

    let capitalized = CAPITALIZED_WORD.find_iter(sentence).count() as f64;
    score += (capitalized * 0.5).min(2.0);
    score
}

/// Up to `max_sentences` salient sentences, in reading order.
/// Fragments of 10 characters or fewer are ignored.
pub fn extract_key_sentences(text: &str, max_sentences: usize) -> Vec<String> {
    let sentences: Vec<String> = split_fragments(text)
        .into_iter()
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .collect();

    if sentences.len() <= max_sentences {
        return sentences;
    }

    let mut ranked: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| (i, sentence_score(s, i)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    ranked.truncate(max_sentences);
    ranked.sort_by_key(|(i, _)| *i);

    ranked.into_iter().map(|(i, _)| sentences[i].clone()).collect()
}

/// Header line plus the item's key sentences. An item without any key
/// sentence renders as the header alone.
fn render_block(index: usize, scored: &ScoredItem, sentences: &[String]) -> String {
    let header = format!("[Source {}] ({} relevance)", index + 1, relevance_label(scored.score));
    if sentences.is_empty() {
        return header;
    }
    format!("{}\n{}", header, sentences.join(" "))
}

/// Build a context from the `k` best items using the default sentence budget.
pub fn build_context(scored_items: &[ScoredItem], k: usize) -> Context {
    build_context_with_limit(scored_items, k, DEFAULT_MAX_KEY_SENTENCES)
}

pub fn build_context_with_limit(scored_items: &[ScoredItem], k: usize, max_sentences: usize) -> Context {
    let selected = top_k(scored_items, k);
    if selected.is_empty() {
        return Context::default();
    }

    let mut blocks = Vec::with_capacity(selected.len());
    let mut key_sentences = Vec::new();
    for (i, scored) in selected.iter().enumerate() {
        let sentences: Vec<String> = extract_key_sentences(&scored.item.text, max_sentences)
            .into_iter()
            .map(|s| format!("{}.", s))
            .collect();
        blocks.push(render_block(i, scored, &sentences));
        key_sentences.extend(sentences);
    }
    let text = blocks.join("\n\n");

    log::debug!("[context] Built context from {} notes, {} chars", selected.len(), text.chars().count());
    Context {
        text,
        source_items: selected.into_iter().map(|s| s.item).collect(),
        key_sentences,
    }
}
