// rust/src/api/summarizer.rs
//! Extractive summarization using TF-IDF sentence scoring.
//!
//! Sentences are treated as the documents of the IDF corpus, so a word that
//! appears in every sentence carries the least weight.

use std::collections::{HashMap, HashSet};
use once_cell::sync::Lazy;
use regex::Regex;
use log::debug;

pub const DEFAULT_SUMMARY_SENTENCES: usize = 3;
const MIN_SENTENCE_CHARS: usize = 5;
const POSITION_BIAS: f64 = 0.3;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Split after `.`, `!` or `?` when followed by whitespace. Punctuation stays
/// with its sentence; fragments of 5 characters or fewer are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    sentences.push(&text[start..next_idx]);
                    start = next_idx;
                }
            }
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .map(str::to_string)
        .collect()
}

/// Lowercased words longer than two characters, punctuation treated as space.
fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_WORD
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// `idf(w) = ln((N + 1) / (df + 1)) + 1` with sentences as documents.
fn inverse_document_frequency(sentence_words: &[Vec<String>]) -> HashMap<String, f64> {
    let n = sentence_words.len() as f64;
    let mut df: HashMap<String, usize> = HashMap::new();
    for ws in sentence_words {
        let unique: HashSet<&String> = ws.iter().collect();
        for w in unique {
            *df.entry(w.clone()).or_insert(0) += 1;
        }
    }
    df.into_iter()
        .map(|(w, count)| {
            let idf = ((n + 1.0) / (count as f64 + 1.0)).ln() + 1.0;
            (w, idf)
        })
        .collect()
}

fn term_frequencies(ws: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for w in ws {
        *counts.entry(w.as_str()).or_insert(0.0) += 1.0;
    }
    let total = ws.len() as f64;
    counts.values_mut().for_each(|c| *c /= total);
    counts
}

/// Sum of tf * idf over the sentence's distinct words, divided by the square
/// root of its word count. Zero for a sentence with no words.
fn sentence_score(ws: &[String], idf: &HashMap<String, f64>) -> f64 {
    if ws.is_empty() {
        return 0.0;
    }
    let raw: f64 = term_frequencies(ws)
        .into_iter()
        .map(|(w, tf)| tf * idf.get(w).copied().unwrap_or(1.0))
        .sum();
    raw / (ws.len() as f64).sqrt()
}

fn tfidf_scores(sentences: &[String]) -> Vec<f64> {
    let sentence_words: Vec<Vec<String>> = sentences.iter().map(|s| words(s)).collect();
    let idf = inverse_document_frequency(&sentence_words);
    sentence_words.iter().map(|ws| sentence_score(ws, &idf)).collect()
}

fn select_sentences(sentences: &[String], scores: &[f64], num_sentences: usize) -> String {
    let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    // Stable: equal scores keep discovery order
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(num_sentences);
    ranked.sort_by_key(|(i, _)| *i);

    ranked.into_iter().map(|(i, _)| sentences[i].as_str()).collect::<Vec<_>>().join(" ")
}

/// The `num_sentences` highest TF-IDF sentences, in original order.
pub fn summarize(text: &str, num_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= num_sentences {
        return sentences.join(" ");
    }
    let scores = tfidf_scores(&sentences);
    debug!("[summarizer] Picking {} of {} sentences", num_sentences, sentences.len());
    select_sentences(&sentences, &scores, num_sentences)
}

/// Like [`summarize`], but earlier sentences get up to a 30% boost:
/// each score is scaled by `1 - (index / count) * 0.3`.
pub fn summarize_with_position_bias(text: &str, num_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= num_sentences {
        return sentences.join(" ");
    }
    let count = sentences.len() as f64;
    let scores: Vec<f64> = tfidf_scores(&sentences)
        .into_iter()
        .enumerate()
        .map(|(i, s)| s * (1.0 - (i as f64 / count) * POSITION_BIAS))
        .collect();
    select_sentences(&sentences, &scores, num_sentences)
}

/// Top `n` words of `text` by tf * idf, tf measured over the whole text and
/// idf over its sentences. Ties are broken alphabetically.
pub fn extract_keywords(text: &str, n: usize) -> Vec<String> {
    let sentence_words: Vec<Vec<String>> = split_sentences(text).iter().map(|s| words(s)).collect();
    let idf = inverse_document_frequency(&sentence_words);
    // Words only found in dropped fragments have df = 0.
    let unseen_idf = ((sentence_words.len() as f64 + 1.0) / 1.0).ln() + 1.0;

    let all_words = words(text);
    if all_words.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(&str, f64)> = term_frequencies(&all_words)
        .into_iter()
        .map(|(w, tf)| (w, tf * idf.get(w).copied().unwrap_or(unseen_idf)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    scored.into_iter().take(n).map(|(w, _)| w.to_string()).collect()
}
