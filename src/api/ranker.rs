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
//! Result narrowing: top-K, thresholded top-K and Maximal Marginal Relevance.

use std::cmp::Ordering;
use std::collections::HashSet;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::api::note_store::StoredItem;

/// A note paired with its per-query relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: StoredItem,
    pub score: f64,
}

/// Sort descending by score. Stable: equal scores keep their input order.
pub fn sort_by_score(list: &mut [ScoredItem]) {
    list.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

pub fn top_k(list: &[ScoredItem], k: usize) -> Vec<ScoredItem> {
    if k == 0 {
        return Vec::new();
    }
    let mut sorted = list.to_vec();
    sort_by_score(&mut sorted);
    sorted.truncate(k);
    sorted
}

pub fn top_k_with_threshold(list: &[ScoredItem], k: usize, min_score: f64) -> Vec<ScoredItem> {
    let mut sorted = list.to_vec();
    sort_by_score(&mut sorted);
    sorted.into_iter().filter(|s| s.score >= min_score).take(k).collect()
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Jaccard similarity of the lowercased whitespace-separated word sets.
pub fn text_overlap(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

/// Maximal Marginal Relevance selection of up to `k` items.
///
/// Each round picks the candidate maximizing
/// `lambda * score + (1 - lambda) * diversity`, where diversity is
/// `1 - min overlap` with the items already selected (1 when none are).
/// Ties go to the earlier candidate in score order.
pub fn mmr_rank(list: &[ScoredItem], k: usize, lambda: f64) -> Vec<ScoredItem> {
    let mut remaining = list.to_vec();
    sort_by_score(&mut remaining);
    let mut selected: Vec<ScoredItem> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let diversity = if selected.is_empty() {
                1.0
            } else {
                let min_overlap = selected
                    .iter()
                    .map(|s| text_overlap(&candidate.item.text, &s.item.text))
                    .fold(f64::INFINITY, f64::min);
                1.0 - min_overlap
            };
            let mmr_score = lambda * candidate.score + (1.0 - lambda) * diversity;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    debug!("[ranker] MMR selected {} of {} (lambda={})", selected.len(), list.len(), lambda);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: i64, text: &str, score: f64) -> ScoredItem {
        ScoredItem {
            item: StoredItem { id, text: text.to_string(), vector: vec![1.0], created_at: 0 },
            score,
        }
    }

    fn ids(list: &[ScoredItem]) -> Vec<i64> {
        list.iter().map(|s| s.item.id).collect()
    }

    fn sample() -> Vec<ScoredItem> {
        vec![
            scored(1, "rust memory safety", 0.40),
            scored(2, "rust memory safety guide", 0.90),
            scored(3, "pasta with tomato sauce", 0.70),
            scored(4, "rust memory safety guide book", 0.85),
            scored(5, "meeting notes for friday", 0.10),
        ]
    }

    #[test]
    fn test_top_k() {
        let result = top_k(&sample(), 3);
        assert_eq!(ids(&result), vec![2, 4, 3]);
        assert!(top_k(&sample(), 0).is_empty());
        assert_eq!(top_k(&sample(), 50).len(), 5);
    }

    #[test]
    fn test_top_k_is_sorted_prefix() {
        let mut all = sample();
        sort_by_score(&mut all);
        for k in 0..=6 {
            let result = top_k(&sample(), k);
            assert!(result.len() <= k);
            assert_eq!(result.as_slice(), &all[..result.len()]);
        }
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut list = vec![scored(1, "a", 0.5), scored(2, "b", 0.9), scored(3, "c", 0.5)];
        sort_by_score(&mut list);
        assert_eq!(ids(&list), vec![2, 1, 3]);
    }

    #[test]
    fn test_threshold() {
        let result = top_k_with_threshold(&sample(), 10, 0.5);
        assert_eq!(ids(&result), vec![2, 4, 3]);
        assert!(result.iter().all(|s| s.score >= 0.5));
        assert_eq!(ids(&top_k_with_threshold(&sample(), 1, 0.5)), vec![2]);
        assert!(top_k_with_threshold(&sample(), 10, 0.95).is_empty());
    }

    #[test]
    fn test_text_overlap() {
        assert_eq!(text_overlap("a b c", "A B C"), 1.0);
        assert_eq!(text_overlap("a b", "c d"), 0.0);
        assert!((text_overlap("a b c", "b c d") - 0.5).abs() < 1e-9);
        assert_eq!(text_overlap("", "  "), 0.0);
    }

    #[test]
    fn test_mmr_lambda_one_matches_top_k() {
        for k in 0..=5 {
            assert_eq!(mmr_rank(&sample(), k, 1.0), top_k(&sample(), k));
        }
    }

    #[test]
    fn test_mmr_promotes_diversity() {
        // Relevance alone would pick 2 then 4 (near duplicates).
        let result = mmr_rank(&sample(), 2, 0.5);
        assert_eq!(ids(&result), vec![2, 3]);
    }

    #[test]
    fn test_mmr_ties_go_to_earlier_candidate() {
        let list = vec![scored(1, "alpha beta", 0.5), scored(2, "gamma delta", 0.5)];
        assert_eq!(ids(&mmr_rank(&list, 1, 0.7)), vec![1]);

        let reversed = vec![list[1].clone(), list[0].clone()];
        assert_eq!(ids(&mmr_rank(&reversed, 1, 0.7)), vec![2]);

        // Second round: both remaining candidates score and overlap equally.
        let list = vec![
            scored(1, "seed note", 0.9),
            scored(2, "left branch", 0.4),
            scored(3, "right branch", 0.4),
        ];
        assert_eq!(ids(&mmr_rank(&list, 2, 0.5)), vec![1, 2]);
    }

    #[test]
    fn test_mmr_exhausts_remaining() {
        let result = mmr_rank(&sample()[..2], 5, 0.7);
        assert_eq!(result.len(), 2);
        assert!(mmr_rank(&[], 3, 0.7).is_empty());
    }
}
