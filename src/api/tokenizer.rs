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
//! WordPiece tokenizer producing fixed-length id / attention-mask pairs.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use flutter_rust_bridge::frb;
use log::{debug, info};
use crate::api::error::RagError;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_TOKEN: &str = "[PAD]";
const CONTINUATION_PREFIX: &str = "##";
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 128;

/// Token string -> id mapping with the special-token ids resolved up front.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    cls_id: u32,
    sep_id: u32,
    unk_id: u32,
    pad_id: u32,
    /// Longest token in chars, `##` prefix included. Bounds the match window.
    max_token_chars: usize,
}

impl Vocabulary {
    /// Build from (token, id) pairs. Ids must be unique and all four special
    /// tokens must be present.
    pub fn from_entries<I>(entries: I) -> Result<Self, RagError>
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let mut token_to_id: HashMap<String, u32> = HashMap::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();

        for (token, id) in entries {
            if !seen_ids.insert(id) {
                return Err(RagError::InvalidInput(format!("Duplicate vocabulary id {} (token '{}')", id, token)));
            }
            if token_to_id.insert(token.clone(), id).is_some() {
                return Err(RagError::InvalidInput(format!("Duplicate vocabulary token '{}'", token)));
            }
        }

        let special = |name: &str| {
            token_to_id
                .get(name)
                .copied()
                .ok_or_else(|| RagError::InvalidInput(format!("Vocabulary is missing {}", name)))
        };

        let max_token_chars = token_to_id.keys().map(|t| t.chars().count()).max().unwrap_or(0);
        let vocab = Self {
            cls_id: special(CLS_TOKEN)?,
            sep_id: special(SEP_TOKEN)?,
            unk_id: special(UNK_TOKEN)?,
            pad_id: special(PAD_TOKEN)?,
            max_token_chars,
            token_to_id,
        };
        debug!("[tokenizer] Vocabulary built with {} entries", vocab.len());
        Ok(vocab)
    }

    /// BERT-style `vocab.txt`: one token per line, id = line number.
    pub fn from_vocab_txt(contents: &str) -> Result<Self, RagError> {
        Self::from_entries(
            contents
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (line.trim_end_matches('\r').to_string(), i as u32)),
        )
    }

    /// JSON object of `{"token": id}`.
    pub fn from_json_str(json: &str) -> Result<Self, RagError> {
        let map: HashMap<String, u32> = serde_json::from_str(json)
            .map_err(|e| RagError::InvalidInput(format!("Bad vocabulary JSON: {}", e)))?;
        Self::from_entries(map)
    }

    /// Load from disk, choosing the format by extension (`.json` or line-per-token).
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::IoError(format!("Failed to read vocabulary {}: {}", path.display(), e)))?;
        let vocab = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents)?,
            _ => Self::from_vocab_txt(&contents)?,
        };
        info!("[tokenizer] Loaded vocabulary from {} ({} entries)", path.display(), vocab.len());
        Ok(vocab)
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Id for `token`, falling back to `[UNK]`.
    pub fn id_of(&self, token: &str) -> u32 {
        self.get(token).unwrap_or(self.unk_id)
    }

    pub fn pad_id(&self) -> u32 { self.pad_id }
    pub fn unk_id(&self) -> u32 { self.unk_id }
    pub fn cls_id(&self) -> u32 { self.cls_id }
    pub fn sep_id(&self) -> u32 { self.sep_id }

    pub fn max_token_chars(&self) -> usize {
        self.max_token_chars
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

/// Fixed-length model input. `ids.len() == mask.len()` always; masked-out
/// positions carry the `[PAD]` id.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEncoding {
    pub ids: Vec<u32>,
    pub mask: Vec<u8>,
}

impl TokenEncoding {
    /// Number of real (unmasked) tokens including `[CLS]` and `[SEP]`.
    pub fn real_len(&self) -> usize {
        self.mask.iter().filter(|&&m| m == 1).count()
    }
}

#[frb(ignore)]
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: Vocabulary,
    max_len: usize,
}

impl WordPieceTokenizer {
    pub fn new(vocab: Vocabulary, max_len: usize) -> Result<Self, RagError> {
        if max_len < 2 {
            return Err(RagError::InvalidInput(format!("Sequence length {} cannot hold [CLS] and [SEP]", max_len)));
        }
        Ok(Self { vocab, max_len })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Lowercase, replace anything outside the whitelist with a space, then
    /// collapse whitespace runs and trim.
    pub fn normalize(text: &str) -> String {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '\'' | '-' | '.' | ',' | '!' | '?') {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Greedy longest-match split of a single word. Non-initial pieces carry
    /// the `##` prefix; an unmatchable position yields `[UNK]` and advances
    /// one character.
    pub fn wordpiece(&self, word: &str) -> Vec<String> {
        self.wordpiece_bounded(word, usize::MAX)
    }

    /// [`wordpiece`](Self::wordpiece), stopping once `max_pieces` pieces exist.
    /// The match window never exceeds the longest vocabulary token.
    fn wordpiece_bounded(&self, word: &str, max_pieces: usize) -> Vec<String> {
        // Fast path: the whole word is in the vocabulary.
        if self.vocab.contains(word) {
            return vec![word.to_string()];
        }

        let chars: Vec<char> = word.chars().collect();
        let max_span = self.vocab.max_token_chars();
        let mut pieces = Vec::new();
        let mut candidate = String::new();
        let mut start = 0;

        while start < chars.len() && pieces.len() < max_pieces {
            let mut matched_end = None;
            let mut end = chars.len().min(start + max_span);
            while end > start {
                candidate.clear();
                if start > 0 {
                    candidate.push_str(CONTINUATION_PREFIX);
                }
                candidate.extend(&chars[start..end]);
                if self.vocab.contains(&candidate) {
                    matched_end = Some(end);
                    break;
                }
                end -= 1;
            }

            match matched_end {
                Some(end) => {
                    pieces.push(candidate.clone());
                    start = end;
                }
                None => {
                    pieces.push(UNK_TOKEN.to_string());
                    start += 1;
                }
            }
        }
        pieces
    }

    /// Token strings for `text`: `[CLS]`, word pieces, `[SEP]`. Word pieces stop
    /// once the sequence reaches `max_len - 1` so `[SEP]` always fits.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let normalized = Self::normalize(text);
        let limit = self.max_len - 1;
        let mut tokens = vec![CLS_TOKEN.to_string()];

        for word in normalized.split_whitespace() {
            if tokens.len() >= limit {
                break;
            }
            let budget = limit - tokens.len();
            tokens.extend(self.wordpiece_bounded(word, budget));
        }

        tokens.push(SEP_TOKEN.to_string());
        tokens
    }

    /// Encode `text` into exactly `max_len` ids and mask values.
    pub fn tokenize(&self, text: &str) -> TokenEncoding {
        let tokens = self.tokens(text);
        let mut ids: Vec<u32> = tokens.iter().map(|t| self.vocab.id_of(t)).collect();
        let mut mask: Vec<u8> = vec![1; ids.len()];

        ids.resize(self.max_len, self.vocab.pad_id());
        mask.resize(self.max_len, 0);

        debug!("[tokenizer] {} real tokens, padded to {}", tokens.len(), self.max_len);
        TokenEncoding { ids, mask }
    }

    /// Best-effort inverse of `tokenize`: drops special tokens and glues `##`
    /// continuations back onto the previous piece.
    pub fn decode(&self, ids: &[u32]) -> String {
        let id_to_token: HashMap<u32, &str> =
            self.vocab.token_to_id.iter().map(|(t, id)| (*id, t.as_str())).collect();
        let special = [self.vocab.cls_id, self.vocab.sep_id, self.vocab.pad_id];

        let mut out = String::new();
        for id in ids.iter().filter(|id| !special.contains(id)) {
            let token = id_to_token.get(id).copied().unwrap_or(UNK_TOKEN);
            if let Some(rest) = token.strip_prefix(CONTINUATION_PREFIX) {
                out.push_str(rest);
            } else {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(token);
            }
        }
        out
    }
}
