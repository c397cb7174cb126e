// Copyright 2025 mobile_rag_engine contributors
// SPDX-License-Identifier: MIT
//
// CONTRIBUTOR GUIDELINES:
// This file is part of the core engine. Any modifications require owner approval.
// Please submit a PR with detailed explanation of changes before modifying.

pub mod error;
pub mod logger;
pub mod config;
pub mod vector_math;
pub mod tokenizer;
pub mod inference;
pub mod embedder;
pub mod db_pool;
pub mod note_store;
pub mod ranker;
pub mod retriever;
pub mod context_builder;
pub mod summarizer;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;
