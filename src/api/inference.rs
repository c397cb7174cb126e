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
//! Boundary types for the external inference engine.
//!
//! ONNX execution lives in the host app; this crate hands it three named
//! integer tensors and receives named float tensors back.

use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use ndarray::{Array2, ArrayD, Axis, IxDyn};
use crate::api::error::RagError;
use crate::api::tokenizer::TokenEncoding;

pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";

pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";
pub const SENTENCE_EMBEDDING: &str = "sentence_embedding";

/// Model inputs, each with shape `[1, seq_len]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl ModelInputs {
    /// Token ids and mask from the encoding plus an all-zero segment array.
    pub fn from_encoding(encoding: &TokenEncoding) -> Self {
        Self {
            input_ids: encoding.ids.iter().map(|&id| id as i64).collect(),
            attention_mask: encoding.mask.iter().map(|&m| m as i64).collect(),
            token_type_ids: vec![0; encoding.ids.len()],
        }
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }

    /// `[batch, seq_len]` with the batch dimension fixed at 1.
    pub fn shape(&self) -> [usize; 2] {
        [1, self.seq_len()]
    }

    /// Inputs keyed by the names the exported model expects.
    pub fn named(&self) -> [(&'static str, &[i64]); 3] {
        [
            (INPUT_IDS, self.input_ids.as_slice()),
            (ATTENTION_MASK, self.attention_mask.as_slice()),
            (TOKEN_TYPE_IDS, self.token_type_ids.as_slice()),
        ]
    }
}

/// One named output tensor.
#[derive(Debug, Clone)]
pub struct NamedTensor {
    pub name: String,
    pub data: ArrayD<f32>,
}

impl NamedTensor {
    /// Build from a flat f32 buffer plus its dims, as the engine reports them.
    pub fn from_raw(name: impl Into<String>, dims: &[usize], data: Vec<f32>) -> Result<Self, RagError> {
        let name = name.into();
        let data = ArrayD::from_shape_vec(IxDyn(dims), data)
            .map_err(|e| RagError::InferenceError(format!("Output '{}' has inconsistent shape {:?}: {}", name, dims, e)))?;
        Ok(Self { name, data })
    }
}

/// Model output after shape dispatch, decided once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// `[batch, hidden]`: one sentence vector, already pooled.
    Pooled(Vec<f32>),
    /// `[batch, seq, hidden]`: per-token hidden states for batch item 0.
    PerToken(Array2<f32>),
}

impl ModelOutput {
    pub fn from_tensor(tensor: &NamedTensor) -> Result<Self, RagError> {
        let shape = tensor.data.shape();
        if shape.first().copied().unwrap_or(0) == 0 {
            return Err(RagError::InferenceError(format!("Output '{}' has empty batch: {:?}", tensor.name, shape)));
        }
        match shape.len() {
            2 => Ok(ModelOutput::Pooled(tensor.data.index_axis(Axis(0), 0).iter().copied().collect())),
            3 => {
                let first = tensor.data.index_axis(Axis(0), 0).to_owned();
                let matrix = first
                    .into_dimensionality::<ndarray::Ix2>()
                    .map_err(|e| RagError::InferenceError(e.to_string()))?;
                Ok(ModelOutput::PerToken(matrix))
            }
            n => Err(RagError::InferenceError(format!(
                "Unexpected output rank {} for '{}' (shape {:?})",
                n, tensor.name, shape
            ))),
        }
    }
}

/// Pick the output to pool: `last_hidden_state`, then `sentence_embedding`,
/// then whatever came first.
pub fn select_output(outputs: &[NamedTensor]) -> Result<&NamedTensor, RagError> {
    outputs
        .iter()
        .find(|t| t.name == LAST_HIDDEN_STATE)
        .or_else(|| outputs.iter().find(|t| t.name == SENTENCE_EMBEDDING))
        .or_else(|| outputs.first())
        .ok_or_else(|| RagError::InferenceError("Model returned no usable output".to_string()))
}

/// A loaded model ready for inference.
#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Run one forward pass. Outputs are returned in the engine's order.
    async fn run(&self, inputs: &ModelInputs) -> Result<Vec<NamedTensor>, RagError>;
}

/// Creates inference sessions from a serialized model on disk.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn InferenceSession>, RagError>;
}
