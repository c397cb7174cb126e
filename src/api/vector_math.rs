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
//! Dense vector helpers shared by the embedder and retriever.

use flutter_rust_bridge::frb;
use ndarray::ArrayView1;
use crate::api::error::RagError;

fn check_lengths(a: &[f32], b: &[f32]) -> Result<(), RagError> {
    if a.len() != b.len() {
        return Err(RagError::InvalidInput(format!(
            "Vector length mismatch: a={}, b={}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Sum of elementwise products.
#[frb(sync)]
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, RagError> {
    check_lengths(a, b)?;
    Ok(ArrayView1::from(a).dot(&ArrayView1::from(b)))
}

/// Euclidean (L2) norm.
#[frb(sync)]
pub fn norm(v: &[f32]) -> f32 {
    ArrayView1::from(v).mapv(|x| x * x).sum().sqrt()
}

/// Scale `v` to unit length. A zero vector comes back as zeros, never NaN.
#[frb(sync)]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n == 0.0 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / n).collect()
}

/// Cosine similarity, 0.0 when either side has zero norm.
#[frb(sync)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, RagError> {
    let dot_product = dot(a, b)?;
    let norm_a = norm(a);
    let norm_b = norm(b);

    if norm_a == 0.0 || norm_b == 0.0 { return Ok(0.0); }
    Ok(dot_product / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_dot() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap(), 32.0);
    }

    #[test]
    fn test_dot_length_mismatch() {
        let err = dot(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[test]
    fn test_norm() {
        assert!((norm(&[3.0, 4.0]) - 5.0).abs() < EPS);
        assert_eq!(norm(&[]), 0.0);
    }

    #[test]
    fn test_normalize_unit_length() {
        for v in [vec![3.0, 4.0], vec![0.1, -0.2, 0.3, 0.9], vec![1e-3; 384]] {
            assert!((norm(&normalize(&v)) - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_normalize_zero_vector() {
        let out = normalize(&[0.0; 4]);
        assert_eq!(out, vec![0.0; 4]);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_cosine_self_similarity() {
        let v: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin()).collect();
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < EPS);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
    }
}
