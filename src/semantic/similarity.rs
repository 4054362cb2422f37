//! Cosine similarity and top-k selection over dense row vectors.

use rayon::prelude::*;
use std::cmp::Ordering;

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors.
///
/// A zero-norm or non-finite operand has similarity 0 with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norm(a, l2_norm(a), b)
}

/// Cosine similarity with the left operand's norm precomputed.
pub fn cosine_with_norm(query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
    let target_norm = l2_norm(target);
    if !query_norm.is_finite() || !target_norm.is_finite() {
        return 0.0;
    }
    if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / (query_norm * target_norm)
}

/// Scored row reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub index: usize,
    pub score: f32,
}

/// The `k` rows most similar to `query`, best first.
///
/// Equal scores keep row order, so the result is deterministic.
pub fn top_k(query: &[f32], rows: &[Vec<f32>], k: usize) -> Vec<Scored> {
    if k == 0 || rows.is_empty() {
        return vec![];
    }

    let query_norm = l2_norm(query);
    let mut scored: Vec<Scored> = rows
        .par_iter()
        .enumerate()
        .map(|(index, row)| Scored {
            index,
            score: cosine_with_norm(query, query_norm, row),
        })
        .collect();

    scored.sort_by(|a, b| descending(a.score, b.score).then(a.index.cmp(&b.index)));
    scored.truncate(k);
    scored
}

fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}
