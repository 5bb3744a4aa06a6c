/// Cosine similarity with a SIMD path and a scalar reference path, plus the
/// keyword overlap signal used by hybrid scoring and text matching
use simsimd::SpatialSimilarity;
use std::collections::HashSet;

/// Cosine similarity between two vectors of equal dimension
///
/// Returns 0.0 for mismatched dimensions, empty inputs, zero-norm vectors or
/// non-finite results. The SIMD kernel is used when available; the scalar
/// path defines the expected value.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> f32 {
    if lhs.is_empty() || lhs.len() != rhs.len() {
        return 0.0;
    }
    if is_zero(lhs) || is_zero(rhs) {
        return 0.0;
    }

    let similarity = match f32::cosine(lhs, rhs) {
        Some(distance) => ((1.0 - distance) as f32).clamp(-1.0, 1.0),
        None => cosine_similarity_scalar(lhs, rhs),
    };

    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Straightforward dot-product over norms
pub fn cosine_similarity_scalar(lhs: &[f32], rhs: &[f32]) -> f32 {
    if lhs.len() != rhs.len() {
        return 0.0;
    }
    let dot: f32 = lhs.iter().zip(rhs).map(|(a, b)| a * b).sum();
    let norm_l: f32 = lhs.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_r: f32 = rhs.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_l == 0.0 || norm_r == 0.0 {
        return 0.0;
    }
    let similarity = (dot / (norm_l * norm_r)).clamp(-1.0, 1.0);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

/// Lowercased alphanumeric terms of a text
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| term.to_lowercase())
        .collect()
}

/// Fraction of distinct query terms that occur in `text`, in [0, 1]
pub fn keyword_overlap(query: &str, text: &str) -> f32 {
    let query_terms: HashSet<String> = terms(query).into_iter().collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms: HashSet<String> = terms(text).into_iter().collect();
    let matched = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
    matched as f32 / query_terms.len() as f32
}
