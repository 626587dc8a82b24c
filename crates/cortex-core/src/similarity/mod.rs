//! Similarity primitives
//!
//! Tokenization, Jaccard set similarity, cosine over dense vectors, and the
//! pre-filter bands that gate whether the expensive comparison runs at all.

use std::collections::HashSet;

use crate::error::{CortexError, Result};

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Split text into an unordered set of lowercased word tokens.
///
/// Non-alphanumeric characters become whitespace, runs collapse, the result
/// deduplicates. Empty or whitespace-only input yields the empty set.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// JACCARD
// ============================================================================

/// Jaccard similarity |A∩B| / |A∪B|.
///
/// Conventions: J(∅,∅) = 1, J(∅,X) = 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Tokenize both inputs and compare.
pub fn text_jaccard(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

// ============================================================================
// COSINE
// ============================================================================

/// Cosine similarity over equal-length dense vectors.
///
/// Dimension mismatch and empty vectors are errors, not coercions. Either
/// magnitude zero yields 0.
pub fn cosine(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(CortexError::EmptyVector);
    }
    if a.len() != b.len() {
        return Err(CortexError::VectorDimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        Ok(dot / denominator)
    } else {
        Ok(0.0)
    }
}

/// Cosine over f32 vectors (local embeddings) via widening.
pub fn cosine_f32(a: &[f32], b: &[f32]) -> Result<f64> {
    let a: Vec<f64> = a.iter().map(|v| *v as f64).collect();
    let b: Vec<f64> = b.iter().map(|v| *v as f64).collect();
    cosine(&a, &b)
}

// ============================================================================
// PRE-FILTER BANDS
// ============================================================================

/// Jaccard bucket gating whether cosine is worth computing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefilterBand {
    /// score > 0.6
    DefinitelySimilar,
    /// score < 0.1
    DefinitelyDifferent,
    /// 0.1 <= score <= 0.6
    Maybe,
}

/// Band a Jaccard score. Boundaries are inclusive at the low end of the
/// maybe band and exclusive at the high end.
pub fn prefilter(score: f64) -> PrefilterBand {
    if score > 0.6 {
        PrefilterBand::DefinitelySimilar
    } else if score < 0.1 {
        PrefilterBand::DefinitelyDifferent
    } else {
        PrefilterBand::Maybe
    }
}

// ============================================================================
// ACTION CLASSIFICATION
// ============================================================================

/// What to do about a similarity score during edge creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityAction {
    /// < 0.1: no edge
    Ignore,
    /// < 0.4: active relates_to edge carrying the score as strength
    Relate { strength: f64 },
    /// <= 0.5: suggested edge carrying the score as strength
    Suggest { strength: f64 },
    /// > 0.5: consolidation candidate (recorded, not auto-merged)
    Consolidate,
}

/// Classify a similarity in [0, 1].
pub fn classify_action(score: f64) -> SimilarityAction {
    if score < 0.1 {
        SimilarityAction::Ignore
    } else if score < 0.4 {
        SimilarityAction::Relate { strength: score }
    } else if score <= 0.5 {
        SimilarityAction::Suggest { strength: score }
    } else {
        SimilarityAction::Consolidate
    }
}

// ============================================================================
// TESTS
// ============================================================================
