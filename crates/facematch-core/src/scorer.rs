//! Distance-to-score calibration.
//!
//! Maps the Euclidean distance between two face embeddings onto a 0–100
//! similarity score with a linear decay: distance 0 scores 100, distances at
//! or beyond the threshold score 0.

use crate::types::Embedding;
use thiserror::Error;

/// Distance at which the score reaches 0.
///
/// Chosen empirically against the recognizer's distance scale; re-derive it
/// whenever the embedding model changes.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 1.5;

const MAX_SCORE: f64 = 100.0;

#[derive(Error, Debug, PartialEq)]
pub enum ScorerError {
    #[error("score threshold must be finite and greater than zero, got {0}")]
    InvalidThreshold(f64),
}

/// Linear-decay similarity scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScorer {
    threshold: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl SimilarityScorer {
    pub fn new(threshold: f64) -> Result<Self, ScorerError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ScorerError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score two embeddings of the same dimension.
    pub fn score(&self, a: &Embedding, b: &Embedding) -> f64 {
        debug_assert_eq!(a.dim(), b.dim(), "embedding dimensions must match");
        self.score_distance(a.euclidean_distance(b))
    }

    /// Score a precomputed embedding distance, clamped to [0, 100].
    pub fn score_distance(&self, distance: f64) -> f64 {
        if distance.is_nan() {
            return 0.0;
        }
        let raw = MAX_SCORE - (distance / self.threshold) * MAX_SCORE;
        raw.clamp(0.0, MAX_SCORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_embeddings_score_100() {
        let e = Embedding::new(vec![0.12, -0.4, 0.33, 0.9]);
        assert_eq!(SimilarityScorer::default().score(&e, &e), 100.0);
    }

    #[test]
    fn test_linear_decay() {
        let scorer = SimilarityScorer::default();
        assert!((scorer.score_distance(0.9) - 40.0).abs() < 1e-9);
        assert!((scorer.score_distance(0.75) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_embedding_distance_0_9() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.9, 0.0]);
        let score = SimilarityScorer::default().score(&a, &b);
        assert!((score - 40.0).abs() < 1e-4, "got {score}");
    }

    #[test]
    fn test_distance_beyond_threshold_clamps_to_zero() {
        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.score_distance(1.5), 0.0);
        assert_eq!(scorer.score_distance(2.0), 0.0);
        assert_eq!(scorer.score_distance(f64::INFINITY), 0.0);
        assert_eq!(scorer.score_distance(f64::NAN), 0.0);
    }

    #[test]
    fn test_monotonically_non_increasing() {
        let scorer = SimilarityScorer::default();
        let mut prev = scorer.score_distance(0.0);
        for step in 1..=300 {
            let score = scorer.score_distance(step as f64 * 0.01);
            assert!(score <= prev, "score rose at step {step}: {prev} -> {score}");
            assert!((0.0..=100.0).contains(&score));
            prev = score;
        }
    }

    #[test]
    fn test_custom_threshold() {
        let scorer = SimilarityScorer::new(1.0).unwrap();
        assert!((scorer.score_distance(0.25) - 75.0).abs() < 1e-9);
        assert_eq!(scorer.score_distance(1.0), 0.0);
    }

    #[test]
    fn test_rejects_invalid_threshold() {
        assert_eq!(
            SimilarityScorer::new(0.0),
            Err(ScorerError::InvalidThreshold(0.0))
        );
        assert!(SimilarityScorer::new(-1.5).is_err());
        assert!(SimilarityScorer::new(f64::NAN).is_err());
        assert!(SimilarityScorer::new(f64::INFINITY).is_err());
    }
}
