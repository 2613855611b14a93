//! Orders candidates by a learned plausibility prior before verification.

pub mod model;
pub mod ngram;

pub use model::GradientBoostedModel;

use crate::core::config::Config;
use crate::core::models::{CandidateEmail, ScoredCandidate};
use std::sync::Arc;

/// Pure, deterministic plausibility score for a candidate address.
pub trait Scorer: Send + Sync {
    /// Probability-like score in `[0, 1]`.
    fn score(&self, candidate: &str) -> f64;

    fn version(&self) -> &str;
}

/// Applies an optional scorer; without one, generator order is the prior.
#[derive(Clone, Default)]
pub struct Ranker {
    scorer: Option<Arc<dyn Scorer>>,
    min_score: Option<f64>,
}

impl Ranker {
    pub fn static_order() -> Self {
        Self::default()
    }

    pub fn with_scorer(scorer: Arc<dyn Scorer>, min_score: Option<f64>) -> Self {
        Self {
            scorer: Some(scorer),
            min_score,
        }
    }

    /// Loads `model_path` if configured. A missing or invalid artifact degrades
    /// to static ordering.
    pub fn from_config(config: &Config) -> Self {
        let Some(ref path) = config.model_path else {
            tracing::debug!(target: "ranker_task", "No model configured; using static pattern order");
            return Self::static_order();
        };
        match GradientBoostedModel::load(path) {
            Ok(model) => Self::with_scorer(Arc::new(model), config.min_model_score),
            Err(e) => {
                tracing::warn!(target: "ranker_task", "Falling back to static pattern order: {}", e);
                Self::static_order()
            }
        }
    }

    pub fn is_learned(&self) -> bool {
        self.scorer.is_some()
    }

    /// Orders `candidates` by descending score, ties keeping generator order.
    ///
    /// In static mode the probability is a rank-based prior `1 - i/n`.
    pub fn rank(&self, candidates: Vec<CandidateEmail>) -> Vec<ScoredCandidate> {
        let n = candidates.len().max(1) as f64;
        let Some(ref scorer) = self.scorer else {
            return candidates
                .into_iter()
                .enumerate()
                .map(|(i, candidate)| ScoredCandidate {
                    candidate,
                    probability: 1.0 - i as f64 / n,
                })
                .collect();
        };

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let raw = scorer.score(&candidate.address);
                let probability = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
                ScoredCandidate {
                    candidate,
                    probability,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        if let Some(min) = self.min_score {
            if scored.iter().any(|s| s.probability >= min) {
                let before = scored.len();
                scored.retain(|s| s.probability >= min);
                tracing::debug!(target: "ranker_task",
                    "Dropped {} candidates scoring below {}", before - scored.len(), min
                );
            } else {
                tracing::debug!(target: "ranker_task",
                    "Every candidate scored below {}; keeping all", min
                );
            }
        }

        if let Some(top) = scored.first() {
            tracing::debug!(target: "ranker_task",
                "Model {} ranks <{}> first ({:.3})", scorer.version(), top.candidate, top.probability
            );
        }
        scored
    }
}
