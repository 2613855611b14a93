//! Gradient-boosted tree scorer loaded from a versioned JSON artifact.

use super::ngram::count_features;
use super::Scorer;
use crate::core::error::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `feature < threshold` goes left, otherwise right.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, features: &HashMap<usize, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features.get(&feature).copied().unwrap_or(0.0);
                    index = if x < threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradientBoostedModel {
    pub format_version: u32,
    pub model_version: String,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
}

fn default_ngram_min() -> usize {
    2
}

fn default_ngram_max() -> usize {
    4
}

fn default_learning_rate() -> f64 {
    1.0
}

impl GradientBoostedModel {
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| AppError::Model(format!("Unreadable model artifact: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Model(format!("Cannot read model artifact {}: {}", path.display(), e))
        })?;
        let model = Self::from_json(&json)?;
        tracing::info!(target: "ranker_task",
            "Loaded ranking model {} ({} trees, {} n-grams) from {}",
            model.model_version, model.trees.len(), model.vocabulary.len(), path.display()
        );
        Ok(model)
    }

    /// Every split must point forward to an existing node, which also rules out cycles.
    fn validate(&self) -> Result<()> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(AppError::Model(format!(
                "Unsupported model format version {} (expected {})",
                self.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(AppError::Model(format!(
                "Invalid n-gram range {}..={}",
                self.ngram_min, self.ngram_max
            )));
        }
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(AppError::Model("Non-finite model coefficients".to_string()));
        }

        let features = self.vocabulary.len();
        if let Some((gram, index)) = self.vocabulary.iter().find(|(_, &i)| i >= features) {
            return Err(AppError::Model(format!(
                "Vocabulary entry {:?} has out-of-range index {}",
                gram, index
            )));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(AppError::Model(format!("Tree {} has no nodes", t)));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match *node {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        let in_range = |child: usize| child > i && child < tree.nodes.len();
                        if feature >= features || !threshold.is_finite() || !in_range(left) || !in_range(right) {
                            return Err(AppError::Model(format!(
                                "Tree {} node {} is malformed",
                                t, i
                            )));
                        }
                    }
                    TreeNode::Leaf { value } if !value.is_finite() => {
                        return Err(AppError::Model(format!(
                            "Tree {} leaf {} is not finite",
                            t, i
                        )));
                    }
                    TreeNode::Leaf { .. } => {}
                }
            }
        }
        Ok(())
    }
}

impl Scorer for GradientBoostedModel {
    fn score(&self, candidate: &str) -> f64 {
        let features = count_features(candidate, self.ngram_min, self.ngram_max, &self.vocabulary);
        let margin: f64 = self.trees.iter().map(|tree| tree.evaluate(&features)).sum();
        let logit = self.base_score + self.learning_rate * margin;
        1.0 / (1.0 + (-logit).exp())
    }

    fn version(&self) -> &str {
        &self.model_version
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// One stump: addresses containing a "." n-gram score high.
    pub(crate) const DOT_MODEL: &str = r#"{
        "format_version": 1,
        "model_version": "dot-stump",
        "ngram_min": 1,
        "ngram_max": 1,
        "vocabulary": {".": 0, "_": 1},
        "base_score": 0.0,
        "learning_rate": 1.0,
        "trees": [
            {"nodes": [
                {"kind": "split", "feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"kind": "leaf", "value": -2.0},
                {"kind": "leaf", "value": 2.0}
            ]}
        ]
    }"#;

    #[test]
    fn scores_are_probabilities_and_deterministic() {
        let model = GradientBoostedModel::from_json(DOT_MODEL).unwrap();
        let dotted = model.score("jane.doe@acme.com");
        let plain = model.score("janedoe@acme");

        assert!(dotted > 0.5 && dotted < 1.0);
        assert!(plain < 0.5 && plain > 0.0);
        assert_eq!(dotted, model.score("jane.doe@acme.com"));
        assert_eq!(model.version(), "dot-stump");
    }

    #[test]
    fn empty_ensemble_scores_base() {
        let json = r#"{"format_version": 1, "model_version": "empty",
            "vocabulary": {}, "trees": []}"#;
        let model = GradientBoostedModel::from_json(json).unwrap();
        assert_eq!(model.score("anything@acme.com"), 0.5);
    }

    #[test]
    fn rejects_wrong_version() {
        let json = DOT_MODEL.replace("\"format_version\": 1", "\"format_version\": 2");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(AppError::Model(_))
        ));
    }

    #[test]
    fn rejects_backward_references() {
        let json = DOT_MODEL.replace("\"left\": 1", "\"left\": 0");
        assert!(matches!(
            GradientBoostedModel::from_json(&json),
            Err(AppError::Model(_))
        ));
    }

    #[test]
    fn rejects_unknown_features() {
        let json = DOT_MODEL.replace("\"feature\": 0", "\"feature\": 7");
        assert!(GradientBoostedModel::from_json(&json).is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOT_MODEL.as_bytes()).unwrap();
        let model = GradientBoostedModel::load(file.path()).unwrap();
        assert_eq!(model.trees.len(), 1);

        let missing = GradientBoostedModel::load(Path::new("/nonexistent/model.json"));
        assert!(matches!(missing, Err(AppError::Model(_))));
    }
}
