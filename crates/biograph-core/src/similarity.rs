//! Similarity scoring and ranking of stored models.
//!
//! A score combines two terms:
//!
//! - **structural**: how close the element and relationship counts are
//! - **children**: the share of the query model's immediate children (by
//!   label and id) that also appear in the other model
//!
//! The children term divides by the query model's child count only, so
//! `compare(a, b)` and `compare(b, a)` can differ.

use crate::config::{SimilarityConfig, SimilarityWeights};
use crate::error::Result;
use crate::repository::plain_tags;
use crate::store::{GraphStore, ModelProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub tag: String,
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub score: f64,
}

/// `1 - |a - b| / (a + b)`, or 1.0 when both are zero.
fn ratio_similarity(a: u64, b: u64) -> f64 {
    let total = a + b;
    if total == 0 {
        return 1.0;
    }
    1.0 - (a.abs_diff(b) as f64) / (total as f64)
}

/// Structural term from element and relationship counts.
pub fn structural_similarity(a: &ModelProfile, b: &ModelProfile) -> f64 {
    if a.elements == b.elements && a.relationships == b.relationships {
        return 1.0;
    }
    0.5 * ratio_similarity(a.elements, b.elements)
        + 0.5 * ratio_similarity(a.relationships, b.relationships)
}

/// Share of `a`'s children also present in `b`; 1.0 when `a` has none.
pub fn children_similarity(a: &ModelProfile, b: &ModelProfile) -> f64 {
    if a.children.is_empty() {
        return 1.0;
    }
    let matched = a.children.intersection(&b.children).count();
    matched as f64 / a.children.len() as f64
}

fn round_percent(score: f64) -> f64 {
    (score * 100.0 * 100.0).round() / 100.0
}

/// Read-only scoring over a graph store.
#[derive(Clone)]
pub struct SimilarityEngine {
    store: Arc<dyn GraphStore>,
    weights: SimilarityWeights,
}

impl SimilarityEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_weights(store, SimilarityWeights::default())
    }

    pub fn with_weights(store: Arc<dyn GraphStore>, weights: SimilarityWeights) -> Self {
        Self { store, weights }
    }

    pub fn weights(&self) -> SimilarityWeights {
        self.weights
    }

    /// Weighted score of two loaded profiles.
    pub fn score(&self, a: &ModelProfile, b: &ModelProfile) -> f64 {
        self.weights.structure() * structural_similarity(a, b)
            + self.weights.children() * children_similarity(a, b)
    }

    /// Similarity of `tag_a` to `tag_b` in `[0, 1]`.
    ///
    /// Returns 0 when either model has no root Model node.
    pub fn compare(&self, tag_a: &str, tag_b: &str) -> Result<f64> {
        let Some(a) = ModelProfile::load(self.store.as_ref(), tag_a)? else {
            debug!("No root model for {}, similarity is 0", tag_a);
            return Ok(0.0);
        };
        let Some(b) = ModelProfile::load(self.store.as_ref(), tag_b)? else {
            debug!("No root model for {}, similarity is 0", tag_b);
            return Ok(0.0);
        };
        Ok(self.score(&a, &b))
    }

    /// Rank every plain stored model, `tag` included, against `tag`.
    ///
    /// Sorted by score descending, then tag. `limit` of `None` returns all.
    pub fn find_all_similar(&self, tag: &str, limit: Option<usize>) -> Result<Vec<SimilarityMatch>> {
        let candidates = plain_tags(self.store.list_tags()?);
        let query = ModelProfile::load(self.store.as_ref(), tag)?;

        let mut matches = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let score = match &query {
                Some(query) => match ModelProfile::load(self.store.as_ref(), &candidate)? {
                    Some(profile) => self.score(query, &profile),
                    None => 0.0,
                },
                None => 0.0,
            };
            matches.push(SimilarityMatch {
                tag: candidate,
                score: round_percent(score),
            });
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.tag.cmp(&b.tag)));
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        debug!("Ranked {} candidates against {}", matches.len(), tag);
        Ok(matches)
    }

    /// [`Self::find_all_similar`] capped at the configured top-N.
    pub fn top_matches(&self, tag: &str) -> Result<Vec<SimilarityMatch>> {
        self.find_all_similar(tag, Some(SimilarityConfig::DEFAULT_TOP_MATCHES))
    }
}
