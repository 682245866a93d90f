//! Centralized configuration for BioGraph.
//!
//! Constant groups live on unit structs; values that callers may tune at
//! runtime (similarity weights) are plain validated types.

use crate::error::{BioGraphError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Similarity scoring configuration.
pub struct SimilarityConfig;

impl SimilarityConfig {
    pub const STRUCTURE_WEIGHT: f64 = 0.5;
    pub const CHILDREN_WEIGHT: f64 = 0.5;
    /// Number of top matches returned when a caller asks for "the best few".
    pub const DEFAULT_TOP_MATCHES: usize = 10;
    /// Allowed drift when checking that weights sum to one.
    pub const WEIGHT_TOLERANCE: f64 = 1e-9;
}

/// Model repository configuration.
pub struct RepositoryConfig;

impl RepositoryConfig {
    /// Separator joining the two source tags of a merged model.
    pub const MERGE_SEPARATOR: &'static str = "-";
    /// Concurrent imports during a batch import.
    pub const DEFAULT_IMPORT_WORKERS: usize = 10;
    /// Extension of raw model description files.
    pub const MODEL_FILE_EXTENSION: &'static str = "xml";
}

/// Mapping schema configuration.
pub struct SchemaConfig;

impl SchemaConfig {
    /// Required extension for mapping schema files.
    pub const SCHEMA_EXTENSION: &'static str = "json";
    pub const DEFAULT_SCHEMA_NAME: &'static str = "default_schema";
}

/// Graph store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DB_FILENAME: &'static str = "biograph.db";
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Returns true if `tag` names a merged model.
pub fn is_merged_tag(tag: &str) -> bool {
    tag.contains(RepositoryConfig::MERGE_SEPARATOR)
}

/// Build the tag of the model merged from `tag_a` and `tag_b`.
pub fn merged_tag(tag_a: &str, tag_b: &str) -> String {
    format!("{}{}{}", tag_a, RepositoryConfig::MERGE_SEPARATOR, tag_b)
}

/// Weights of the two similarity components.
///
/// Only constructed through [`SimilarityWeights::new`] (or `Default`), so a
/// held value is always non-negative and sums to 1. Deserialization runs the
/// same checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights")]
pub struct SimilarityWeights {
    structure: f64,
    children: f64,
}

#[derive(Deserialize)]
struct RawWeights {
    structure: f64,
    children: f64,
}

impl TryFrom<RawWeights> for SimilarityWeights {
    type Error = BioGraphError;

    fn try_from(raw: RawWeights) -> Result<Self> {
        Self::new(raw.structure, raw.children)
    }
}

impl SimilarityWeights {
    /// Create weights, rejecting negative values or a sum other than 1.
    pub fn new(structure: f64, children: f64) -> Result<Self> {
        if !structure.is_finite() || !children.is_finite() || structure < 0.0 || children < 0.0 {
            return Err(BioGraphError::validation(
                "weights",
                format!(
                    "weights must be finite and non-negative (structure={}, children={})",
                    structure, children
                ),
            ));
        }

        let sum = structure + children;
        if (sum - 1.0).abs() > SimilarityConfig::WEIGHT_TOLERANCE {
            return Err(BioGraphError::validation(
                "weights",
                format!("weights must sum to 1, got {}", sum),
            ));
        }

        Ok(Self {
            structure,
            children,
        })
    }

    pub fn structure(&self) -> f64 {
        self.structure
    }

    pub fn children(&self) -> f64 {
        self.children
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            structure: SimilarityConfig::STRUCTURE_WEIGHT,
            children: SimilarityConfig::CHILDREN_WEIGHT,
        }
    }
}
