//! Main API facade.
//!
//! [`BioGraph`] wires the repository, similarity engine and search index over
//! one shared store handle. Each component is also usable on its own.

mod builder;

pub use builder::BioGraphBuilder;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::repository::{BatchImportReport, ModelRepository};
use crate::search::SearchIndex;
use crate::similarity::{SimilarityEngine, SimilarityMatch};
use crate::store::WriteSummary;
use std::path::Path;
use std::sync::Arc;

/// Repository, similarity engine and search index over one graph store.
#[derive(Clone)]
pub struct BioGraph {
    repository: Arc<ModelRepository>,
    similarity: SimilarityEngine,
    search: SearchIndex,
}

impl BioGraph {
    pub fn builder() -> BioGraphBuilder {
        BioGraphBuilder::new()
    }

    pub fn repository(&self) -> &ModelRepository {
        &self.repository
    }

    pub fn similarity(&self) -> &SimilarityEngine {
        &self.similarity
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    // ========================================
    // Repository
    // ========================================

    pub fn exists(&self, tag: &str) -> Result<bool> {
        self.repository.exists(tag)
    }

    pub fn list_models(&self) -> Result<Vec<String>> {
        self.repository.list_models()
    }

    pub async fn import_model(&self, tag: &str) -> Result<WriteSummary> {
        self.repository.import_model(tag).await
    }

    pub async fn import_description(&self, tag: &str, raw: Vec<u8>) -> Result<WriteSummary> {
        self.repository.import_description(tag, raw).await
    }

    pub async fn import_models(
        &self,
        tags: &[String],
        cancel: &CancellationToken,
    ) -> BatchImportReport {
        self.repository.import_models(tags, cancel).await
    }

    pub async fn sync_missing(&self, cancel: &CancellationToken) -> Result<BatchImportReport> {
        self.repository.sync_missing(cancel).await
    }

    pub async fn delete_model(&self, tag: &str) -> Result<()> {
        self.repository.delete_model(tag).await
    }

    pub async fn merge_models(&self, tag_a: &str, tag_b: &str) -> Result<String> {
        self.repository.merge_models(tag_a, tag_b).await
    }

    pub fn change_schema(&self, path: impl AsRef<Path>) -> Result<()> {
        self.repository.change_schema(path)
    }

    // ========================================
    // Similarity
    // ========================================

    pub fn compare(&self, tag_a: &str, tag_b: &str) -> Result<f64> {
        self.similarity.compare(tag_a, tag_b)
    }

    pub fn find_all_similar(&self, tag: &str, limit: Option<usize>) -> Result<Vec<SimilarityMatch>> {
        self.similarity.find_all_similar(tag, limit)
    }

    // ========================================
    // Search
    // ========================================

    pub fn search_for_compartment(&self, compartment_id: &str) -> Result<Vec<String>> {
        self.search.search_for_compartment(compartment_id)
    }

    pub fn search_for_compound(&self, species_id: &str) -> Result<Vec<String>> {
        self.search.search_for_compound(species_id)
    }

    pub fn search_compound_in_compartment(
        &self,
        species_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<String>> {
        self.search
            .search_compound_in_compartment(species_id, compartment_id)
    }
}
