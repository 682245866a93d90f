//! Model repository: lifecycle of stored model graphs.
//!
//! Every write goes through [`GraphStore::replace_model`], which swaps a tag's
//! contents in one transaction. Writes to the same tag are additionally
//! serialized by a per-tag async lock so two imports of one tag never
//! interleave their fetch, mapping and write steps.

mod locks;

use crate::cancel::CancellationToken;
use crate::config::{is_merged_tag, merged_tag, RepositoryConfig};
use crate::error::{BioGraphError, Result};
use crate::graph::GraphBatch;
use crate::mapping::{ActiveSchema, MappingSchema, ModelMapper};
use crate::source::ModelSource;
use crate::store::{GraphStore, WriteSummary};
use futures::stream::{self, StreamExt};
use locks::TagLocks;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A tag that could not be imported during a batch import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub tag: String,
    pub error: String,
}

/// Outcome of [`ModelRepository::import_models`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchImportReport {
    /// Tags written for the first time.
    pub imported: Vec<String>,
    /// Tags whose previous version was replaced.
    pub replaced: Vec<String>,
    pub failed: Vec<ImportFailure>,
    /// Tags skipped because cancellation was requested.
    pub cancelled: Vec<String>,
}

impl BatchImportReport {
    /// Number of tags written, new or replaced.
    pub fn written(&self) -> usize {
        self.imported.len() + self.replaced.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    fn sort(&mut self) {
        self.imported.sort();
        self.replaced.sort();
        self.failed.sort_by(|a, b| a.tag.cmp(&b.tag));
        self.cancelled.sort();
    }
}

/// Owns model lifecycle on top of a graph store.
pub struct ModelRepository {
    store: Arc<dyn GraphStore>,
    source: Arc<dyn ModelSource>,
    mapper: Arc<dyn ModelMapper>,
    schema: ActiveSchema,
    locks: TagLocks,
    workers: usize,
}

impl ModelRepository {
    /// Create a repository over explicit collaborators.
    ///
    /// # Arguments
    ///
    /// * `store` - Graph store shared with the similarity engine and search index
    /// * `source` - Where raw descriptions are fetched from
    /// * `mapper` - Converts raw descriptions into graph batches
    /// * `schema` - Initially active mapping schema
    pub fn new(
        store: Arc<dyn GraphStore>,
        source: Arc<dyn ModelSource>,
        mapper: Arc<dyn ModelMapper>,
        schema: ActiveSchema,
    ) -> Self {
        Self {
            store,
            source,
            mapper,
            schema,
            locks: TagLocks::new(),
            workers: RepositoryConfig::DEFAULT_IMPORT_WORKERS,
        }
    }

    /// Set the number of concurrent imports used by batch imports.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn active_schema(&self) -> &ActiveSchema {
        &self.schema
    }

    // ========================================
    // Queries
    // ========================================

    /// True iff at least one node is stored under `tag`.
    pub fn exists(&self, tag: &str) -> Result<bool> {
        self.store.model_exists(tag)
    }

    /// Every stored tag, merged tags included, sorted.
    pub fn list_models(&self) -> Result<Vec<String>> {
        self.store.list_tags()
    }

    pub fn model_count(&self) -> Result<usize> {
        Ok(self.list_models()?.len())
    }

    // ========================================
    // Import
    // ========================================

    /// Fetch `tag` from the model source and import it.
    pub async fn import_model(&self, tag: &str) -> Result<WriteSummary> {
        self.import_model_with_cancel(tag, &CancellationToken::new())
            .await
    }

    /// [`Self::import_model`] honouring a cancellation token.
    pub async fn import_model_with_cancel(
        &self,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        check_tag(tag)?;
        let _guard = self.locks.lock(tag).await?;

        let raw = self.fetch(tag).await?;
        self.write_descriptions(tag, vec![raw], cancel).await
    }

    /// Import caller-supplied description bytes under `tag`.
    ///
    /// An existing model under `tag` is replaced.
    pub async fn import_description(&self, tag: &str, raw: Vec<u8>) -> Result<WriteSummary> {
        self.import_description_with_cancel(tag, raw, &CancellationToken::new())
            .await
    }

    /// [`Self::import_description`] honouring a cancellation token.
    pub async fn import_description_with_cancel(
        &self,
        tag: &str,
        raw: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        check_tag(tag)?;
        let _guard = self.locks.lock(tag).await?;
        self.write_descriptions(tag, vec![raw], cancel).await
    }

    /// Import many tags with bounded parallelism.
    ///
    /// Duplicate tags are imported once. Failures are collected per tag; the
    /// batch never stops early except on cancellation, which leaves every tag
    /// not yet written untouched.
    pub async fn import_models(
        &self,
        tags: &[String],
        cancel: &CancellationToken,
    ) -> BatchImportReport {
        let unique: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
        info!(
            "Importing {} models with {} workers",
            unique.len(),
            self.workers
        );

        let outcomes: Vec<(String, Result<WriteSummary>)> = stream::iter(unique)
            .map(|tag| async move {
                let result = self.import_model_with_cancel(tag, cancel).await;
                (tag.to_string(), result)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = BatchImportReport::default();
        for (tag, outcome) in outcomes {
            match outcome {
                Ok(summary) if summary.replaced => report.replaced.push(tag),
                Ok(_) => report.imported.push(tag),
                Err(BioGraphError::Cancelled) => report.cancelled.push(tag),
                Err(e) => {
                    warn!("Failed to import {}: {}", tag, e);
                    report.failed.push(ImportFailure {
                        tag,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.sort();

        info!(
            "Batch import finished: {} imported, {} replaced, {} failed, {} cancelled",
            report.imported.len(),
            report.replaced.len(),
            report.failed.len(),
            report.cancelled.len()
        );
        report
    }

    /// Import every tag the model source offers that the store lacks.
    pub async fn sync_missing(&self, cancel: &CancellationToken) -> Result<BatchImportReport> {
        let stored: BTreeSet<String> = self.list_models()?.into_iter().collect();
        let missing: Vec<String> = self
            .source
            .available()?
            .into_iter()
            .filter(|tag| !stored.contains(tag))
            .collect();

        if missing.is_empty() {
            info!("All available models are already stored");
            return Ok(BatchImportReport::default());
        }

        info!("{} models missing from the store", missing.len());
        Ok(self.import_models(&missing, cancel).await)
    }

    // ========================================
    // Delete and merge
    // ========================================

    /// Remove every node and relationship owned by `tag`.
    ///
    /// Unknown tags are a no-op.
    pub async fn delete_model(&self, tag: &str) -> Result<()> {
        let _guard = self.locks.lock(tag).await?;

        let removed = self.store.delete_model(tag)?;
        if removed > 0 {
            info!("Deleted model {} ({} nodes)", tag, removed);
        } else {
            debug!("Delete of {} skipped: no such model", tag);
        }
        Ok(())
    }

    /// Merge two stored models into a new model tagged `<a>-<b>`.
    ///
    /// Both source descriptions are mapped again under the merged tag and
    /// written together, so the result is the disjoint union of the two graphs.
    /// Source models are left untouched. Operands must be plain tags, since
    /// `A`+`B-C` and `A-B`+`C` would both land on `A-B-C`.
    pub async fn merge_models(&self, tag_a: &str, tag_b: &str) -> Result<String> {
        self.merge_models_with_cancel(tag_a, tag_b, &CancellationToken::new())
            .await
    }

    /// [`Self::merge_models`] honouring a cancellation token.
    pub async fn merge_models_with_cancel(
        &self,
        tag_a: &str,
        tag_b: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        for tag in [tag_a, tag_b] {
            check_tag(tag)?;
            if is_merged_tag(tag) {
                return Err(BioGraphError::validation(
                    "tag",
                    format!("cannot merge '{}': it is already a merged model", tag),
                ));
            }
        }
        let merged = merged_tag(tag_a, tag_b);

        let _guards = self
            .locks
            .lock_all([tag_a, tag_b, merged.as_str()])
            .await?;

        for tag in [tag_a, tag_b] {
            if !self.exists(tag)? {
                return Err(BioGraphError::ModelNotFound {
                    tag: tag.to_string(),
                });
            }
        }

        let raw_a = self.fetch(tag_a).await?;
        let raw_b = self.fetch(tag_b).await?;

        if self.exists(&merged)? {
            info!("Replacing existing merged model {}", merged);
        }

        self.write_descriptions(&merged, vec![raw_a, raw_b], cancel)
            .await?;
        info!("Merged {} and {} into {}", tag_a, tag_b, merged);
        Ok(merged)
    }

    // ========================================
    // Schema
    // ========================================

    /// Make the mapping file at `path` the active schema.
    ///
    /// Fails with a validation error when the extension is wrong or the file
    /// is missing; the previous schema then stays active. Stored models are
    /// not re-mapped.
    pub fn change_schema(&self, path: impl AsRef<Path>) -> Result<()> {
        self.schema.change_schema(path)
    }

    // ========================================
    // Internal Methods
    // ========================================

    async fn fetch(&self, tag: &str) -> Result<Vec<u8>> {
        let source = Arc::clone(&self.source);
        let owned = tag.to_string();
        tokio::task::spawn_blocking(move || source.fetch(&owned))
            .await
            .map_err(|e| BioGraphError::Other(format!("Fetch task failed: {}", e)))?
    }

    /// Map every description under `tag` and replace the stored model.
    ///
    /// Caller holds the tag lock.
    async fn write_descriptions(
        &self,
        tag: &str,
        descriptions: Vec<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        cancel.check()?;

        let schema = self.schema.current()?;
        let batches = self.map_all(tag, descriptions, schema).await?;

        // Last point where cancellation is honoured; the write below is atomic.
        cancel.check()?;

        if self.exists(tag)? {
            info!("Model {} already stored, replacing with new version", tag);
        }

        let summary = self.store.replace_model(tag, &batches)?;
        debug!(
            "Stored {}: {} nodes, {} relationships",
            tag, summary.nodes_written, summary.relationships_written
        );
        Ok(summary)
    }

    async fn map_all(
        &self,
        tag: &str,
        descriptions: Vec<Vec<u8>>,
        schema: Arc<MappingSchema>,
    ) -> Result<Vec<GraphBatch>> {
        let mapper = Arc::clone(&self.mapper);
        let owned = tag.to_string();

        tokio::task::spawn_blocking(move || {
            descriptions
                .iter()
                .map(|raw| mapper.map_description(raw, &schema, &owned))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| BioGraphError::Other(format!("Mapping task failed: {}", e)))?
    }
}

fn check_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(BioGraphError::validation("tag", "tag must not be empty"));
    }
    Ok(())
}

/// Plain (non-merged) tags among `tags`.
pub(crate) fn plain_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().filter(|t| !is_merged_tag(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SbmlMapper;
    use crate::source::MemorySource;
    use crate::store::MemoryGraphStore;

    const MODEL: &str = r#"<sbml><model id="m" name="Tiny">
        <listOfCompartments><compartment id="cell"/></listOfCompartments>
        <listOfSpecies><species id="glc" compartment="cell"/></listOfSpecies>
    </model></sbml>"#;

    fn repository() -> (ModelRepository, Arc<MemorySource>, Arc<MemoryGraphStore>) {
        let store = Arc::new(MemoryGraphStore::new());
        let source = Arc::new(MemorySource::new());
        let repo = ModelRepository::new(
            store.clone(),
            source.clone(),
            Arc::new(SbmlMapper::new()),
            ActiveSchema::default(),
        );
        (repo, source, store)
    }

    #[tokio::test]
    async fn test_import_model_from_source() {
        let (repo, source, _) = repository();
        source.insert("M1", MODEL);

        let summary = repo.import_model("M1").await.unwrap();
        assert!(!summary.replaced);
        assert_eq!(summary.nodes_written, 3);
        assert!(repo.exists("M1").unwrap());
    }

    #[tokio::test]
    async fn test_import_missing_source_is_not_found() {
        let (repo, _, _) = repository();
        let err = repo.import_model("M9").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!repo.exists("M9").unwrap());
    }

    #[tokio::test]
    async fn test_reimport_replaces() {
        let (repo, _, store) = repository();
        repo.import_description("M1", MODEL.into()).await.unwrap();
        let second = repo.import_description("M1", MODEL.into()).await.unwrap();

        assert!(second.replaced);
        assert_eq!(store.model_stats("M1").unwrap().nodes, 3);
        assert_eq!(repo.list_models().unwrap(), vec!["M1"]);
    }

    #[tokio::test]
    async fn test_mapping_failure_keeps_previous_version() {
        let (repo, _, store) = repository();
        repo.import_description("M1", MODEL.into()).await.unwrap();

        let err = repo
            .import_description("M1", b"<sbml><model id=\"m\">".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BioGraphError::Mapping { .. }));
        assert_eq!(store.model_stats("M1").unwrap().nodes, 3);
    }

    #[tokio::test]
    async fn test_cancelled_import_writes_nothing() {
        let (repo, _, _) = repository();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = repo
            .import_description_with_cancel("M1", MODEL.into(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BioGraphError::Cancelled));
        assert!(!repo.exists("M1").unwrap());
    }

    #[tokio::test]
    async fn test_empty_tag_rejected() {
        let (repo, _, _) = repository();
        let err = repo.import_description(" ", MODEL.into()).await.unwrap_err();
        assert!(matches!(err, BioGraphError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_noop() {
        let (repo, _, _) = repository();
        repo.delete_model("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_import_report() {
        let (repo, source, _) = repository();
        source.insert("M1", MODEL);
        source.insert("M2", MODEL);
        source.insert("BAD", "<sbml/>");
        repo.import_description("M2", MODEL.into()).await.unwrap();

        let tags: Vec<String> = ["M1", "M2", "M1", "BAD", "NONE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = repo.import_models(&tags, &CancellationToken::new()).await;

        assert_eq!(report.imported, vec!["M1"]);
        assert_eq!(report.replaced, vec!["M2"]);
        let failed: Vec<&str> = report.failed.iter().map(|f| f.tag.as_str()).collect();
        assert_eq!(failed, vec!["BAD", "NONE"]);
        assert_eq!(report.written(), 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_sync_missing_imports_only_new_tags() {
        let (repo, source, _) = repository();
        source.insert("M1", MODEL);
        source.insert("M2", MODEL);
        repo.import_model("M1").await.unwrap();

        let report = repo.sync_missing(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.imported, vec!["M2"]);
        assert!(report.replaced.is_empty());

        let again = repo.sync_missing(&CancellationToken::new()).await.unwrap();
        assert_eq!(again.written(), 0);
    }

    #[tokio::test]
    async fn test_merge_requires_both_models() {
        let (repo, source, _) = repository();
        source.insert("M1", MODEL);
        source.insert("Mx", MODEL);
        repo.import_model("M1").await.unwrap();

        let err = repo.merge_models("M1", "Mx").await.unwrap_err();
        assert!(matches!(err, BioGraphError::ModelNotFound { ref tag } if tag == "Mx"));
        assert!(!repo.exists("M1-Mx").unwrap());
    }

    #[tokio::test]
    async fn test_merge_is_disjoint_union() {
        let (repo, source, store) = repository();
        source.insert("M1", MODEL);
        source.insert("M2", MODEL);
        repo.import_model("M1").await.unwrap();
        repo.import_model("M2").await.unwrap();

        let merged = repo.merge_models("M1", "M2").await.unwrap();
        assert_eq!(merged, "M1-M2");
        assert_eq!(store.model_stats("M1-M2").unwrap().nodes, 6);
        assert_eq!(store.model_stats("M1").unwrap().nodes, 3);

        // Merging again replaces rather than appends.
        repo.merge_models("M1", "M2").await.unwrap();
        assert_eq!(store.model_stats("M1-M2").unwrap().nodes, 6);
    }

    #[tokio::test]
    async fn test_merge_rejects_merged_operands() {
        let (repo, source, store) = repository();
        for tag in ["A", "B", "C"] {
            source.insert(tag, MODEL);
            repo.import_model(tag).await.unwrap();
        }
        repo.merge_models("B", "C").await.unwrap();
        repo.merge_models("A", "B").await.unwrap();

        for (a, b) in [("A", "B-C"), ("A-B", "C")] {
            let err = repo.merge_models(a, b).await.unwrap_err();
            assert!(matches!(err, BioGraphError::Validation { .. }));
        }
        assert!(!repo.exists("A-B-C").unwrap());
        assert_eq!(store.model_stats("B-C").unwrap().nodes, 6);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_writes() {
        let (repo, source, _) = repository();
        source.insert("M1", MODEL);
        source.insert("M2", MODEL);

        repo.import_model("M1").await.unwrap();
        repo.import_model("M2").await.unwrap();
        repo.merge_models("M1", "M2").await.unwrap();
        repo.delete_model("M1-M2").await.unwrap();
        repo.delete_model("ghost").await.unwrap();
        assert!(repo.merge_models("M1", "ghost").await.is_err());

        assert_eq!(repo.locks.len(), 0);
    }

    #[test]
    fn test_plain_tags() {
        let tags = vec!["M1".to_string(), "M1-M2".to_string(), "M2".to_string()];
        assert_eq!(plain_tags(tags), vec!["M1", "M2"]);
    }
}
