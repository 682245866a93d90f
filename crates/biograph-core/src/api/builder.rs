//! Builder for configuring BioGraph initialization.

use std::path::PathBuf;
use std::sync::Arc;

use super::BioGraph;
use crate::config::{RepositoryConfig, SimilarityWeights, StoreConfig};
use crate::error::{BioGraphError, Result};
use crate::mapping::{ActiveSchema, ModelMapper, SbmlMapper};
use crate::repository::ModelRepository;
use crate::search::SearchIndex;
use crate::similarity::SimilarityEngine;
use crate::source::{DirectorySource, MemorySource, ModelSource};
use crate::store::{GraphStore, MemoryGraphStore, SqliteGraphStore};
use tracing::info;

enum StoreChoice {
    Sqlite(PathBuf),
    InMemory,
    Custom(Arc<dyn GraphStore>),
}

/// Builder for configuring BioGraph initialization.
///
/// # Example
///
/// ```rust,no_run
/// use biograph_core::BioGraph;
///
/// # fn main() -> biograph_core::Result<()> {
/// let graph = BioGraph::builder()
///     .store_path("./data/biograph.db")
///     .models_dir("./data/models")
///     .import_workers(4)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct BioGraphBuilder {
    store: StoreChoice,
    source: Option<Arc<dyn ModelSource>>,
    models_dir: Option<PathBuf>,
    mapper: Option<Arc<dyn ModelMapper>>,
    schema_path: Option<PathBuf>,
    weights: SimilarityWeights,
    workers: usize,
    auto_create_dirs: bool,
}

impl Default for BioGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BioGraphBuilder {
    /// Start with an in-memory store, no model source and the built-in schema.
    pub fn new() -> Self {
        Self {
            store: StoreChoice::InMemory,
            source: None,
            models_dir: None,
            mapper: None,
            schema_path: None,
            weights: SimilarityWeights::default(),
            workers: RepositoryConfig::DEFAULT_IMPORT_WORKERS,
            auto_create_dirs: false,
        }
    }

    /// Persist the graph in the SQLite database at `path`.
    ///
    /// A directory path gets the default database filename appended.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = if path.is_dir() {
            path.join(StoreConfig::DB_FILENAME)
        } else {
            path
        };
        self.store = StoreChoice::Sqlite(path);
        self
    }

    /// Keep the graph in memory only.
    pub fn in_memory(mut self) -> Self {
        self.store = StoreChoice::InMemory;
        self
    }

    /// Use an already constructed store.
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = StoreChoice::Custom(store);
        self
    }

    /// Read raw descriptions from a folder of `<tag>.xml` files.
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self.source = None;
        self
    }

    /// Read raw descriptions from a custom source.
    pub fn with_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.source = Some(source);
        self.models_dir = None;
        self
    }

    /// Replace the SBML mapper.
    pub fn with_mapper(mut self, mapper: Arc<dyn ModelMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Load the initial mapping schema from a JSON file.
    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn weights(mut self, weights: SimilarityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Concurrent imports during batch imports.
    ///
    /// Default: 10
    pub fn import_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Create the models folder if it doesn't exist.
    ///
    /// Default: `false`
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Build the BioGraph instance.
    pub fn build(self) -> Result<BioGraph> {
        if self.workers == 0 {
            return Err(BioGraphError::validation(
                "import_workers",
                "at least one worker is required",
            ));
        }

        let store: Arc<dyn GraphStore> = match self.store {
            StoreChoice::Sqlite(path) => Arc::new(SqliteGraphStore::open(path)?),
            StoreChoice::InMemory => Arc::new(MemoryGraphStore::new()),
            StoreChoice::Custom(store) => store,
        };

        let source: Arc<dyn ModelSource> = match (self.source, self.models_dir) {
            (Some(source), _) => source,
            (None, Some(dir)) => {
                if self.auto_create_dirs && !dir.exists() {
                    std::fs::create_dir_all(&dir).map_err(|e| BioGraphError::Io {
                        message: format!("Failed to create models directory: {}", dir.display()),
                        path: Some(dir.clone()),
                        source: Some(e),
                    })?;
                }
                Arc::new(DirectorySource::new(dir))
            }
            (None, None) => Arc::new(MemorySource::new()),
        };

        let schema = match &self.schema_path {
            Some(path) => ActiveSchema::from_file(path)?,
            None => ActiveSchema::default(),
        };

        let mapper: Arc<dyn ModelMapper> = match self.mapper {
            Some(mapper) => mapper,
            None => Arc::new(SbmlMapper::new()),
        };

        let repository = ModelRepository::new(Arc::clone(&store), source, mapper, schema)
            .with_workers(self.workers);
        let similarity = SimilarityEngine::with_weights(Arc::clone(&store), self.weights);
        let search = SearchIndex::new(Arc::clone(&store));

        info!(
            "BioGraph ready ({} import workers, schema {})",
            repository.workers(),
            self.schema_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );

        Ok(BioGraph {
            repository: Arc::new(repository),
            similarity,
            search,
        })
    }
}
