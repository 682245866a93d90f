//! BioGraph Core - versioned storage, similarity ranking and attribute search
//! for biological model graphs.
//!
//! Raw model descriptions (SBML) are mapped into typed nodes and relationships
//! and stored one graph per tag. On top of the store sit three components:
//!
//! - [`ModelRepository`]: import, replace, delete, merge and list models
//! - [`SimilarityEngine`]: pairwise scores and nearest-neighbour ranking
//! - [`SearchIndex`]: "which models contain compartment X / species Y"
//!
//! # Example
//!
//! ```rust,no_run
//! use biograph_core::BioGraph;
//!
//! #[tokio::main]
//! async fn main() -> biograph_core::Result<()> {
//!     let graph = BioGraph::builder()
//!         .store_path("./biograph.db")
//!         .models_dir("./models")
//!         .build()?;
//!
//!     graph.import_model("BIOMD0000000001").await?;
//!     for hit in graph.find_all_similar("BIOMD0000000001", Some(10))? {
//!         println!("{}: {:.2}%", hit.tag, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod repository;
pub mod search;
pub mod similarity;
pub mod source;
pub mod store;

mod api;

// Re-export commonly used types
pub use api::{BioGraph, BioGraphBuilder};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{SimilarityWeights, StoreConfig};
pub use error::{BioGraphError, ErrorKind, Result};
pub use graph::{ChildRef, GraphBatch, Node, Relationship};
pub use mapping::{ActiveSchema, MappingSchema, ModelMapper, SbmlMapper};
pub use repository::{BatchImportReport, ImportFailure, ModelRepository};
pub use search::SearchIndex;
pub use similarity::{SimilarityEngine, SimilarityMatch};
pub use source::{DirectorySource, MemorySource, ModelSource};
pub use store::{
    GraphStore, MemoryGraphStore, ModelHit, ModelProfile, ModelStats, SqliteGraphStore,
    WriteSummary,
};
