//! Mapping provider: raw model descriptions to graph batches.
//!
//! ```text
//! raw bytes ──► ModelMapper (SbmlMapper) ──► GraphBatch
//!                     ▲
//!              ActiveSchema (MappingSchema, swappable)
//! ```

mod sbml;
mod schema;

pub use sbml::SbmlMapper;
pub use schema::{
    check_schema_path, ActiveSchema, MappingSchema, NodeRule, RelationshipRule,
    RelationshipSource,
};

use crate::error::Result;
use crate::graph::GraphBatch;

/// Converts a raw description into nodes and relationships owned by `tag`.
pub trait ModelMapper: Send + Sync {
    /// Map `raw` under `schema`.
    ///
    /// Fails with [`crate::BioGraphError::Mapping`] when the description is
    /// malformed or inconsistent with the schema.
    fn map_description(&self, raw: &[u8], schema: &MappingSchema, tag: &str) -> Result<GraphBatch>;
}
