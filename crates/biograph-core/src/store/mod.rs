//! Graph store adapter.
//!
//! The repository, similarity engine and search index only talk to the store
//! through [`GraphStore`]. Two implementations are provided:
//! - [`SqliteGraphStore`]: persistent store on SQLite (WAL mode)
//! - [`MemoryGraphStore`]: in-memory store with the same semantics
//!
//! All operations are synchronous to match rusqlite's API.

mod memory;
mod sqlite;

pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;

use crate::error::Result;
use crate::graph::{ChildRef, GraphBatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of writing a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    pub tag: String,
    /// Whether an earlier version under the same tag was removed.
    pub replaced: bool,
    pub nodes_written: usize,
    pub relationships_written: usize,
}

/// Node and relationship totals owned by one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub nodes: usize,
    pub relationships: usize,
}

/// A root Model node matched by a search predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelHit {
    pub tag: String,
    pub name: Option<String>,
}

/// Counts and children of one stored model, read from a single snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelProfile {
    pub elements: u64,
    pub relationships: u64,
    pub children: BTreeSet<ChildRef>,
}

impl ModelProfile {
    /// Load the profile of `tag`, or `None` when it has no root Model node.
    pub fn load(store: &dyn GraphStore, tag: &str) -> Result<Option<Self>> {
        store.model_profile(tag)
    }
}

/// Narrow read/write interface over a backing graph database.
pub trait GraphStore: Send + Sync {
    /// True iff at least one node is tagged with `tag`.
    fn model_exists(&self, tag: &str) -> Result<bool>;

    /// Every distinct tag in the store, sorted.
    fn list_tags(&self) -> Result<Vec<String>>;

    /// Remove everything `tag` owns and write `batches` in its place.
    ///
    /// Must be atomic: on error the previous model is untouched, and no reader
    /// observes a state between the delete and the insert.
    fn replace_model(&self, tag: &str, batches: &[GraphBatch]) -> Result<WriteSummary>;

    /// Remove every node and relationship owned by `tag`. Returns the number
    /// of nodes removed; zero when the tag is unknown.
    fn delete_model(&self, tag: &str) -> Result<usize>;

    /// Node and relationship totals for `tag`.
    fn model_stats(&self, tag: &str) -> Result<ModelStats>;

    /// True iff `tag` owns at least one root Model node.
    fn has_root_model(&self, tag: &str) -> Result<bool>;

    /// Distinct nodes reachable from the root Model node(s) over outgoing
    /// containment edges, roots excluded.
    fn count_elements(&self, tag: &str) -> Result<u64>;

    /// Distinct containment edges connected to the root Model node(s),
    /// following edges in either direction.
    fn count_relationships(&self, tag: &str) -> Result<u64>;

    /// Distinct (label, id) targets one hop from the root Model node(s) over
    /// the child relation set.
    fn root_children(&self, tag: &str) -> Result<Vec<ChildRef>>;

    /// Root presence, element and relationship counts and root children of
    /// `tag`, all read from one consistent view of the store.
    ///
    /// `None` when `tag` has no root Model node. A concurrent
    /// [`GraphStore::replace_model`] is seen entirely or not at all.
    fn model_profile(&self, tag: &str) -> Result<Option<ModelProfile>>;

    /// Model nodes with a direct `rel_type` edge to a `label` node whose id is
    /// `child_id`.
    fn models_with_child(&self, rel_type: &str, label: &str, child_id: &str)
        -> Result<Vec<ModelHit>>;

    /// Model nodes with a species `species_id` that sits in compartment
    /// `compartment_id`.
    fn models_with_species_in_compartment(
        &self,
        species_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<ModelHit>>;
}

/// Validate every batch and check that it belongs to `tag`.
pub(crate) fn check_batches(tag: &str, batches: &[GraphBatch]) -> Result<()> {
    for batch in batches {
        if batch.tag != tag {
            return Err(crate::error::BioGraphError::validation(
                "batch",
                format!("batch for '{}' cannot be written under '{}'", batch.tag, tag),
            ));
        }
        batch.validate()?;
    }
    Ok(())
}
