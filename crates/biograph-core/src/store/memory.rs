//! In-memory graph store.
//!
//! Same semantics as the SQLite store. Used by tests and by callers that only
//! need a throwaway graph.

use super::{check_batches, GraphStore, ModelHit, ModelProfile, ModelStats, WriteSummary};
use crate::error::{BioGraphError, Result};
use crate::graph::{labels, rel_types, ChildRef, GraphBatch, Node};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct StoredNode {
    tag: String,
    node: Node,
}

#[derive(Debug, Clone)]
struct StoredRelationship {
    tag: String,
    rel_type: String,
    source: u64,
    target: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_uid: u64,
    nodes: BTreeMap<u64, StoredNode>,
    relationships: Vec<StoredRelationship>,
}

impl MemoryState {
    fn remove_tag(&mut self, tag: &str) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, n| n.tag != tag);
        self.relationships.retain(|r| r.tag != tag);
        before - self.nodes.len()
    }

    fn roots(&self, tag: &str) -> Vec<u64> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.tag == tag && n.node.label == labels::MODEL)
            .map(|(uid, _)| *uid)
            .collect()
    }

    fn edges<'a>(
        &'a self,
        tag: &'a str,
        types: &'a [&'a str],
    ) -> impl Iterator<Item = &'a StoredRelationship> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.tag == tag && types.contains(&r.rel_type.as_str()))
    }

    fn count_elements(&self, tag: &str) -> u64 {
        let roots = self.roots(tag);

        let mut outgoing: HashMap<u64, Vec<u64>> = HashMap::new();
        for rel in self.edges(tag, rel_types::CONTAINMENT) {
            outgoing.entry(rel.source).or_default().push(rel.target);
        }

        let mut seen: HashSet<u64> = roots.iter().copied().collect();
        let mut queue: VecDeque<u64> = roots.iter().copied().collect();
        while let Some(uid) = queue.pop_front() {
            for &next in outgoing.get(&uid).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        seen.iter().filter(|uid| !roots.contains(uid)).count() as u64
    }

    fn count_relationships(&self, tag: &str) -> u64 {
        let edges: Vec<&StoredRelationship> = self.edges(tag, rel_types::CONTAINMENT).collect();

        let mut neighbours: HashMap<u64, Vec<u64>> = HashMap::new();
        for rel in &edges {
            neighbours.entry(rel.source).or_default().push(rel.target);
            neighbours.entry(rel.target).or_default().push(rel.source);
        }

        let mut component: HashSet<u64> = self.roots(tag).into_iter().collect();
        let mut queue: VecDeque<u64> = component.iter().copied().collect();
        while let Some(uid) = queue.pop_front() {
            for &next in neighbours.get(&uid).into_iter().flatten() {
                if component.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        edges
            .iter()
            .filter(|rel| component.contains(&rel.source))
            .count() as u64
    }

    fn root_children(&self, tag: &str) -> BTreeSet<ChildRef> {
        let roots = self.roots(tag);
        self.edges(tag, rel_types::CHILDREN)
            .filter(|rel| roots.contains(&rel.source))
            .filter_map(|rel| self.nodes.get(&rel.target))
            .map(|n| ChildRef::new(n.node.label.clone(), n.node.id.clone()))
            .collect()
    }

    fn hit(&self, uid: u64) -> Option<ModelHit> {
        self.nodes.get(&uid).map(|n| ModelHit {
            tag: n.tag.clone(),
            name: n.node.name().map(str::to_string),
        })
    }

    fn node_matches(&self, uid: u64, label: &str, id: &str) -> bool {
        self.nodes
            .get(&uid)
            .map(|n| n.node.label == label && n.node.id == id)
            .unwrap_or(false)
    }
}

/// Graph store held entirely in memory behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: RwLock<MemoryState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| BioGraphError::store("Failed to acquire store read lock"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| BioGraphError::store("Failed to acquire store write lock"))
    }
}

impl GraphStore for MemoryGraphStore {
    fn model_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.read()?.nodes.values().any(|n| n.tag == tag))
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let tags: BTreeSet<&str> = state.nodes.values().map(|n| n.tag.as_str()).collect();
        Ok(tags.into_iter().map(str::to_string).collect())
    }

    fn replace_model(&self, tag: &str, batches: &[GraphBatch]) -> Result<WriteSummary> {
        // Everything is validated before the state is touched, so a failed
        // write leaves the previous model in place.
        check_batches(tag, batches)?;

        let mut state = self.write()?;
        let removed = state.remove_tag(tag);

        let mut nodes_written = 0;
        let mut relationships_written = 0;
        for batch in batches {
            let mut uids = HashMap::with_capacity(batch.nodes.len());
            for node in &batch.nodes {
                state.next_uid += 1;
                let uid = state.next_uid;
                uids.insert(node.id.as_str(), uid);
                state.nodes.insert(
                    uid,
                    StoredNode {
                        tag: tag.to_string(),
                        node: node.clone(),
                    },
                );
            }
            nodes_written += uids.len();

            for rel in &batch.relationships {
                if let (Some(&source), Some(&target)) =
                    (uids.get(rel.source.as_str()), uids.get(rel.target.as_str()))
                {
                    state.relationships.push(StoredRelationship {
                        tag: tag.to_string(),
                        rel_type: rel.rel_type.clone(),
                        source,
                        target,
                    });
                    relationships_written += 1;
                }
            }
        }

        Ok(WriteSummary {
            tag: tag.to_string(),
            replaced: removed > 0,
            nodes_written,
            relationships_written,
        })
    }

    fn delete_model(&self, tag: &str) -> Result<usize> {
        Ok(self.write()?.remove_tag(tag))
    }

    fn model_stats(&self, tag: &str) -> Result<ModelStats> {
        let state = self.read()?;
        Ok(ModelStats {
            nodes: state.nodes.values().filter(|n| n.tag == tag).count(),
            relationships: state.relationships.iter().filter(|r| r.tag == tag).count(),
        })
    }

    fn has_root_model(&self, tag: &str) -> Result<bool> {
        Ok(!self.read()?.roots(tag).is_empty())
    }

    fn count_elements(&self, tag: &str) -> Result<u64> {
        Ok(self.read()?.count_elements(tag))
    }

    fn count_relationships(&self, tag: &str) -> Result<u64> {
        Ok(self.read()?.count_relationships(tag))
    }

    fn root_children(&self, tag: &str) -> Result<Vec<ChildRef>> {
        Ok(self.read()?.root_children(tag).into_iter().collect())
    }

    fn model_profile(&self, tag: &str) -> Result<Option<ModelProfile>> {
        let state = self.read()?;
        if state.roots(tag).is_empty() {
            return Ok(None);
        }
        Ok(Some(ModelProfile {
            elements: state.count_elements(tag),
            relationships: state.count_relationships(tag),
            children: state.root_children(tag),
        }))
    }

    fn models_with_child(
        &self,
        rel_type: &str,
        label: &str,
        child_id: &str,
    ) -> Result<Vec<ModelHit>> {
        let state = self.read()?;

        let hits: BTreeSet<ModelHit> = state
            .relationships
            .iter()
            .filter(|rel| rel.rel_type == rel_type)
            .filter(|rel| state.node_matches(rel.target, label, child_id))
            .filter(|rel| {
                state
                    .nodes
                    .get(&rel.source)
                    .map(|n| n.node.label == labels::MODEL)
                    .unwrap_or(false)
            })
            .filter_map(|rel| state.hit(rel.source))
            .collect();

        Ok(hits.into_iter().collect())
    }

    fn models_with_species_in_compartment(
        &self,
        species_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<ModelHit>> {
        let state = self.read()?;

        let located: HashSet<u64> = state
            .relationships
            .iter()
            .filter(|rel| rel.rel_type == rel_types::IN_COMPARTMENT)
            .filter(|rel| state.node_matches(rel.source, labels::SPECIES, species_id))
            .filter(|rel| state.node_matches(rel.target, labels::COMPARTMENT, compartment_id))
            .map(|rel| rel.source)
            .collect();

        let hits: BTreeSet<ModelHit> = state
            .relationships
            .iter()
            .filter(|rel| rel.rel_type == rel_types::HAS_SPECIES && located.contains(&rel.target))
            .filter(|rel| {
                state
                    .nodes
                    .get(&rel.source)
                    .map(|n| n.node.label == labels::MODEL)
                    .unwrap_or(false)
            })
            .filter_map(|rel| state.hit(rel.source))
            .collect();

        Ok(hits.into_iter().collect())
    }
}
