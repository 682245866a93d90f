//! Node, relationship and batch types for model graphs.

use crate::error::{BioGraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Node labels produced by the built-in mapping.
pub mod labels {
    pub const MODEL: &str = "Model";
    pub const COMPARTMENT: &str = "Compartment";
    pub const SPECIES: &str = "Species";
    pub const REACTION: &str = "Reaction";
    pub const UNIT_DEFINITION: &str = "UnitDefinition";
}

/// Relationship types produced by the built-in mapping.
pub mod rel_types {
    pub const HAS_COMPARTMENT: &str = "HAS_COMPARTMENT";
    pub const HAS_UNITDEFINITION: &str = "HAS_UNITDEFINITION";
    pub const HAS_SPECIES: &str = "HAS_SPECIES";
    pub const HAS_REACTION: &str = "HAS_REACTION";
    pub const IN_COMPARTMENT: &str = "IN_COMPARTMENT";

    /// Containment relation set walked when counting elements and relationships.
    pub const CONTAINMENT: &[&str] = &[
        HAS_COMPARTMENT,
        HAS_UNITDEFINITION,
        HAS_SPECIES,
        HAS_REACTION,
    ];

    /// One-hop relation set whose targets are compared by content.
    pub const CHILDREN: &[&str] = &[HAS_COMPARTMENT, HAS_SPECIES, HAS_REACTION];
}

/// A typed node owned by one model graph.
///
/// `id` is unique within the batch that created the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").map(String::as_str)
    }

    pub fn metaid(&self) -> Option<&str> {
        self.properties.get("metaid").map(String::as_str)
    }
}

/// A typed, directed edge between two nodes of the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub rel_type: String,
    pub source: String,
    pub target: String,
}

impl Relationship {
    pub fn new(
        rel_type: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            rel_type: rel_type.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// An immediate child of a root Model node, identified by label and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildRef {
    pub label: String,
    pub id: String,
}

impl ChildRef {
    pub fn new(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

/// Nodes and relationships produced by mapping one model description.
///
/// Nodes form an arena keyed by id; relationships refer to nodes by id, so the
/// batch never holds references between nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphBatch {
    pub tag: String,
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl GraphBatch {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            nodes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a node, rejecting a second node with the same id.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains_node(&node.id) {
            return Err(BioGraphError::mapping(
                &self.tag,
                format!("duplicate node id '{}'", node.id),
            ));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that node ids are unique and every relationship endpoint exists.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(BioGraphError::mapping(
                    &self.tag,
                    format!("duplicate node id '{}'", node.id),
                ));
            }
        }

        for rel in &self.relationships {
            for endpoint in [&rel.source, &rel.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(BioGraphError::mapping(
                        &self.tag,
                        format!(
                            "relationship {} references unknown node '{}'",
                            rel.rel_type, endpoint
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> GraphBatch {
        let mut batch = GraphBatch::new("M1");
        batch
            .add_node(Node::new("m", labels::MODEL).with_property("name", "Model One"))
            .unwrap();
        batch
            .add_node(Node::new("cell", labels::COMPARTMENT))
            .unwrap();
        batch.add_relationship(Relationship::new(rel_types::HAS_COMPARTMENT, "m", "cell"));
        batch
    }

    #[test]
    fn test_valid_batch() {
        let batch = sample_batch();
        assert!(batch.validate().is_ok());
        assert_eq!(batch.node_count(), 2);
        assert_eq!(batch.relationship_count(), 1);
        assert_eq!(batch.node("m").and_then(Node::name), Some("Model One"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut batch = sample_batch();
        let err = batch.add_node(Node::new("cell", labels::COMPARTMENT));
        assert!(err.is_err());
    }

    #[test]
    fn test_dangling_relationship_rejected() {
        let mut batch = sample_batch();
        batch.add_relationship(Relationship::new(rel_types::HAS_SPECIES, "m", "missing"));
        let err = batch.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
