//! Mapping schema: which description elements become which nodes and edges.
//!
//! Schemas are JSON files. A schema lists node rules (element name to label)
//! and relationship rules (label to label, either by nesting or by an attribute
//! that names the target's id).

use crate::config::SchemaConfig;
use crate::error::{BioGraphError, Result};
use crate::graph::{labels, rel_types};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Maps one description element to a node label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRule {
    pub label: String,
    /// Local element name in the description (e.g. `compartment`).
    pub element: String,
    /// Attributes copied onto the node as properties.
    #[serde(default)]
    pub properties: Vec<String>,
}

/// How the endpoints of a relationship are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipSource {
    /// The target element is nested (at any depth) inside the source element.
    Containment,
    /// An attribute of the source element holds the target's id.
    Reference { attribute: String },
}

/// Produces relationships of one type between two labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub from: String,
    pub to: String,
    pub via: RelationshipSource,
}

/// A complete mapping definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSchema {
    pub name: String,
    pub nodes: Vec<NodeRule>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRule>,
}

impl MappingSchema {
    /// The built-in SBML mapping.
    pub fn sbml_default() -> Self {
        let common = |extra: &[&str]| -> Vec<String> {
            ["id", "name", "metaid"]
                .iter()
                .chain(extra.iter())
                .map(|s| s.to_string())
                .collect()
        };

        let containment = |rel_type: &str, to: &str| RelationshipRule {
            rel_type: rel_type.to_string(),
            from: labels::MODEL.to_string(),
            to: to.to_string(),
            via: RelationshipSource::Containment,
        };

        Self {
            name: SchemaConfig::DEFAULT_SCHEMA_NAME.to_string(),
            nodes: vec![
                NodeRule {
                    label: labels::MODEL.to_string(),
                    element: "model".to_string(),
                    properties: common(&["substanceUnits", "timeUnits"]),
                },
                NodeRule {
                    label: labels::COMPARTMENT.to_string(),
                    element: "compartment".to_string(),
                    properties: common(&["size", "spatialDimensions", "constant"]),
                },
                NodeRule {
                    label: labels::SPECIES.to_string(),
                    element: "species".to_string(),
                    properties: common(&["compartment", "initialConcentration", "initialAmount"]),
                },
                NodeRule {
                    label: labels::REACTION.to_string(),
                    element: "reaction".to_string(),
                    properties: common(&["reversible"]),
                },
                NodeRule {
                    label: labels::UNIT_DEFINITION.to_string(),
                    element: "unitDefinition".to_string(),
                    properties: common(&[]),
                },
            ],
            relationships: vec![
                containment(rel_types::HAS_COMPARTMENT, labels::COMPARTMENT),
                containment(rel_types::HAS_SPECIES, labels::SPECIES),
                containment(rel_types::HAS_REACTION, labels::REACTION),
                containment(rel_types::HAS_UNITDEFINITION, labels::UNIT_DEFINITION),
                RelationshipRule {
                    rel_type: rel_types::IN_COMPARTMENT.to_string(),
                    from: labels::SPECIES.to_string(),
                    to: labels::COMPARTMENT.to_string(),
                    via: RelationshipSource::Reference {
                        attribute: "compartment".to_string(),
                    },
                },
            ],
        }
    }

    /// Load and validate a schema file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BioGraphError::SchemaNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BioGraphError::io_with_path(e, path))?;

        let schema: MappingSchema = serde_json::from_str(&content).map_err(|e| {
            BioGraphError::validation(
                "schema",
                format!("{} is not a valid mapping schema: {}", path.display(), e),
            )
        })?;
        schema.validate()?;

        debug!(
            "Loaded mapping schema '{}' from {} ({} node rules, {} relationship rules)",
            schema.name,
            path.display(),
            schema.nodes.len(),
            schema.relationships.len()
        );
        Ok(schema)
    }

    /// Check internal consistency: unique labels and elements, and every
    /// relationship endpoint names a known label.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(BioGraphError::validation(
                "schema",
                format!("schema '{}' has no node rules", self.name),
            ));
        }

        let mut labels_seen = HashSet::new();
        let mut elements_seen = HashSet::new();
        for rule in &self.nodes {
            if !labels_seen.insert(rule.label.as_str()) {
                return Err(BioGraphError::validation(
                    "schema",
                    format!("label '{}' is mapped twice", rule.label),
                ));
            }
            if !elements_seen.insert(rule.element.as_str()) {
                return Err(BioGraphError::validation(
                    "schema",
                    format!("element '{}' is mapped twice", rule.element),
                ));
            }
        }

        for rel in &self.relationships {
            for label in [&rel.from, &rel.to] {
                if !labels_seen.contains(label.as_str()) {
                    return Err(BioGraphError::validation(
                        "schema",
                        format!(
                            "relationship {} uses unknown label '{}'",
                            rel.rel_type, label
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Node rule for a description element, if the element is mapped.
    pub fn rule_for_element(&self, element: &str) -> Option<&NodeRule> {
        self.nodes.iter().find(|r| r.element == element)
    }

    /// Containment rules whose target is `to_label`.
    pub fn containment_rules_to<'a>(
        &'a self,
        to_label: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipRule> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.to == to_label && r.via == RelationshipSource::Containment)
    }

    /// All attribute-reference rules.
    pub fn reference_rules(&self) -> impl Iterator<Item = (&RelationshipRule, &str)> {
        self.relationships.iter().filter_map(|r| match &r.via {
            RelationshipSource::Reference { attribute } => Some((r, attribute.as_str())),
            RelationshipSource::Containment => None,
        })
    }
}

impl Default for MappingSchema {
    fn default() -> Self {
        Self::sbml_default()
    }
}

/// Check that `path` looks like a schema file and exists.
pub fn check_schema_path(path: &Path) -> Result<()> {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(SchemaConfig::SCHEMA_EXTENSION))
        .unwrap_or(false);

    if !has_extension {
        return Err(BioGraphError::validation(
            "schema",
            format!(
                "{} does not have a .{} extension",
                path.display(),
                SchemaConfig::SCHEMA_EXTENSION
            ),
        ));
    }

    if !path.is_file() {
        return Err(BioGraphError::validation(
            "schema",
            format!("{} does not exist", path.display()),
        ));
    }

    Ok(())
}

struct ActiveState {
    schema: Arc<MappingSchema>,
    path: Option<PathBuf>,
}

/// The process-wide active mapping schema.
///
/// Readers take a cheap `Arc` snapshot; [`ActiveSchema::change_schema`] swaps
/// the reference only after the new file validated. Models imported earlier
/// keep the mapping they were written with.
pub struct ActiveSchema {
    state: RwLock<ActiveState>,
}

impl ActiveSchema {
    pub fn new(schema: MappingSchema) -> Self {
        Self {
            state: RwLock::new(ActiveState {
                schema: Arc::new(schema),
                path: None,
            }),
        }
    }

    /// Start from a schema file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let active = Self::new(MappingSchema::sbml_default());
        active.change_schema(path)?;
        Ok(active)
    }

    /// Snapshot of the current schema.
    pub fn current(&self) -> Result<Arc<MappingSchema>> {
        let state = self
            .state
            .read()
            .map_err(|e| BioGraphError::Other(format!("Failed to acquire schema lock: {}", e)))?;
        Ok(Arc::clone(&state.schema))
    }

    /// File the current schema was loaded from (`None` for built-in schemas).
    pub fn path(&self) -> Option<PathBuf> {
        self.state.read().ok().and_then(|s| s.path.clone())
    }

    /// Validate `path` and make it the active schema.
    ///
    /// On any failure the previous schema stays active.
    pub fn change_schema(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        check_schema_path(path)?;

        let schema = MappingSchema::load(path)?;
        let name = schema.name.clone();

        let mut state = self
            .state
            .write()
            .map_err(|e| BioGraphError::Other(format!("Failed to acquire schema lock: {}", e)))?;
        state.schema = Arc::new(schema);
        state.path = Some(path.to_path_buf());

        info!("Active mapping schema is now '{}' ({})", name, path.display());
        Ok(())
    }
}

impl Default for ActiveSchema {
    fn default() -> Self {
        Self::new(MappingSchema::sbml_default())
    }
}
