//! SBML description mapper.
//!
//! Streams the XML once with `quick-xml`, turning mapped elements into nodes,
//! then resolves attribute references once every node is known.

use super::schema::MappingSchema;
use super::ModelMapper;
use crate::error::{BioGraphError, Result};
use crate::graph::{labels, GraphBatch, Node, Relationship};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Elements whose content is free-form and never mapped.
const OPAQUE_ELEMENTS: &[&str] = &["annotation", "notes"];

/// Element that marks the model root of an SBML document.
const MODEL_ELEMENT: &str = "model";

/// Labels whose ids live in their own namespace (SBML `UnitSId`).
const SEPARATE_ID_LABELS: &[&str] = &[labels::UNIT_DEFINITION];

/// Property holding the document id of a node whose batch id was qualified.
pub const SOURCE_ID_PROPERTY: &str = "sid";

/// Batch id for a node: qualified by label when its ids use their own namespace.
fn arena_key(label: &str, id: &str) -> String {
    if SEPARATE_ID_LABELS.contains(&label) {
        format!("{}:{}", label, id)
    } else {
        id.to_string()
    }
}

/// Maps SBML documents into graph batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SbmlMapper;

impl SbmlMapper {
    pub fn new() -> Self {
        Self
    }
}

/// A mapped node plus every attribute it carried, needed for reference rules.
struct PendingNode {
    node: Node,
    attributes: BTreeMap<String, String>,
}

/// Parse state for one document.
struct MappingRun<'a> {
    schema: &'a MappingSchema,
    tag: &'a str,
    pending: Vec<PendingNode>,
    ids: HashMap<String, usize>,
    relationships: Vec<Relationship>,
    /// One entry per open element: index of the node it produced, if any.
    open: Vec<Option<usize>>,
    opaque_depth: usize,
    saw_model: bool,
}

impl<'a> MappingRun<'a> {
    fn new(schema: &'a MappingSchema, tag: &'a str) -> Self {
        Self {
            schema,
            tag,
            pending: Vec::new(),
            ids: HashMap::new(),
            relationships: Vec::new(),
            open: Vec::new(),
            opaque_depth: 0,
            saw_model: false,
        }
    }

    fn error(&self, message: impl Into<String>) -> BioGraphError {
        BioGraphError::mapping(self.tag, message)
    }

    fn start(&mut self, element: &BytesStart<'_>, self_closing: bool) -> Result<()> {
        let name = element_name(element, self.tag)?;

        if self.opaque_depth > 0 || OPAQUE_ELEMENTS.contains(&name.as_str()) {
            if !self_closing {
                self.opaque_depth += 1;
                self.open.push(None);
            }
            return Ok(());
        }

        if name == MODEL_ELEMENT {
            self.saw_model = true;
        }

        let schema = self.schema;
        let produced = match schema.rule_for_element(&name) {
            Some(rule) => {
                let attributes = read_attributes(element, self.tag)?;
                self.map_element(rule.label.clone(), &rule.properties, attributes)?
            }
            None => None,
        };

        if !self_closing {
            self.open.push(produced);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if self.open.pop().is_none() {
            return Err(self.error("unbalanced closing element"));
        }
        if self.opaque_depth > 0 {
            self.opaque_depth -= 1;
        }
        Ok(())
    }

    fn map_element(
        &mut self,
        label: String,
        properties: &[String],
        attributes: BTreeMap<String, String>,
    ) -> Result<Option<usize>> {
        let id = match attributes.get("id") {
            Some(id) if !id.is_empty() => id.clone(),
            // SBML allows an anonymous model; it is addressed by its tag.
            _ if label == labels::MODEL => self.tag.to_string(),
            _ => {
                debug!("{}: skipping {} element without an id", self.tag, label);
                return Ok(None);
            }
        };

        let key = arena_key(&label, &id);
        if self.ids.contains_key(&key) {
            return Err(self.error(format!("duplicate {} id '{}'", label, id)));
        }

        let mut node = Node::new(key.clone(), label);
        for property in properties {
            if let Some(value) = attributes.get(property) {
                node.properties.insert(property.clone(), value.clone());
            }
        }
        if key != id {
            node.properties.insert(SOURCE_ID_PROPERTY.to_string(), id.clone());
        }
        if node.label == labels::MODEL && node.name().is_none() {
            node.properties.insert("name".to_string(), id);
        }

        self.link_to_container(&node);

        let index = self.pending.len();
        self.ids.insert(key, index);
        self.pending.push(PendingNode { node, attributes });
        Ok(Some(index))
    }

    /// Add a containment edge from the nearest open ancestor a rule allows.
    fn link_to_container(&mut self, node: &Node) {
        let schema = self.schema;
        for rule in schema.containment_rules_to(&node.label) {
            let container_id = self
                .open
                .iter()
                .rev()
                .flatten()
                .map(|&i| &self.pending[i].node)
                .find(|candidate| candidate.label == rule.from)
                .map(|container| container.id.clone());

            if let Some(container_id) = container_id {
                self.relationships.push(Relationship::new(
                    rule.rel_type.clone(),
                    container_id,
                    node.id.clone(),
                ));
            }
        }
    }

    fn resolve_references(&mut self) -> Result<()> {
        let mut resolved = Vec::new();
        for (rule, attribute) in self.schema.reference_rules() {
            for pending in self.pending.iter().filter(|p| p.node.label == rule.from) {
                let Some(target_id) = pending.attributes.get(attribute) else {
                    continue;
                };

                let target = self
                    .ids
                    .get(&arena_key(&rule.to, target_id))
                    .map(|&i| &self.pending[i].node)
                    .filter(|t| t.label == rule.to);

                match target {
                    Some(target) => resolved.push(Relationship::new(
                        rule.rel_type.clone(),
                        pending.node.id.clone(),
                        target.id.clone(),
                    )),
                    None => {
                        return Err(BioGraphError::mapping(
                            self.tag,
                            format!(
                                "{} '{}' refers to unknown {} '{}'",
                                rule.from, pending.node.id, rule.to, target_id
                            ),
                        ))
                    }
                }
            }
        }
        self.relationships.extend(resolved);
        Ok(())
    }

    fn finish(mut self) -> Result<GraphBatch> {
        if !self.open.is_empty() {
            return Err(self.error("unexpected end of document"));
        }
        if !self.saw_model {
            return Err(self.error("description has no <model> element"));
        }

        self.resolve_references()?;

        let mut batch = GraphBatch::new(self.tag);
        batch.nodes = self.pending.into_iter().map(|p| p.node).collect();
        batch.relationships = self.relationships;
        batch.validate()?;

        if batch.is_empty() {
            warn!("{}: mapping produced no nodes", batch.tag);
        }
        Ok(batch)
    }
}

fn element_name(element: &BytesStart<'_>, tag: &str) -> Result<String> {
    std::str::from_utf8(element.local_name().as_ref())
        .map(str::to_string)
        .map_err(|e| BioGraphError::mapping(tag, format!("element name is not UTF-8: {}", e)))
}

fn read_attributes(element: &BytesStart<'_>, tag: &str) -> Result<BTreeMap<String, String>> {
    let mut attributes = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| BioGraphError::mapping(tag, format!("bad attribute: {}", e)))?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|e| {
                BioGraphError::mapping(tag, format!("attribute name is not UTF-8: {}", e))
            })?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| BioGraphError::mapping(tag, format!("bad value for {}: {}", key, e)))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

impl ModelMapper for SbmlMapper {
    fn map_description(&self, raw: &[u8], schema: &MappingSchema, tag: &str) -> Result<GraphBatch> {
        let mut reader = Reader::from_reader(raw);
        reader.trim_text(true);

        let mut run = MappingRun::new(schema, tag);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => run.start(&e, false)?,
                Ok(Event::Empty(e)) => run.start(&e, true)?,
                Ok(Event::End(_)) => run.end()?,
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(BioGraphError::mapping(
                        tag,
                        format!(
                            "malformed XML at byte {}: {}",
                            reader.buffer_position(),
                            e
                        ),
                    ))
                }
            }
            buf.clear();
        }

        let batch = run.finish()?;
        debug!(
            "Mapped {}: {} nodes, {} relationships",
            tag,
            batch.node_count(),
            batch.relationship_count()
        );
        Ok(batch)
    }
}
