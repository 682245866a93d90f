//! Attribute search over stored models.

use crate::config::is_merged_tag;
use crate::error::Result;
use crate::graph::{labels, rel_types};
use crate::store::{GraphStore, ModelHit};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Read-only predicates that locate models by what they contain.
///
/// Every search returns the distinct names of matching plain models, sorted.
/// An empty vector means nothing matched.
#[derive(Clone)]
pub struct SearchIndex {
    store: Arc<dyn GraphStore>,
}

impl SearchIndex {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Models with a compartment whose id is `compartment_id`.
    pub fn search_for_compartment(&self, compartment_id: &str) -> Result<Vec<String>> {
        let hits = self.store.models_with_child(
            rel_types::HAS_COMPARTMENT,
            labels::COMPARTMENT,
            compartment_id,
        )?;
        Ok(names("compartment", compartment_id, hits))
    }

    /// Models with a species whose id is `species_id`.
    pub fn search_for_compound(&self, species_id: &str) -> Result<Vec<String>> {
        let hits =
            self.store
                .models_with_child(rel_types::HAS_SPECIES, labels::SPECIES, species_id)?;
        Ok(names("compound", species_id, hits))
    }

    /// Models with species `species_id` located in compartment `compartment_id`.
    pub fn search_compound_in_compartment(
        &self,
        species_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<String>> {
        let hits = self
            .store
            .models_with_species_in_compartment(species_id, compartment_id)?;
        Ok(names(
            "compound in compartment",
            &format!("{} in {}", species_id, compartment_id),
            hits,
        ))
    }
}

/// Distinct names of hits outside merged models.
///
/// A model without a `name` property is reported by its tag.
fn names(kind: &str, needle: &str, hits: Vec<ModelHit>) -> Vec<String> {
    let names: BTreeSet<String> = hits
        .into_iter()
        .filter(|hit| !is_merged_tag(&hit.tag))
        .map(|hit| hit.name.unwrap_or(hit.tag))
        .collect();

    if names.is_empty() {
        debug!("No models found for {} '{}'", kind, needle);
    }
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBatch, Node, Relationship};
    use crate::store::MemoryGraphStore;

    fn model(tag: &str, name: Option<&str>, species_in: &[(&str, &str)]) -> GraphBatch {
        let mut batch = GraphBatch::new(tag);
        let mut root = Node::new("root", labels::MODEL);
        if let Some(name) = name {
            root = root.with_property("name", name);
        }
        batch.add_node(root).unwrap();

        for (species, compartment) in species_in {
            if !batch.contains_node(compartment) {
                batch.add_node(Node::new(*compartment, labels::COMPARTMENT)).unwrap();
                batch.add_relationship(Relationship::new(
                    rel_types::HAS_COMPARTMENT,
                    "root",
                    *compartment,
                ));
            }
            batch.add_node(Node::new(*species, labels::SPECIES)).unwrap();
            batch.add_relationship(Relationship::new(rel_types::HAS_SPECIES, "root", *species));
            batch.add_relationship(Relationship::new(
                rel_types::IN_COMPARTMENT,
                *species,
                *compartment,
            ));
        }
        batch
    }

    fn index() -> SearchIndex {
        let store = Arc::new(MemoryGraphStore::new());
        for batch in [
            model("M1", Some("Glycolysis"), &[("glc", "cell"), ("atp", "cell")]),
            model("M2", Some("Glycolysis"), &[("glc", "cell")]),
            model("M3", None, &[("glc", "nucleus")]),
            model("M1-M3", Some("Merged"), &[("glc", "cell")]),
        ] {
            store.replace_model(&batch.tag.clone(), &[batch]).unwrap();
        }
        SearchIndex::new(store)
    }

    #[test]
    fn test_search_for_compartment() {
        let index = index();
        assert_eq!(index.search_for_compartment("cell").unwrap(), vec!["Glycolysis"]);
        assert_eq!(index.search_for_compartment("nucleus").unwrap(), vec!["M3"]);
        assert!(index.search_for_compartment("golgi").unwrap().is_empty());
    }

    #[test]
    fn test_search_for_compound() {
        let index = index();
        assert_eq!(
            index.search_for_compound("glc").unwrap(),
            vec!["Glycolysis", "M3"]
        );
        assert_eq!(index.search_for_compound("atp").unwrap(), vec!["Glycolysis"]);
    }

    #[test]
    fn test_search_compound_in_compartment() {
        let index = index();
        assert_eq!(
            index.search_compound_in_compartment("glc", "nucleus").unwrap(),
            vec!["M3"]
        );
        assert!(index
            .search_compound_in_compartment("atp", "nucleus")
            .unwrap()
            .is_empty());
    }
}
