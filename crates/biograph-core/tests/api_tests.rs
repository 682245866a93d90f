//! Integration tests for the BioGraph public interface.
//!
//! These run every component over an on-disk SQLite store and a folder of
//! SBML files, the way the CLI wires them.

use biograph_core::{
    BioGraph, BioGraphError, CancellationToken, GraphStore, MappingSchema, SqliteGraphStore,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Write a minimal SBML document with the given compartments and species.
///
/// Each species sits in the first compartment.
fn sbml(model_name: &str, compartments: &[&str], species: &[&str], reactions: &[&str]) -> String {
    let compartments_xml: String = compartments
        .iter()
        .map(|c| format!(r#"<compartment id="{}" size="1"/>"#, c))
        .collect();
    let home = compartments.first().copied().unwrap_or("cell");
    let species_xml: String = species
        .iter()
        .map(|s| format!(r#"<species id="{}" compartment="{}"/>"#, s, home))
        .collect();
    let reactions_xml: String = reactions
        .iter()
        .map(|r| format!(r#"<reaction id="{}" reversible="false"/>"#, r))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level3/version2/core" level="3" version="2">
  <model id="model" name="{}">
    <listOfCompartments>{}</listOfCompartments>
    <listOfSpecies>{}</listOfSpecies>
    <listOfReactions>{}</listOfReactions>
  </model>
</sbml>"#,
        model_name, compartments_xml, species_xml, reactions_xml
    )
}

fn write_model(models: &Path, tag: &str, xml: &str) {
    std::fs::write(models.join(format!("{}.xml", tag)), xml).unwrap();
}

/// Temp dir with a `models/` folder holding M1, M2, M3 and an on-disk store.
fn create_test_env() -> (TempDir, BioGraph) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let models = temp_dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();

    let species = ["glc", "g6p", "f6p", "atp", "adp"];
    write_model(&models, "M1", &sbml("Glycolysis", &["cell", "ext"], &species, &[]));
    write_model(&models, "M2", &sbml("Glycolysis v2", &["cell", "ext"], &species, &[]));
    write_model(
        &models,
        "M3",
        &sbml("Signalling", &["nucleus"], &["p53"], &["bind", "release"]),
    );

    let graph = BioGraph::builder()
        .store_path(temp_dir.path().join("graph.db"))
        .models_dir(&models)
        .import_workers(2)
        .build()
        .unwrap();

    (temp_dir, graph)
}

async fn import_all(graph: &BioGraph) {
    let tags: Vec<String> = ["M1", "M2", "M3"].iter().map(|s| s.to_string()).collect();
    let report = graph.import_models(&tags, &CancellationToken::new()).await;
    assert!(report.is_success(), "{:?}", report);
}

#[tokio::test]
async fn test_import_and_list() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    assert_eq!(graph.list_models().unwrap(), vec!["M1", "M2", "M3"]);
    assert!(graph.exists("M1").unwrap());
    assert!(!graph.exists("M4").unwrap());
}

#[tokio::test]
async fn test_compare_self_is_one_for_every_model() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    for tag in graph.list_models().unwrap() {
        assert_eq!(graph.compare(&tag, &tag).unwrap(), 1.0, "{}", tag);
    }
}

#[tokio::test]
async fn test_identical_structure_scores_one() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    assert_eq!(graph.compare("M1", "M2").unwrap(), 1.0);
    assert_eq!(graph.compare("M2", "M1").unwrap(), 1.0);
}

#[tokio::test]
async fn test_compare_can_be_asymmetric() {
    let (_temp, graph) = create_test_env();
    graph
        .import_description("small", sbml("Small", &["cell"], &["glc"], &[]).into_bytes())
        .await
        .unwrap();
    graph
        .import_description(
            "large",
            sbml("Large", &["cell"], &["glc", "atp", "adp"], &[]).into_bytes(),
        )
        .await
        .unwrap();

    let forward = graph.compare("small", "large").unwrap();
    let backward = graph.compare("large", "small").unwrap();
    assert!(forward > backward);
}

#[tokio::test]
async fn test_compare_unknown_model_is_zero() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;
    assert_eq!(graph.compare("M1", "missing").unwrap(), 0.0);
}

#[tokio::test]
async fn test_search_for_compartment() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    let names = graph.search_for_compartment("cell").unwrap();
    assert_eq!(names, vec!["Glycolysis", "Glycolysis v2"]);
    assert!(!names.contains(&"Signalling".to_string()));
    assert!(graph.search_for_compartment("golgi").unwrap().is_empty());
}

#[tokio::test]
async fn test_search_compounds() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    assert_eq!(graph.search_for_compound("p53").unwrap(), vec!["Signalling"]);
    assert_eq!(
        graph.search_compound_in_compartment("glc", "cell").unwrap(),
        vec!["Glycolysis", "Glycolysis v2"]
    );
    assert!(graph
        .search_compound_in_compartment("glc", "ext")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_merge_and_rank() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    let merged = graph.merge_models("M1", "M2").await.unwrap();
    assert_eq!(merged, "M1-M2");
    assert!(graph.exists("M1-M2").unwrap());
    assert!(graph.list_models().unwrap().contains(&merged));

    let ranked = graph.find_all_similar("M1", None).unwrap();
    assert!(ranked.iter().all(|m| !m.tag.contains('-')));
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].score, 100.0);
    assert_eq!(ranked[1].score, 100.0);
    assert_eq!(ranked[2].tag, "M3");

    // Merged models never show up in search either.
    assert_eq!(graph.search_for_compartment("cell").unwrap().len(), 2);
}

#[tokio::test]
async fn test_merge_with_missing_model() {
    let (_temp, graph) = create_test_env();
    graph.import_model("M1").await.unwrap();

    let err = graph.merge_models("M1", "Mx").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!graph.exists("M1-Mx").unwrap());
}

#[tokio::test]
async fn test_delete_then_exists() {
    let (_temp, graph) = create_test_env();
    import_all(&graph).await;

    graph.delete_model("M3").await.unwrap();
    assert!(!graph.exists("M3").unwrap());
    assert_eq!(graph.list_models().unwrap(), vec!["M1", "M2"]);

    // Deleting twice is not an error.
    graph.delete_model("M3").await.unwrap();
}

#[tokio::test]
async fn test_double_import_keeps_one_copy() {
    let temp_dir = TempDir::new().unwrap();
    let models = temp_dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();
    write_model(&models, "M1", &sbml("Glycolysis", &["cell"], &["glc"], &[]));

    let db = temp_dir.path().join("graph.db");
    let store = Arc::new(SqliteGraphStore::open(&db).unwrap());
    let graph = BioGraph::builder()
        .with_store(store.clone())
        .models_dir(&models)
        .build()
        .unwrap();

    let first = graph.import_model("M1").await.unwrap();
    let second = graph.import_model("M1").await.unwrap();
    assert!(!first.replaced);
    assert!(second.replaced);

    let stats = store.model_stats("M1").unwrap();
    assert_eq!(stats.nodes, first.nodes_written);
    assert_eq!(stats.relationships, first.relationships_written);

    let rows = store
        .query("SELECT COUNT(*) AS roots FROM nodes WHERE tag = 'M1' AND label = 'Model'", true)
        .unwrap()
        .unwrap();
    assert_eq!(rows[0]["roots"], 1);
}

#[tokio::test]
async fn test_cancelled_import_keeps_prior_version() {
    let (_temp, graph) = create_test_env();
    graph.import_model("M1").await.unwrap();
    let before = graph.repository().store().model_stats("M1").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let replacement = sbml("Replacement", &["cell"], &[], &[]).into_bytes();
    let err = graph
        .repository()
        .import_description_with_cancel("M1", replacement, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BioGraphError::Cancelled));
    assert_eq!(graph.repository().store().model_stats("M1").unwrap(), before);
    assert_eq!(graph.search_for_compartment("ext").unwrap(), vec!["Glycolysis"]);
}

#[tokio::test]
async fn test_sync_missing() {
    let (_temp, graph) = create_test_env();
    graph.import_model("M2").await.unwrap();

    let report = graph.sync_missing(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.imported, vec!["M1", "M3"]);
    assert_eq!(graph.repository().model_count().unwrap(), 3);
}

#[tokio::test]
async fn test_import_unknown_tag_is_not_found() {
    let (_temp, graph) = create_test_env();
    let err = graph.import_model("BIOMD9999").await.unwrap_err();
    assert!(matches!(err, BioGraphError::SourceNotFound { .. }));
}

#[tokio::test]
async fn test_change_schema() {
    let (temp, graph) = create_test_env();

    let bad_extension = temp.path().join("schema.txt");
    std::fs::write(&bad_extension, "{}").unwrap();
    let err = graph.change_schema(&bad_extension).unwrap_err();
    assert!(matches!(err, BioGraphError::Validation { .. }));

    let missing = temp.path().join("missing.json");
    assert!(graph.change_schema(&missing).is_err());

    // Compartments only: species are no longer mapped.
    let mut schema = MappingSchema::sbml_default();
    schema.name = "compartments_only".into();
    schema.nodes.retain(|n| n.label == "Model" || n.label == "Compartment");
    schema
        .relationships
        .retain(|r| r.from == "Model" && r.to == "Compartment");
    let path = temp.path().join("compartments.json");
    std::fs::write(&path, serde_json::to_string(&schema).unwrap()).unwrap();

    graph.import_model("M1").await.unwrap();
    graph.change_schema(&path).unwrap();
    graph.import_model("M2").await.unwrap();

    // M1 keeps its species, M2 was mapped without them.
    assert_eq!(graph.search_for_compound("glc").unwrap(), vec!["Glycolysis"]);
    assert_eq!(
        graph.repository().active_schema().current().unwrap().name,
        "compartments_only"
    );
}

#[test]
fn test_bundled_schema_matches_builtin() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schemas/default_schema.json");
    let bundled = MappingSchema::load(&path).unwrap();
    assert_eq!(bundled, MappingSchema::sbml_default());
}
