//! SQLite-backed graph store.

use super::{check_batches, GraphStore, ModelHit, ModelProfile, ModelStats, WriteSummary};
use crate::config::StoreConfig;
use crate::error::{BioGraphError, Result};
use crate::graph::{labels, rel_types, ChildRef, GraphBatch};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A row returned by [`SqliteGraphStore::query`].
pub type QueryRow = serde_json::Map<String, serde_json::Value>;

/// Graph store persisted in a single SQLite database.
///
/// Nodes and relationships live in two tables keyed by tag. Relationship
/// endpoints refer to node rowids, so a merged model can hold two nodes with
/// the same description id.
#[derive(Clone)]
pub struct SqliteGraphStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    /// Create or open a store at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| BioGraphError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened graph store at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file, or `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            ",
        )?;
        conn.busy_timeout(StoreConfig::BUSY_TIMEOUT)?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS nodes (
                uid INTEGER PRIMARY KEY,
                tag TEXT NOT NULL,
                node_id TEXT NOT NULL,
                label TEXT NOT NULL,
                name TEXT,
                metaid TEXT,
                properties_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS relationships (
                uid INTEGER PRIMARY KEY,
                tag TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                source_uid INTEGER NOT NULL REFERENCES nodes(uid) ON DELETE CASCADE,
                target_uid INTEGER NOT NULL REFERENCES nodes(uid) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_tag ON nodes(tag, label);
            CREATE INDEX IF NOT EXISTS idx_nodes_label_id ON nodes(label, node_id);
            CREATE INDEX IF NOT EXISTS idx_rel_tag ON relationships(tag);
            CREATE INDEX IF NOT EXISTS idx_rel_source ON relationships(source_uid, rel_type);
            CREATE INDEX IF NOT EXISTS idx_rel_target ON relationships(target_uid, rel_type);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BioGraphError::store("Failed to acquire connection lock"))
    }

    /// Run an ad-hoc statement.
    ///
    /// With `expect_rows` the statement's rows come back as JSON objects keyed
    /// by column name; otherwise the statement is executed and `None` returned.
    pub fn query(&self, text: &str, expect_rows: bool) -> Result<Option<Vec<QueryRow>>> {
        let conn = self.lock()?;

        if !expect_rows {
            conn.execute_batch(text)?;
            return Ok(None);
        }

        let mut stmt = conn.prepare(text)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = QueryRow::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), value_to_json(row.get_ref(i)?));
            }
            out.push(record);
        }

        Ok(Some(out))
    }

    /// Bulk-insert a batch's nodes. Returns description id to rowid.
    fn create_nodes(tx: &Transaction<'_>, batch: &GraphBatch) -> Result<HashMap<String, i64>> {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO nodes (tag, node_id, label, name, metaid, properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        let mut uids = HashMap::with_capacity(batch.nodes.len());
        for node in &batch.nodes {
            let properties_json = serde_json::to_string(&node.properties)?;
            stmt.execute(params![
                batch.tag,
                node.id,
                node.label,
                node.name(),
                node.metaid(),
                properties_json,
            ])?;
            uids.insert(node.id.clone(), tx.last_insert_rowid());
        }
        Ok(uids)
    }

    /// Bulk-insert a batch's relationships using the rowids from `create_nodes`.
    fn create_relationships(
        tx: &Transaction<'_>,
        batch: &GraphBatch,
        uids: &HashMap<String, i64>,
    ) -> Result<usize> {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO relationships (tag, rel_type, source_uid, target_uid)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for rel in &batch.relationships {
            let (Some(source), Some(target)) = (uids.get(&rel.source), uids.get(&rel.target))
            else {
                return Err(BioGraphError::mapping(
                    &batch.tag,
                    format!("relationship {} has an unknown endpoint", rel.rel_type),
                ));
            };
            stmt.execute(params![batch.tag, rel.rel_type, source, target])?;
        }
        Ok(batch.relationships.len())
    }

    fn delete_in(tx: &Transaction<'_>, tag: &str) -> Result<usize> {
        tx.execute("DELETE FROM relationships WHERE tag = ?1", params![tag])?;
        let removed = tx.execute("DELETE FROM nodes WHERE tag = ?1", params![tag])?;
        Ok(removed)
    }

    fn count_with_types(conn: &Connection, sql: &str, tag: &str, types: &[&str]) -> Result<u64> {
        let sql = sql.replace("{types}", &placeholders(2, types.len()));
        let args = std::iter::once(tag).chain(types.iter().copied());
        let count: i64 = conn.query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn has_root_in(conn: &Connection, tag: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE tag = ?1 AND label = ?2)",
            params![tag, labels::MODEL],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn count_elements_in(conn: &Connection, tag: &str) -> Result<u64> {
        let sql = format!(
            "WITH RECURSIVE
                roots(uid) AS (
                    SELECT uid FROM nodes WHERE tag = ?1 AND label = '{model}'
                ),
                reach(uid) AS (
                    SELECT uid FROM roots
                    UNION
                    SELECT r.target_uid FROM relationships r
                    JOIN reach ON r.source_uid = reach.uid
                    WHERE r.tag = ?1 AND r.rel_type IN ({{types}})
                )
             SELECT COUNT(*) FROM reach WHERE uid NOT IN (SELECT uid FROM roots)",
            model = labels::MODEL
        );
        Self::count_with_types(conn, &sql, tag, rel_types::CONTAINMENT)
    }

    fn count_relationships_in(conn: &Connection, tag: &str) -> Result<u64> {
        let sql = format!(
            "WITH RECURSIVE component(uid) AS (
                SELECT uid FROM nodes WHERE tag = ?1 AND label = '{model}'
                UNION
                SELECT CASE WHEN r.source_uid = component.uid
                            THEN r.target_uid ELSE r.source_uid END
                FROM relationships r
                JOIN component
                  ON r.source_uid = component.uid OR r.target_uid = component.uid
                WHERE r.tag = ?1 AND r.rel_type IN ({{types}})
             )
             SELECT COUNT(*) FROM relationships r
             WHERE r.tag = ?1 AND r.rel_type IN ({{types}})
               AND r.source_uid IN (SELECT uid FROM component)",
            model = labels::MODEL
        );
        Self::count_with_types(conn, &sql, tag, rel_types::CONTAINMENT)
    }

    fn root_children_in(conn: &Connection, tag: &str) -> Result<Vec<ChildRef>> {
        let sql = format!(
            "SELECT DISTINCT child.label, child.node_id
             FROM nodes root
             JOIN relationships r ON r.source_uid = root.uid
             JOIN nodes child ON child.uid = r.target_uid
             WHERE root.tag = ?1 AND root.label = '{model}' AND r.rel_type IN ({types})
             ORDER BY child.label, child.node_id",
            model = labels::MODEL,
            types = placeholders(2, rel_types::CHILDREN.len())
        );

        let args = std::iter::once(tag).chain(rel_types::CHILDREN.iter().copied());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(ChildRef {
                label: row.get(0)?,
                id: row.get(1)?,
            })
        })?;

        let mut children = Vec::new();
        for row in rows {
            children.push(row?);
        }
        Ok(children)
    }

    fn collect_hits(
        conn: &Connection,
        sql: &str,
        args: &[&str],
    ) -> Result<Vec<ModelHit>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(ModelHit {
                tag: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(b.to_vec()),
    }
}

impl GraphStore for SqliteGraphStore {
    fn model_exists(&self, tag: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE tag = ?1)",
            params![tag],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT tag FROM nodes ORDER BY tag")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    fn replace_model(&self, tag: &str, batches: &[GraphBatch]) -> Result<WriteSummary> {
        check_batches(tag, batches)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = Self::delete_in(&tx, tag)?;

        let mut nodes_written = 0;
        let mut relationships_written = 0;
        for batch in batches {
            let uids = Self::create_nodes(&tx, batch)?;
            nodes_written += uids.len();
            relationships_written += Self::create_relationships(&tx, batch, &uids)?;
        }

        tx.commit()?;

        debug!(
            "Wrote {}: {} nodes, {} relationships (replaced {} nodes)",
            tag, nodes_written, relationships_written, removed
        );
        Ok(WriteSummary {
            tag: tag.to_string(),
            replaced: removed > 0,
            nodes_written,
            relationships_written,
        })
    }

    fn delete_model(&self, tag: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = Self::delete_in(&tx, tag)?;
        tx.commit()?;
        Ok(removed)
    }

    fn model_stats(&self, tag: &str) -> Result<ModelStats> {
        let conn = self.lock()?;
        let nodes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE tag = ?1",
            params![tag],
            |row| row.get(0),
        )?;
        let relationships: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE tag = ?1",
            params![tag],
            |row| row.get(0),
        )?;
        Ok(ModelStats {
            nodes: nodes.max(0) as usize,
            relationships: relationships.max(0) as usize,
        })
    }

    fn has_root_model(&self, tag: &str) -> Result<bool> {
        Self::has_root_in(&*self.lock()?, tag)
    }

    fn count_elements(&self, tag: &str) -> Result<u64> {
        Self::count_elements_in(&*self.lock()?, tag)
    }

    fn count_relationships(&self, tag: &str) -> Result<u64> {
        Self::count_relationships_in(&*self.lock()?, tag)
    }

    fn root_children(&self, tag: &str) -> Result<Vec<ChildRef>> {
        Self::root_children_in(&*self.lock()?, tag)
    }

    fn model_profile(&self, tag: &str) -> Result<Option<ModelProfile>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        if !Self::has_root_in(&tx, tag)? {
            return Ok(None);
        }
        let profile = ModelProfile {
            elements: Self::count_elements_in(&tx, tag)?,
            relationships: Self::count_relationships_in(&tx, tag)?,
            children: Self::root_children_in(&tx, tag)?.into_iter().collect(),
        };

        tx.commit()?;
        Ok(Some(profile))
    }

    fn models_with_child(
        &self,
        rel_type: &str,
        label: &str,
        child_id: &str,
    ) -> Result<Vec<ModelHit>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT DISTINCT m.tag, m.name
             FROM nodes m
             JOIN relationships r ON r.source_uid = m.uid
             JOIN nodes c ON c.uid = r.target_uid
             WHERE m.label = '{model}' AND r.rel_type = ?1 AND c.label = ?2 AND c.node_id = ?3
             ORDER BY m.tag",
            model = labels::MODEL
        );
        Self::collect_hits(&conn, &sql, &[rel_type, label, child_id])
    }

    fn models_with_species_in_compartment(
        &self,
        species_id: &str,
        compartment_id: &str,
    ) -> Result<Vec<ModelHit>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT DISTINCT m.tag, m.name
             FROM nodes m
             JOIN relationships hs ON hs.source_uid = m.uid AND hs.rel_type = '{has_species}'
             JOIN nodes s ON s.uid = hs.target_uid AND s.label = '{species}'
             JOIN relationships ic ON ic.source_uid = s.uid AND ic.rel_type = '{in_compartment}'
             JOIN nodes c ON c.uid = ic.target_uid AND c.label = '{compartment}'
             WHERE m.label = '{model}' AND s.node_id = ?1 AND c.node_id = ?2
             ORDER BY m.tag",
            has_species = rel_types::HAS_SPECIES,
            species = labels::SPECIES,
            in_compartment = rel_types::IN_COMPARTMENT,
            compartment = labels::COMPARTMENT,
            model = labels::MODEL
        );
        Self::collect_hits(&conn, &sql, &[species_id, compartment_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, Relationship};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn batch(tag: &str, compartments: &[&str]) -> GraphBatch {
        let mut batch = GraphBatch::new(tag);
        batch
            .add_node(Node::new("root", labels::MODEL).with_property("name", format!("{} model", tag)))
            .unwrap();
        for c in compartments {
            batch.add_node(Node::new(*c, labels::COMPARTMENT)).unwrap();
            batch.add_relationship(Relationship::new(rel_types::HAS_COMPARTMENT, "root", *c));
        }
        batch
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/graph.db");
        let store = SqliteGraphStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.db_path(), Some(path.as_path()));
    }

    #[test]
    fn test_replace_and_delete() {
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let first = store.replace_model("M1", &[batch("M1", &["cell"])]).unwrap();
        assert!(!first.replaced);
        assert_eq!(first.nodes_written, 2);

        let second = store
            .replace_model("M1", &[batch("M1", &["cell", "nucleus"])])
            .unwrap();
        assert!(second.replaced);
        assert_eq!(
            store.model_stats("M1").unwrap(),
            ModelStats {
                nodes: 3,
                relationships: 2
            }
        );

        assert_eq!(store.delete_model("M1").unwrap(), 3);
        assert!(!store.model_exists("M1").unwrap());
        assert_eq!(store.delete_model("M1").unwrap(), 0);
    }

    #[test]
    fn test_failed_replace_keeps_previous_model() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.replace_model("M1", &[batch("M1", &["cell"])]).unwrap();

        let mut broken = batch("M1", &["cell"]);
        broken.add_relationship(Relationship::new(rel_types::HAS_SPECIES, "root", "ghost"));
        assert!(store.replace_model("M1", &[broken]).is_err());

        assert_eq!(store.model_stats("M1").unwrap().nodes, 2);
    }

    #[test]
    fn test_batch_tag_must_match() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let err = store.replace_model("M2", &[batch("M1", &[])]).unwrap_err();
        assert!(matches!(err, BioGraphError::Validation { .. }));
        assert!(!store.model_exists("M2").unwrap());
    }

    #[test]
    fn test_counts_and_children() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store
            .replace_model("M1", &[batch("M1", &["cell", "nucleus"])])
            .unwrap();

        assert!(store.has_root_model("M1").unwrap());
        assert_eq!(store.count_elements("M1").unwrap(), 2);
        assert_eq!(store.count_relationships("M1").unwrap(), 2);
        assert_eq!(
            store.root_children("M1").unwrap(),
            vec![
                ChildRef::new(labels::COMPARTMENT, "cell"),
                ChildRef::new(labels::COMPARTMENT, "nucleus"),
            ]
        );
        assert_eq!(store.count_elements("missing").unwrap(), 0);
    }

    #[test]
    fn test_profile_reads_one_version() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let small = batch("M", &["c0"]);
        let large = batch("M", &["c0", "c1", "c2", "c3", "c4"]);
        store.replace_model("M", &[small.clone()]).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = store.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let versions = [small, large];
                let mut i = 0;
                while !stop.load(Ordering::Relaxed) {
                    store
                        .replace_model("M", std::slice::from_ref(&versions[i % 2]))
                        .unwrap();
                    i += 1;
                }
            })
        };

        for _ in 0..1_000 {
            let profile = store.model_profile("M").unwrap().unwrap();
            assert_eq!(profile.elements, profile.relationships);
            assert_eq!(profile.elements as usize, profile.children.len());
            assert!(profile.elements == 1 || profile.elements == 5);
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        assert!(store.model_profile("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_tags_sorted() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.replace_model("b", &[batch("b", &[])]).unwrap();
        store.replace_model("a", &[batch("a", &[])]).unwrap();
        assert_eq!(store.list_tags().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_query_returns_rows() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.replace_model("M1", &[batch("M1", &["cell"])]).unwrap();

        let rows = store
            .query("SELECT tag, name FROM nodes WHERE label = 'Model'", true)
            .unwrap()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["tag"], "M1");
        assert_eq!(rows[0]["name"], "M1 model");

        assert!(store.query("PRAGMA optimize", false).unwrap().is_none());
        assert!(store.query("SELECT * FROM missing_table", true).is_err());
    }
}
