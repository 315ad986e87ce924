//! # redb-backed Store
//!
//! A disk-backed store backend over the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Documents are serialized as JSON bytes; redb's ordered tables give the
//! same deterministic key iteration the in-memory backend gets from
//! `BTreeMap`, so reconciliation tie-breaks behave identically on both.

use crate::graph::{Direction, TraversalResult};
use crate::store::{Store, matches_probe, next_vertices};
use crate::types::{Document, NodalError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

/// Documents: (domain, collection, key) -> JSON bytes.
const DOCUMENTS: TableDefinition<(&str, &str, &str), &[u8]> = TableDefinition::new("documents");

/// Collections: (domain, name) -> is_edge flag.
const COLLECTIONS: TableDefinition<(&str, &str), bool> = TableDefinition::new("collections");

/// Domains: name -> marker.
const DOMAINS: TableDefinition<&str, u8> = TableDefinition::new("domains");

/// Edge definitions: (domain, graph, edge collection) -> JSON bytes of
/// (from_collections, to_collections).
const EDGE_DEFINITIONS: TableDefinition<(&str, &str, &str), &[u8]> =
    TableDefinition::new("edge_definitions");

/// Metadata: key string -> value u64 (store-assigned key counter).
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_KEY: &str = "next_key";

fn io_err(e: impl std::fmt::Display) -> NodalError {
    NodalError::Io(e.to_string())
}

fn encode(document: &Document) -> Result<Vec<u8>, NodalError> {
    serde_json::to_vec(document).map_err(|e| NodalError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Document, NodalError> {
    serde_json::from_slice(bytes).map_err(|e| NodalError::Serialization(e.to_string()))
}

/// A disk-backed store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NodalError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables so later read transactions never hit a
        // missing-table error.
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            let _ = write_txn.open_table(COLLECTIONS).map_err(io_err)?;
            let _ = write_txn.open_table(DOMAINS).map_err(io_err)?;
            let _ = write_txn.open_table(EDGE_DEFINITIONS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// All edge definitions registered for a graph, as
    /// `(edge_collection, from_collections, to_collections)`.
    fn edge_definitions(
        &self,
        domain: &str,
        graph: &str,
    ) -> Result<Vec<(String, Vec<String>, Vec<String>)>, NodalError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGE_DEFINITIONS).map_err(io_err)?;
        let mut definitions = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key_guard, value_guard) = entry.map_err(io_err)?;
            let (def_domain, def_graph, edge_collection) = key_guard.value();
            if def_domain != domain || def_graph != graph {
                continue;
            }
            let (from, to): (Vec<String>, Vec<String>) =
                serde_json::from_slice(value_guard.value())
                    .map_err(|e| NodalError::Serialization(e.to_string()))?;
            definitions.push((edge_collection.to_string(), from, to));
        }
        Ok(definitions)
    }

    /// All documents in one collection, in key order.
    fn collection_documents(
        &self,
        domain: &str,
        collection: &str,
    ) -> Result<Vec<Document>, NodalError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(DOCUMENTS).map_err(io_err)?;
        let mut documents = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key_guard, value_guard) = entry.map_err(io_err)?;
            let (doc_domain, doc_collection, _) = key_guard.value();
            if doc_domain == domain && doc_collection == collection {
                documents.push(decode(value_guard.value())?);
            }
        }
        Ok(documents)
    }

    /// Fetch a vertex document by full `"collection/key"` id.
    fn vertex_by_full_id(
        &self,
        domain: &str,
        full_id: &str,
    ) -> Result<Option<Document>, NodalError> {
        let Some((collection, key)) = full_id.split_once('/') else {
            return Ok(None);
        };
        self.get(domain, collection, key)
    }
}

impl Store for RedbStore {
    fn ensure_domain(&self, name: &str) -> Result<(), NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(DOMAINS).map_err(io_err)?;
            table.insert(name, 1u8).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn ensure_collection(
        &self,
        domain: &str,
        name: &str,
        is_edge: bool,
    ) -> Result<(), NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let domains = write_txn.open_table(DOMAINS).map_err(io_err)?;
            if domains.get(domain).map_err(io_err)?.is_none() {
                return Err(NodalError::NotFound(format!("domain '{domain}'")));
            }
            let mut collections = write_txn.open_table(COLLECTIONS).map_err(io_err)?;
            // Create-or-get: an existing collection keeps its edge flag.
            if collections.get((domain, name)).map_err(io_err)?.is_none() {
                collections.insert((domain, name), is_edge).map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)
    }

    fn get(
        &self,
        domain: &str,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, NodalError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(DOCUMENTS).map_err(io_err)?;
        match table.get((domain, collection, key)).map_err(io_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn find(
        &self,
        domain: &str,
        collection: &str,
        probe: &Document,
    ) -> Result<Vec<Document>, NodalError> {
        Ok(self
            .collection_documents(domain, collection)?
            .into_iter()
            .filter(|doc| matches_probe(doc, probe))
            .collect())
    }

    fn insert(
        &self,
        domain: &str,
        collection: &str,
        document: &Document,
        predefined_key: Option<&str>,
    ) -> Result<String, NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let key;
        {
            let domains = write_txn.open_table(DOMAINS).map_err(io_err)?;
            if domains.get(domain).map_err(io_err)?.is_none() {
                return Err(NodalError::NotFound(format!("domain '{domain}'")));
            }
            let collections = write_txn.open_table(COLLECTIONS).map_err(io_err)?;
            if collections
                .get((domain, collection))
                .map_err(io_err)?
                .is_none()
            {
                return Err(NodalError::NotFound(format!("collection '{collection}'")));
            }

            key = match predefined_key {
                Some(k) => k.to_string(),
                None => {
                    let mut metadata = write_txn.open_table(METADATA).map_err(io_err)?;
                    let next = metadata
                        .get(NEXT_KEY)
                        .map_err(io_err)?
                        .map(|g| g.value())
                        .unwrap_or(0)
                        + 1;
                    metadata.insert(NEXT_KEY, next).map_err(io_err)?;
                    next.to_string()
                }
            };

            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            if documents
                .get((domain, collection, key.as_str()))
                .map_err(io_err)?
                .is_some()
            {
                return Err(NodalError::Conflict(format!(
                    "document '{collection}/{key}' already exists"
                )));
            }

            let mut stored = document.clone();
            stored.insert("_key".to_string(), Value::String(key.clone()));
            stored.insert(
                "_id".to_string(),
                Value::String(format!("{collection}/{key}")),
            );
            let bytes = encode(&stored)?;
            documents
                .insert((domain, collection, key.as_str()), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(key)
    }

    fn update_fields(
        &self,
        domain: &str,
        collection: &str,
        key: &str,
        patch: &Document,
    ) -> Result<(), NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            let mut stored = match documents.get((domain, collection, key)).map_err(io_err)? {
                Some(guard) => decode(guard.value())?,
                None => {
                    return Err(NodalError::NotFound(format!(
                        "document '{collection}/{key}'"
                    )));
                }
            };
            for (field, value) in patch {
                // System identity fields are never patched.
                if field == "_key" || field == "_id" {
                    continue;
                }
                stored.insert(field.clone(), value.clone());
            }
            let bytes = encode(&stored)?;
            documents
                .insert((domain, collection, key), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn delete(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let existed;
        {
            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            existed = documents
                .remove((domain, collection, key))
                .map_err(io_err)?
                .is_some();
        }
        write_txn.commit().map_err(io_err)?;
        Ok(existed)
    }

    fn exists(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(DOCUMENTS).map_err(io_err)?;
        Ok(table.get((domain, collection, key)).map_err(io_err)?.is_some())
    }

    fn delete_collection(&self, domain: &str, name: &str) -> Result<bool, NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let existed;
        {
            let mut collections = write_txn.open_table(COLLECTIONS).map_err(io_err)?;
            existed = collections.remove((domain, name)).map_err(io_err)?.is_some();

            let mut documents = write_txn.open_table(DOCUMENTS).map_err(io_err)?;
            let mut doomed = Vec::new();
            for entry in documents.iter().map_err(io_err)? {
                let (key_guard, _) = entry.map_err(io_err)?;
                let (doc_domain, doc_collection, doc_key) = key_guard.value();
                if doc_domain == domain && doc_collection == name {
                    doomed.push((
                        doc_domain.to_string(),
                        doc_collection.to_string(),
                        doc_key.to_string(),
                    ));
                }
            }
            for (doc_domain, doc_collection, doc_key) in &doomed {
                documents
                    .remove((
                        doc_domain.as_str(),
                        doc_collection.as_str(),
                        doc_key.as_str(),
                    ))
                    .map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(existed)
    }

    fn ensure_edge_definition(
        &self,
        domain: &str,
        graph: &str,
        edge_collection: &str,
        from_collections: &[String],
        to_collections: &[String],
    ) -> Result<(), NodalError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let domains = write_txn.open_table(DOMAINS).map_err(io_err)?;
            if domains.get(domain).map_err(io_err)?.is_none() {
                return Err(NodalError::NotFound(format!("domain '{domain}'")));
            }

            // Collections referenced by the definition are created as needed.
            let mut collections = write_txn.open_table(COLLECTIONS).map_err(io_err)?;
            if collections
                .get((domain, edge_collection))
                .map_err(io_err)?
                .is_none()
            {
                collections
                    .insert((domain, edge_collection), true)
                    .map_err(io_err)?;
            }
            for vertex_collection in from_collections.iter().chain(to_collections) {
                if collections
                    .get((domain, vertex_collection.as_str()))
                    .map_err(io_err)?
                    .is_none()
                {
                    collections
                        .insert((domain, vertex_collection.as_str()), false)
                        .map_err(io_err)?;
                }
            }

            let payload = serde_json::to_vec(&(from_collections, to_collections))
                .map_err(|e| NodalError::Serialization(e.to_string()))?;
            let mut definitions = write_txn.open_table(EDGE_DEFINITIONS).map_err(io_err)?;
            definitions
                .insert((domain, graph, edge_collection), payload.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn traverse(
        &self,
        domain: &str,
        graph: &str,
        start_full_id: &str,
        direction: Direction,
    ) -> Result<TraversalResult, NodalError> {
        let definitions = self.edge_definitions(domain, graph)?;
        if definitions.is_empty() {
            return Err(NodalError::NotFound(format!("graph '{graph}'")));
        }
        let start = self
            .vertex_by_full_id(domain, start_full_id)?
            .ok_or_else(|| NodalError::NotFound(format!("start vertex '{start_full_id}'")))?;

        // BFS with global vertex uniqueness, start vertex first. Edge
        // collections are re-read per visited vertex; fine at the scale
        // an embedded backend serves.
        let mut vertices = vec![start];
        let mut visited: BTreeSet<String> = BTreeSet::new();
        visited.insert(start_full_id.to_string());
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start_full_id.to_string());

        while let Some(current) = queue.pop_front() {
            for (edge_collection, _, _) in &definitions {
                for edge in self.collection_documents(domain, edge_collection)? {
                    for next in next_vertices(&edge, &current, direction) {
                        if visited.insert(next.clone()) {
                            if let Some(doc) = self.vertex_by_full_id(domain, &next)? {
                                vertices.push(doc);
                            }
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        Ok(TraversalResult {
            vertices: Some(vertices),
        })
    }

    fn execute_query(
        &self,
        _domain: &str,
        query: &str,
        _bind_vars: &Document,
    ) -> Result<Vec<Document>, NodalError> {
        Err(NodalError::Configuration(format!(
            "redb store has no query language (got: {query})"
        )))
    }
}
