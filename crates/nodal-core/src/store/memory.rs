//! # In-Memory Store
//!
//! A volatile, `BTreeMap`-backed store backend. Iteration order is the
//! key order of the maps, so `find` results — and therefore the
//! reconciliation "first match" tie-break — are deterministic.
//!
//! Interior mutability: one `RwLock` around the whole store state. The
//! mapping layer is synchronous per call, so a single writer lock models
//! the write serialization a real backend would provide.

use crate::graph::{Direction, TraversalResult};
use crate::store::{Store, matches_probe, next_vertices};
use crate::types::{Document, NodalError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// STATE
// =============================================================================

/// A graph edge definition: which vertex collections an edge collection
/// connects.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EdgeDefinition {
    edge_collection: String,
    from_collections: Vec<String>,
    to_collections: Vec<String>,
}

#[derive(Debug, Default)]
struct CollectionData {
    #[allow(dead_code)]
    is_edge: bool,
    documents: BTreeMap<String, Document>,
}

#[derive(Debug, Default)]
struct DomainData {
    collections: BTreeMap<String, CollectionData>,
    /// Graph name -> edge definitions registered under it.
    graphs: BTreeMap<String, Vec<EdgeDefinition>>,
}

#[derive(Debug, Default)]
struct Inner {
    domains: BTreeMap<String, DomainData>,
    /// Monotonic counter for store-assigned keys.
    next_key: u64,
}

/// The in-memory store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, NodalError> {
        self.inner
            .read()
            .map_err(|_| NodalError::StoreUnavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, NodalError> {
        self.inner
            .write()
            .map_err(|_| NodalError::StoreUnavailable("memory store lock poisoned".to_string()))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Look up a vertex document by its full `"collection/key"` id.
fn vertex_by_full_id<'a>(domain: &'a DomainData, full_id: &str) -> Option<&'a Document> {
    let (collection, key) = full_id.split_once('/')?;
    domain.collections.get(collection)?.documents.get(key)
}

// =============================================================================
// STORE IMPLEMENTATION
// =============================================================================

impl Store for MemoryStore {
    fn ensure_domain(&self, name: &str) -> Result<(), NodalError> {
        let mut inner = self.write()?;
        inner.domains.entry(name.to_string()).or_default();
        Ok(())
    }

    fn ensure_collection(
        &self,
        domain: &str,
        name: &str,
        is_edge: bool,
    ) -> Result<(), NodalError> {
        let mut inner = self.write()?;
        let domain_data = inner
            .domains
            .get_mut(domain)
            .ok_or_else(|| NodalError::NotFound(format!("domain '{domain}'")))?;
        domain_data
            .collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionData {
                is_edge,
                documents: BTreeMap::new(),
            });
        Ok(())
    }

    fn get(
        &self,
        domain: &str,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, NodalError> {
        let inner = self.read()?;
        Ok(inner
            .domains
            .get(domain)
            .and_then(|d| d.collections.get(collection))
            .and_then(|c| c.documents.get(key))
            .cloned())
    }

    fn find(
        &self,
        domain: &str,
        collection: &str,
        probe: &Document,
    ) -> Result<Vec<Document>, NodalError> {
        let inner = self.read()?;
        let Some(collection_data) = inner
            .domains
            .get(domain)
            .and_then(|d| d.collections.get(collection))
        else {
            return Ok(Vec::new());
        };
        Ok(collection_data
            .documents
            .values()
            .filter(|doc| matches_probe(doc, probe))
            .cloned()
            .collect())
    }

    fn insert(
        &self,
        domain: &str,
        collection: &str,
        document: &Document,
        predefined_key: Option<&str>,
    ) -> Result<String, NodalError> {
        let mut inner = self.write()?;
        let key = match predefined_key {
            Some(k) => k.to_string(),
            None => {
                inner.next_key += 1;
                inner.next_key.to_string()
            }
        };
        let collection_data = inner
            .domains
            .get_mut(domain)
            .ok_or_else(|| NodalError::NotFound(format!("domain '{domain}'")))?
            .collections
            .get_mut(collection)
            .ok_or_else(|| NodalError::NotFound(format!("collection '{collection}'")))?;
        if collection_data.documents.contains_key(&key) {
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
        collection_data.documents.insert(key.clone(), stored);
        Ok(key)
    }

    fn update_fields(
        &self,
        domain: &str,
        collection: &str,
        key: &str,
        patch: &Document,
    ) -> Result<(), NodalError> {
        let mut inner = self.write()?;
        let document = inner
            .domains
            .get_mut(domain)
            .and_then(|d| d.collections.get_mut(collection))
            .and_then(|c| c.documents.get_mut(key))
            .ok_or_else(|| NodalError::NotFound(format!("document '{collection}/{key}'")))?;
        for (field, value) in patch {
            // System identity fields are never patched.
            if field == "_key" || field == "_id" {
                continue;
            }
            document.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError> {
        let mut inner = self.write()?;
        Ok(inner
            .domains
            .get_mut(domain)
            .and_then(|d| d.collections.get_mut(collection))
            .and_then(|c| c.documents.remove(key))
            .is_some())
    }

    fn exists(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError> {
        let inner = self.read()?;
        Ok(inner
            .domains
            .get(domain)
            .and_then(|d| d.collections.get(collection))
            .is_some_and(|c| c.documents.contains_key(key)))
    }

    fn delete_collection(&self, domain: &str, name: &str) -> Result<bool, NodalError> {
        let mut inner = self.write()?;
        Ok(inner
            .domains
            .get_mut(domain)
            .and_then(|d| d.collections.remove(name))
            .is_some())
    }

    fn ensure_edge_definition(
        &self,
        domain: &str,
        graph: &str,
        edge_collection: &str,
        from_collections: &[String],
        to_collections: &[String],
    ) -> Result<(), NodalError> {
        let mut inner = self.write()?;
        let domain_data = inner
            .domains
            .get_mut(domain)
            .ok_or_else(|| NodalError::NotFound(format!("domain '{domain}'")))?;

        // Collections referenced by the definition are created as needed.
        domain_data
            .collections
            .entry(edge_collection.to_string())
            .or_insert_with(|| CollectionData {
                is_edge: true,
                documents: BTreeMap::new(),
            });
        for vertex_collection in from_collections.iter().chain(to_collections) {
            domain_data
                .collections
                .entry(vertex_collection.clone())
                .or_default();
        }

        let definition = EdgeDefinition {
            edge_collection: edge_collection.to_string(),
            from_collections: from_collections.to_vec(),
            to_collections: to_collections.to_vec(),
        };
        let definitions = domain_data.graphs.entry(graph.to_string()).or_default();
        match definitions
            .iter_mut()
            .find(|d| d.edge_collection == edge_collection)
        {
            Some(existing) => *existing = definition,
            None => definitions.push(definition),
        }
        Ok(())
    }

    fn traverse(
        &self,
        domain: &str,
        graph: &str,
        start_full_id: &str,
        direction: Direction,
    ) -> Result<TraversalResult, NodalError> {
        let inner = self.read()?;
        let domain_data = inner
            .domains
            .get(domain)
            .ok_or_else(|| NodalError::NotFound(format!("domain '{domain}'")))?;
        let definitions = domain_data
            .graphs
            .get(graph)
            .ok_or_else(|| NodalError::NotFound(format!("graph '{graph}'")))?;
        let start = vertex_by_full_id(domain_data, start_full_id)
            .ok_or_else(|| NodalError::NotFound(format!("start vertex '{start_full_id}'")))?;

        // BFS with global vertex uniqueness: each vertex is visited once,
        // in discovery order, start vertex first.
        let mut vertices = vec![start.clone()];
        let mut visited: BTreeSet<String> = BTreeSet::new();
        visited.insert(start_full_id.to_string());
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start_full_id.to_string());

        while let Some(current) = queue.pop_front() {
            for definition in definitions {
                let Some(edge_collection) =
                    domain_data.collections.get(&definition.edge_collection)
                else {
                    continue;
                };
                for edge in edge_collection.documents.values() {
                    for next in next_vertices(edge, &current, direction) {
                        if visited.insert(next.clone()) {
                            if let Some(doc) = vertex_by_full_id(domain_data, &next) {
                                vertices.push(doc.clone());
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
            "memory store has no query language (got: {query})"
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================
