//! # Store Backends
//!
//! The narrow contract the mapping layer consumes a document-graph store
//! through, plus the two bundled backends:
//! - `MemoryStore`: volatile, `BTreeMap`-backed, deterministic iteration
//! - `RedbStore`: disk-backed ACID storage over redb
//!
//! Everything behind this trait — connections, authentication, wire
//! protocol, query execution — is the store's business, not the mapping
//! layer's. Entity code only ever calls these methods.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::graph::{Direction, TraversalResult};
use crate::types::{Document, NodalError};
use serde_json::Value;

/// The minimal store contract consumed by nodes, edges and graph views.
///
/// All receivers are `&self`: backends use interior mutability (or, like
/// redb, transaction handles that only need a shared reference) so one
/// store instance can sit behind an `Arc` shared by many entity handles.
/// Serialization of writes is the backend's concern.
pub trait Store {
    /// Idempotent create-or-get of a domain (database).
    fn ensure_domain(&self, name: &str) -> Result<(), NodalError>;

    /// Idempotent create-or-get of a collection inside an existing domain.
    fn ensure_collection(&self, domain: &str, name: &str, is_edge: bool)
    -> Result<(), NodalError>;

    /// Fetch a document by key. `Ok(None)` when the document, collection
    /// or domain does not exist.
    fn get(&self, domain: &str, collection: &str, key: &str)
    -> Result<Option<Document>, NodalError>;

    /// Find documents matching the probe field-for-field. May return 0, 1
    /// or many documents, in the store's (stable) iteration order. An
    /// empty probe matches every document in the collection.
    fn find(
        &self,
        domain: &str,
        collection: &str,
        probe: &Document,
    ) -> Result<Vec<Document>, NodalError>;

    /// Insert a document, assigning a key unless one is predefined.
    /// Returns the key actually assigned by the store.
    fn insert(
        &self,
        domain: &str,
        collection: &str,
        document: &Document,
        predefined_key: Option<&str>,
    ) -> Result<String, NodalError>;

    /// Partial update: merge the patch fields into the stored document.
    fn update_fields(
        &self,
        domain: &str,
        collection: &str,
        key: &str,
        patch: &Document,
    ) -> Result<(), NodalError>;

    /// Delete a document. `Ok(false)` when it did not exist.
    fn delete(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError>;

    /// Whether a document with this key exists.
    fn exists(&self, domain: &str, collection: &str, key: &str) -> Result<bool, NodalError>;

    /// Drop a collection. `Ok(true)` only if it existed.
    fn delete_collection(&self, domain: &str, name: &str) -> Result<bool, NodalError>;

    /// Register (or refresh) a graph edge definition binding an edge
    /// collection to its vertex collections. Creates the collections and
    /// the graph as needed.
    fn ensure_edge_definition(
        &self,
        domain: &str,
        graph: &str,
        edge_collection: &str,
        from_collections: &[String],
        to_collections: &[String],
    ) -> Result<(), NodalError>;

    /// Breadth-first traversal over a registered graph with global vertex
    /// uniqueness. The start vertex is included in the raw result; callers
    /// filter it out via `traversal_filter`.
    fn traverse(
        &self,
        domain: &str,
        graph: &str,
        start_full_id: &str,
        direction: Direction,
    ) -> Result<TraversalResult, NodalError>;

    /// Execute a raw query — the escape hatch for anonymous multi-hop
    /// traversals when no persistent graph object exists. Backends without
    /// a query language return `NodalError::Configuration`.
    fn execute_query(
        &self,
        domain: &str,
        query: &str,
        bind_vars: &Document,
    ) -> Result<Vec<Document>, NodalError>;
}

// =============================================================================
// SHARED BACKEND HELPERS
// =============================================================================

/// Whether every probe field is present in the document with an equal
/// value. An empty probe matches everything.
pub(crate) fn matches_probe(document: &Document, probe: &Document) -> bool {
    probe
        .iter()
        .all(|(field, value)| document.get(field) == Some(value))
}

/// Edge endpoints reachable from `current` through one edge document.
pub(crate) fn next_vertices(edge: &Document, current: &str, direction: Direction) -> Vec<String> {
    let from = edge.get("_from").and_then(Value::as_str);
    let to = edge.get("_to").and_then(Value::as_str);
    let mut out = Vec::new();
    let outbound = direction != Direction::Inbound;
    let inbound = direction != Direction::Outbound;
    if outbound && from == Some(current) {
        if let Some(next) = to {
            out.push(next.to_string());
        }
    }
    if inbound && to == Some(current) {
        if let Some(next) = from {
            out.push(next.to_string());
        }
    }
    out
}
