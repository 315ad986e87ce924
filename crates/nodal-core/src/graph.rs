//! # Graph Traversal
//!
//! The store-agnostic traversal shapes and the pure filter that turns a
//! raw traversal result into a stable output: origin excluded, store
//! order preserved, no re-sorting. Deduplication is the store's job
//! (global vertex uniqueness during traversal), not the filter's.

use crate::store::Store;
use crate::types::{Document, NodalError, check_store_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// TRAVERSAL SHAPES
// =============================================================================

/// Traversal direction relative to the start vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges from `_from` to `_to`.
    #[default]
    Outbound,
    /// Follow edges from `_to` to `_from`.
    Inbound,
    /// Follow edges both ways.
    Any,
}

/// Raw traversal result as produced by the store.
///
/// The `vertices` field is tagged rather than shape-probed: a store that
/// returns no vertex list at all is a diagnosable condition, not a typo
/// in a dynamic mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalResult {
    /// Visited vertices in traversal order, start vertex included.
    /// `None` when the store produced no vertex list at all.
    pub vertices: Option<Vec<Document>>,
}

/// Filtered traversal output: the visited documents minus the origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalList {
    /// Visited documents, store traversal order preserved.
    pub list: Vec<Document>,
}

// =============================================================================
// FILTER
// =============================================================================

/// Filter a raw traversal result into the stable output shape.
///
/// Keeps every vertex carrying an `_id` different from `exclude_full_id`,
/// in input order. A missing `vertices` field is non-fatal: it yields an
/// empty list and a warning, never an error.
#[must_use]
pub fn traversal_filter(raw: &TraversalResult, exclude_full_id: &str) -> TraversalList {
    let Some(vertices) = &raw.vertices else {
        tracing::warn!("traversal result does not contain a vertices field");
        return TraversalList::default();
    };

    let list = vertices
        .iter()
        .filter(|vertex| match vertex.get("_id").and_then(Value::as_str) {
            Some(id) => id != exclude_full_id,
            None => false,
        })
        .cloned()
        .collect();

    TraversalList { list }
}

// =============================================================================
// GRAPH VIEW
// =============================================================================

/// A thin front over one named graph in one domain.
///
/// Graph operations act on a single domain; discriminating relations
/// across domains would need the domain encoded in the documents
/// themselves.
#[derive(Debug)]
pub struct GraphView<S> {
    store: Arc<S>,
    domain: String,
    graph: String,
}

impl<S: Store> GraphView<S> {
    /// Open a view on a named graph.
    pub fn new(
        store: Arc<S>,
        domain: impl Into<String>,
        graph: impl Into<String>,
    ) -> Result<Self, NodalError> {
        let domain = domain.into();
        let graph = graph.into();
        check_store_name(&domain)?;
        if graph.is_empty() {
            return Err(NodalError::Configuration("graph name is empty".to_string()));
        }
        Ok(Self {
            store,
            domain,
            graph,
        })
    }

    /// The domain this view acts on.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The graph name this view traverses.
    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Outbound neighbors reachable from a full `"collection/key"` id.
    ///
    /// Empty start id or store failure degrade to an empty list so batch
    /// callers can keep going.
    #[must_use]
    pub fn outbounds_from(&self, full_id: &str) -> TraversalList {
        self.traverse_from(full_id, Direction::Outbound)
    }

    /// Neighbors reachable from a full id in the given direction.
    #[must_use]
    pub fn traverse_from(&self, full_id: &str, direction: Direction) -> TraversalList {
        if full_id.is_empty() {
            return TraversalList::default();
        }
        match self
            .store
            .traverse(&self.domain, &self.graph, full_id, direction)
        {
            Ok(raw) => traversal_filter(&raw, full_id),
            Err(e) => {
                tracing::warn!(graph = %self.graph, start = %full_id, error = %e,
                    "could not traverse graph");
                TraversalList::default()
            }
        }
    }

    /// Anonymous multi-hop traversal through the store's query interface,
    /// for stores where no persistent graph object exists.
    ///
    /// Builds a depth-bounded outbound query over the named edge
    /// collections. Backends without a query language make this degrade
    /// to an empty list with a warning.
    #[must_use]
    pub fn outbounds_via_query(
        &self,
        full_id: &str,
        edge_collections: &[String],
        depth: usize,
    ) -> TraversalList {
        if full_id.is_empty() || edge_collections.is_empty() {
            return TraversalList::default();
        }
        let query = format!(
            "FOR v IN 1..{depth} OUTBOUND @start {} RETURN v",
            edge_collections.join(", ")
        );
        let mut bind_vars = Document::new();
        bind_vars.insert("start".to_string(), Value::String(full_id.to_string()));

        match self.store.execute_query(&self.domain, &query, &bind_vars) {
            Ok(documents) => {
                let raw = TraversalResult {
                    vertices: Some(documents),
                };
                traversal_filter(&raw, full_id)
            }
            Err(e) => {
                tracing::warn!(domain = %self.domain, error = %e,
                    "anonymous traversal query failed");
                TraversalList::default()
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
