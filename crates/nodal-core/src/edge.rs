//! # Edge Model
//!
//! An edge is a node with two endpoint references, a collection name
//! derived from the endpoints' collections, and two fields the store
//! requires on every edge document: `_from` and `_to`. Those two are
//! forced into the mandatory-feature set at construction and forced into
//! the kept private fields on every persist, so they survive the private
//! field filter that strips everything else starting with `_`.

use crate::config::{Defaults, StoreConfig};
use crate::ident::{Endpoint, Resolved, resolve};
use crate::node::{Handle, Node};
use crate::store::Store;
use crate::types::{Document, EDGE_MARKER, GRAPH_MARKER, NodalError};
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// NAMING
// =============================================================================

/// Derive edge-collection names from an ordered sequence of collection
/// names.
///
/// With `split_collections` (the default style), each adjacent pair gets
/// its own name: `["A","B","C"]` becomes `["A__B","B__C"]`. Without it,
/// the whole sequence collapses into one name, `["A__B__C"]`.
///
/// Fewer than two inputs yield a one-element result holding whatever
/// concatenation was possible: `["A"]` gives `["A"]`, an empty input
/// gives `[""]`. Compatibility quirk, kept as-is.
#[must_use]
pub fn edge_naming(collections: &[&str], split_collections: bool) -> Vec<String> {
    if !split_collections || collections.len() < 2 {
        return vec![collections.join(EDGE_MARKER)];
    }
    collections
        .windows(2)
        .map(|pair| pair.join(EDGE_MARKER))
        .collect()
}

/// The conventional graph name wrapping one edge collection.
#[must_use]
pub fn graph_name(edge_collection: &str) -> String {
    format!("{GRAPH_MARKER}{edge_collection}")
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Optional behaviors of edge construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeOptions {
    /// Register a graph edge definition binding the from-collection to the
    /// to-collection, under the graph named after the edge collection.
    pub auto_graph: bool,
    /// Probe for an existing document with the same `_from`/`_to` and
    /// adopt its key, so a later upsave updates instead of duplicating.
    pub prevent_duplicates: bool,
}

// =============================================================================
// EDGE
// =============================================================================

/// A relation between two documents, persisted as a document itself.
#[derive(Debug)]
pub struct Edge<S> {
    node: Node<S>,
    from_id: String,
    to_id: String,
    from_collection: String,
    to_collection: String,
}

impl<S: Store> Edge<S> {
    /// Build an edge between two endpoints.
    ///
    /// Endpoints resolve independently; their configurations merge with
    /// the to-side winning on collisions. The edge collection name is
    /// derived from the two endpoint collections and never set by the
    /// caller. The domain comes from the first of: the explicit argument,
    /// the merged configuration, the from-side, the to-side.
    ///
    /// Both endpoints must carry a full `"collection/key"` identity — a
    /// bare key cannot anchor an edge.
    pub fn link(
        store: Arc<S>,
        defaults: &Defaults,
        domain: Option<&str>,
        from: &Endpoint<'_, S>,
        to: &Endpoint<'_, S>,
        data: Document,
        key: &str,
        config: Option<&StoreConfig>,
        mandatory: &[&str],
        options: EdgeOptions,
    ) -> Result<Self, NodalError> {
        let from_res = resolve(from, config);
        let to_res = resolve(to, config);
        Self::endpoint_usable(&from_res, "from")?;
        Self::endpoint_usable(&to_res, "to")?;

        let merged = from_res.config.merged(&to_res.config);
        let domain = domain
            .map(str::to_owned)
            .or_else(|| merged.domain.clone())
            .or_else(|| Some(from_res.domain.clone()).filter(|d| !d.is_empty()))
            .or_else(|| Some(to_res.domain.clone()).filter(|d| !d.is_empty()))
            .ok_or_else(|| {
                NodalError::Configuration(
                    "no domain for edge: pass one explicitly or configure the endpoints"
                        .to_string(),
                )
            })?;

        let edge_collection = edge_naming(
            &[from_res.collection.as_str(), to_res.collection.as_str()],
            true,
        )
        .into_iter()
        .next()
        .unwrap_or_default();

        let mut edge_config = merged;
        edge_config.domain = Some(domain.clone());
        edge_config.collection = Some(edge_collection.clone());
        edge_config.edge = Some(true);

        let mut mandatory_with_endpoints = vec!["_from", "_to"];
        for field in mandatory {
            if !mandatory_with_endpoints.contains(field) {
                mandatory_with_endpoints.push(*field);
            }
        }

        let handle = Handle::connect(store, edge_config, defaults)?;
        let mut node = Node::create(handle, data, key, &mandatory_with_endpoints)?;
        node.set_field("_from", Value::String(from_res.full_id.clone()));
        node.set_field("_to", Value::String(to_res.full_id.clone()));

        let mut edge = Self {
            node,
            from_id: from_res.full_id,
            to_id: to_res.full_id,
            from_collection: from_res.collection,
            to_collection: to_res.collection,
        };

        if options.prevent_duplicates && edge.node.key().is_empty() {
            edge.adopt_existing()?;
        }
        if options.auto_graph {
            edge.node.handle().store().ensure_edge_definition(
                &domain,
                &graph_name(&edge_collection),
                &edge_collection,
                &[edge.from_collection.clone()],
                &[edge.to_collection.clone()],
            )?;
        }
        Ok(edge)
    }

    fn endpoint_usable(resolved: &Resolved, side: &str) -> Result<(), NodalError> {
        if resolved.full_id.is_empty() || resolved.collection.is_empty() {
            return Err(NodalError::Configuration(format!(
                "edge {side}-endpoint has no resolvable collection/key identity"
            )));
        }
        Ok(())
    }

    /// Probe for a document with the same endpoints and adopt its key.
    fn adopt_existing(&mut self) -> Result<(), NodalError> {
        let matches = self.node.handle().store().find(
            self.node.handle().domain(),
            self.node.handle().collection(),
            &self.endpoint_probe(),
        )?;
        if let Some(existing) = matches.first() {
            if let Some(key) = existing.get("_key").and_then(Value::as_str) {
                let key = key.to_string();
                self.node.set_key(&key)?;
            }
        }
        Ok(())
    }

    fn endpoint_probe(&self) -> Document {
        let mut probe = Document::new();
        probe.insert("_from".to_string(), Value::String(self.from_id.clone()));
        probe.insert("_to".to_string(), Value::String(self.to_id.clone()));
        probe
    }

    /// Full id of the from-endpoint.
    #[must_use]
    pub fn from_id(&self) -> &str {
        &self.from_id
    }

    /// Full id of the to-endpoint.
    #[must_use]
    pub fn to_id(&self) -> &str {
        &self.to_id
    }

    /// The underlying node.
    #[must_use]
    pub fn node(&self) -> &Node<S> {
        &self.node
    }

    /// Mutable access to the underlying node.
    pub fn node_mut(&mut self) -> &mut Node<S> {
        &mut self.node
    }

    /// The edge document's key; empty until assigned or adopted.
    #[must_use]
    pub fn key(&self) -> String {
        self.node.key()
    }

    /// Canonical `"<edge-collection>/<key>"` text.
    #[must_use]
    pub fn full_key(&self) -> String {
        self.node.full_key()
    }

    /// The data mapping minus store-owned fields — except `_from` and
    /// `_to`, which always survive, whatever `keep_fields` says.
    #[must_use]
    pub fn filter_data(&self, keep_fields: &[&str]) -> Document {
        let mut keep = vec!["_from", "_to"];
        for field in keep_fields {
            if !keep.contains(field) {
                keep.push(*field);
            }
        }
        self.node.filter_data(&keep)
    }

    /// Reconcile with the store; see `Node::sync`.
    pub fn sync(&mut self) -> bool {
        self.node.sync()
    }

    /// Insert-or-update the edge document. `_from` and `_to` are always
    /// kept in the persisted payload, whatever the caller lists.
    pub fn upsave(&mut self, keep_private_fields: &[&str], sync_first: bool) -> bool {
        let mut keep = vec!["_from", "_to"];
        for field in keep_private_fields {
            if !keep.contains(field) {
                keep.push(*field);
            }
        }
        self.node.upsave(&keep, sync_first)
    }

    /// Delete the edge document.
    ///
    /// With no key known, the document matching this edge's own
    /// `_from`/`_to` is looked up and deleted. The lookup-then-delete pair
    /// is not atomic against concurrent deletes.
    pub fn delete(&mut self) -> bool {
        if !self.node.key().is_empty() {
            return self.node.delete();
        }
        let matches = match self.node.handle().store().find(
            self.node.handle().domain(),
            self.node.handle().collection(),
            &self.endpoint_probe(),
        ) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(from = %self.from_id, to = %self.to_id, error = %e,
                    "could not look up edge document for deletion");
                return false;
            }
        };
        let Some(key) = matches
            .first()
            .and_then(|doc| doc.get("_key").and_then(Value::as_str))
            .map(str::to_owned)
        else {
            return false;
        };
        if let Err(e) = self.node.set_key(&key) {
            tracing::warn!(key = %key, error = %e, "could not adopt edge key for deletion");
            return false;
        }
        self.node.delete()
    }
}

// =============================================================================
// TESTS
// =============================================================================
