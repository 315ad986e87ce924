//! # nodal-core
//!
//! A mapping layer that lets application code treat schemaless documents
//! and their graph relationships as typed nodes and edges, delegating
//! persistence to a document-graph store consumed through the narrow
//! [`Store`] trait.
//!
//! The heart of the crate is the identity-resolution and reconciliation
//! engine:
//! - store coordinates (domain, collection, key) derived from bare keys,
//!   composite `"collection/key"` text, or other in-memory entities;
//! - entities without a known key reconciled against the store by exact
//!   match on their declared mandatory features;
//! - two entities combined into a deterministically-named edge;
//! - traversal results filtered into a stable, store-agnostic shape.
//!
//! Two store backends ship with the crate: a volatile, deterministic
//! [`MemoryStore`] and a disk-backed [`RedbStore`]. Everything behind the
//! trait — connections, authentication, wire protocol — is a store
//! concern, out of scope here.

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod edge;
pub mod graph;
pub mod ident;
pub mod node;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Identity & Configuration
// =============================================================================

pub use config::{Defaults, StoreConfig};
pub use ident::{Endpoint, Resolved, resolve, split_full_id};
pub use types::{Document, DocumentId, EDGE_MARKER, GRAPH_MARKER, NodalError, PRIVATE_PREFIX};

// =============================================================================
// RE-EXPORTS: Entities
// =============================================================================

pub use edge::{Edge, EdgeOptions, edge_naming, graph_name};
pub use node::{Handle, Node};

// =============================================================================
// RE-EXPORTS: Store & Traversal
// =============================================================================

pub use graph::{Direction, GraphView, TraversalList, TraversalResult, traversal_filter};
pub use store::{MemoryStore, RedbStore, Store};
