//! # Core Type Definitions
//!
//! This module contains the foundation types for the nodal mapping layer:
//! - Store coordinates (`DocumentId`)
//! - Schemaless document data (`Document`)
//! - Error types (`NodalError`)
//! - Naming markers shared by edge naming and graph registration
//!
//! ## Determinism Guarantees
//!
//! Everything that carries an ordering obligation (reconciliation
//! tie-breaks, probe iteration) flows through `BTreeMap`-backed store
//! state, so "first result in store iteration order" is stable.

use serde_json::Value;
use thiserror::Error;

// =============================================================================
// MARKERS
// =============================================================================

/// Separator used to derive an edge-collection name from two vertex
/// collection names. Two characters so it cannot collide with a single
/// underscore inside an ordinary collection name.
pub const EDGE_MARKER: &str = "__";

/// Prefix used to name the graph object automatically registered for an
/// edge collection.
pub const GRAPH_MARKER: &str = "g--";

/// Fields whose name starts with this prefix belong to the store, not to
/// the caller. They are stripped by `filter_data` unless explicitly kept.
pub const PRIVATE_PREFIX: char = '_';

// =============================================================================
// DOCUMENT
// =============================================================================

/// A schemaless document: field name to JSON value, insertion-ordered.
pub type Document = serde_json::Map<String, Value>;

// =============================================================================
// DOCUMENT ID
// =============================================================================

/// The semantic triple locating a document in the store.
///
/// The canonical textual form is `"<collection>/<key>"`; the domain never
/// appears in the text because the underlying store scopes every
/// collection operation by domain separately.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId {
    /// Domain (database) hint; `None` when it must come from context.
    pub domain: Option<String>,
    /// Collection holding the document.
    pub collection: String,
    /// Key within the collection. Empty means "let the store assign one";
    /// once assigned it is opaque and never invented locally.
    pub key: String,
}

impl DocumentId {
    /// Create an id from collection and key, with no domain hint.
    #[must_use]
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: None,
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Canonical `"<collection>/<key>"` text. Empty when the collection is
    /// unknown, because a bare key is not a usable address.
    #[must_use]
    pub fn full(&self) -> String {
        if self.collection.is_empty() {
            return String::new();
        }
        format!("{}/{}", self.collection, self.key)
    }
}

// =============================================================================
// NAME VALIDATION
// =============================================================================

/// Validate a domain or collection name.
///
/// A usable store name is non-empty and does not start with the reserved
/// `_` prefix. Violations are programmer errors and are raised eagerly.
pub fn check_store_name(name: &str) -> Result<(), NodalError> {
    if name.is_empty() {
        return Err(NodalError::Configuration(
            "domain/collection name is empty".to_string(),
        ));
    }
    if name.starts_with(PRIVATE_PREFIX) {
        return Err(NodalError::Configuration(format!(
            "name '{name}' looks like a reserved database name"
        )));
    }
    Ok(())
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the nodal mapping layer.
///
/// Side-effecting entity operations (`sync`, `upsave`, `delete`) swallow
/// store errors into boolean returns after logging; these variants surface
/// where a `Result` is the contract (construction, explicit store access).
#[derive(Debug, Error)]
pub enum NodalError {
    /// Malformed identifier or configuration: programmer error, raised at
    /// the boundary and never silently swallowed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store transport failed or the backend is unusable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A document, collection or domain does not exist where one was
    /// required.
    #[error("not found: {0}")]
    NotFound(String),

    /// A predefined key collided with an existing document.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred in a persistent backend.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_full_is_canonical() {
        let id = DocumentId::new("users", "42");
        assert_eq!(id.full(), "users/42");
    }

    #[test]
    fn document_id_without_collection_has_no_text_form() {
        let id = DocumentId::new("", "42");
        assert_eq!(id.full(), "");
    }

    #[test]
    fn empty_key_is_allowed_in_text_form() {
        // An empty key signals "let the store assign one" but the
        // collection half still addresses the collection.
        let id = DocumentId::new("users", "");
        assert_eq!(id.full(), "users/");
    }

    #[test]
    fn check_store_name_accepts_plain_names() {
        assert!(check_store_name("users").is_ok());
        assert!(check_store_name("users__orders").is_ok());
    }

    #[test]
    fn check_store_name_rejects_empty() {
        assert!(matches!(
            check_store_name(""),
            Err(NodalError::Configuration(_))
        ));
    }

    #[test]
    fn check_store_name_rejects_reserved_prefix() {
        assert!(matches!(
            check_store_name("_system"),
            Err(NodalError::Configuration(_))
        ));
    }
}
