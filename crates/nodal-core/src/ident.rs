//! # Identifier Resolver
//!
//! Derives store coordinates `(collection, domain, full id, config)` from
//! the heterogeneous inputs callers hand us: bare keys, composite
//! `"collection/key"` text, or references to in-memory entities.
//!
//! Resolution never fails: unusable input yields an all-empty result so
//! batch callers can keep going and decide later whether context fills
//! the gaps.

use crate::config::StoreConfig;
use crate::node::Node;
use crate::store::Store;

// =============================================================================
// SPLITTING
// =============================================================================

/// Split identifier text into `(collection, key)`.
///
/// Exactly one `/` populates both halves. No `/` means the collection is
/// unknown and the whole text is the key. More than one `/` is ambiguous:
/// the collection is deliberately left empty and the whole text is kept
/// as the key, matching the historical behavior rather than guessing at
/// a first-segment interpretation.
#[must_use]
pub fn split_full_id(text: &str) -> (String, String) {
    let segments: Vec<&str> = text.split('/').collect();
    if segments.len() == 2 {
        (segments[0].to_string(), segments[1].to_string())
    } else {
        (String::new(), text.to_string())
    }
}

// =============================================================================
// ENDPOINT
// =============================================================================

/// One input to identifier resolution: raw text or an entity reference.
#[derive(Debug)]
pub enum Endpoint<'a, S> {
    /// A bare key or composite `"collection/key"` text.
    Text(&'a str),
    /// A reference to an in-memory entity whose resolved identity and
    /// configuration are borrowed (and copied) from.
    Node(&'a Node<S>),
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// The outcome of resolving one endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    /// Collection name; empty when it must come from context.
    pub collection: String,
    /// Domain hint; empty when none was derivable.
    pub domain: String,
    /// Full `"collection/key"` text; empty when the input was a bare key.
    pub full_id: String,
    /// Configuration copied from the source entity or the override. A
    /// value copy: mutating it never affects the source entity.
    pub config: StoreConfig,
}

/// Resolve one endpoint into store coordinates.
///
/// Composite text contributes collection and full id; a bare key
/// contributes nothing but itself; an entity reference contributes its
/// resolved identity plus a copy of its configuration.
///
/// When `override_config` is supplied it replaces the derived
/// configuration outright, and its `domain`/`collection` take final
/// precedence over anything read from the entity reference.
#[must_use]
pub fn resolve<S: Store>(
    endpoint: &Endpoint<'_, S>,
    override_config: Option<&StoreConfig>,
) -> Resolved {
    let mut out = Resolved::default();

    match endpoint {
        Endpoint::Text(text) => {
            let (collection, _) = split_full_id(text);
            if !collection.is_empty() {
                out.collection = collection;
                out.full_id = (*text).to_string();
            }
        }
        Endpoint::Node(node) => {
            out.full_id = node.full_key();
            out.collection = node.handle().collection().to_string();
            out.domain = node.handle().domain().to_string();
            out.config = node.handle().config().clone();
        }
    }

    if let Some(over) = override_config {
        out.config = over.clone();
        if let Some(domain) = &over.domain {
            out.domain.clone_from(domain);
        }
        if let Some(collection) = &over.collection {
            out.collection.clone_from(collection);
        }
    }

    out
}

// =============================================================================
// TESTS
// =============================================================================
