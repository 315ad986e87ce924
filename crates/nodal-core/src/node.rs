//! # Entity (Node) Model
//!
//! A `Node` owns a schemaless data mapping, the set of mandatory
//! features that shape it, and an exclusively-owned store handle. Its
//! lifecycle: created in memory with arbitrary data, optionally
//! reconciled against the store (`sync`), persisted (`upsave`),
//! optionally deleted. A node never auto-deletes.
//!
//! ## Failure semantics
//!
//! `sync`, `upsave` and `delete` report store failures as `false` and
//! restore the entity to its pre-call snapshot, so batch callers can
//! keep processing other entities. The swallowed error is logged.
//!
//! ## Concurrency hazard (documented, not hidden)
//!
//! `sync`-then-`upsave` and the existence-check inside `upsave` are
//! read-then-write sequences with no transaction around them. Concurrent
//! callers reconciling the same logical entity can race into duplicate
//! inserts. The mapping layer does not lock around the store; a backend
//! with conditional writes is the place to close the race.

use crate::config::{Defaults, StoreConfig};
use crate::ident::split_full_id;
use crate::store::Store;
use crate::types::{Document, NodalError, PRIVATE_PREFIX, check_store_name};
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// HANDLE
// =============================================================================

/// One entity's connection to the store: a shared store instance plus
/// this entity's own configuration and current (domain, collection).
///
/// The (domain, collection) pair is mutable single-owner state. Handles
/// are not shared between entities — cloning one for a new entity copies
/// the coordinates, so switching collection on the clone never touches
/// the source.
#[derive(Debug)]
pub struct Handle<S> {
    store: Arc<S>,
    config: StoreConfig,
    domain: String,
    collection: String,
}

impl<S> Clone for Handle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            domain: self.domain.clone(),
            collection: self.collection.clone(),
        }
    }
}

impl<S: Store> Handle<S> {
    /// Build a handle from a configuration.
    ///
    /// Applies the injected process defaults, then ensures the configured
    /// domain and collection exist. Field assignment stays pure; the
    /// store round-trips happen here, visibly, and nowhere else.
    pub fn connect(
        store: Arc<S>,
        config: StoreConfig,
        defaults: &Defaults,
    ) -> Result<Self, NodalError> {
        let config = config.with_defaults(defaults);
        let mut handle = Self {
            store,
            config,
            domain: String::new(),
            collection: String::new(),
        };
        if let Some(domain) = handle.config.domain.clone() {
            handle.ensure_domain(&domain)?;
            if let Some(collection) = handle.config.collection.clone() {
                let is_edge = handle.config.is_edge();
                handle.switch_collection(&collection, is_edge)?;
            }
        }
        Ok(handle)
    }

    /// Create-or-get a domain and make it current.
    pub fn ensure_domain(&mut self, name: &str) -> Result<(), NodalError> {
        check_store_name(name)?;
        self.store.ensure_domain(name)?;
        self.domain = name.to_string();
        Ok(())
    }

    /// Create-or-get a collection in the current domain and make it
    /// current. This is the explicit, visible mutation of the handle's
    /// collection state.
    pub fn switch_collection(&mut self, name: &str, is_edge: bool) -> Result<(), NodalError> {
        if self.domain.is_empty() {
            return Err(NodalError::Configuration(
                "cannot switch collection without a current domain".to_string(),
            ));
        }
        if name == self.collection {
            return Ok(());
        }
        check_store_name(name)?;
        self.store.ensure_collection(&self.domain, name, is_edge)?;
        self.collection = name.to_string();
        Ok(())
    }

    /// Drop the current collection. `true` only if it existed.
    pub fn delete_collection(&mut self) -> Result<bool, NodalError> {
        if self.domain.is_empty() || self.collection.is_empty() {
            return Ok(false);
        }
        let existed = self.store.delete_collection(&self.domain, &self.collection)?;
        self.collection.clear();
        Ok(existed)
    }

    /// The shared store instance.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A clone of the shared store reference, for building sibling
    /// handles.
    #[must_use]
    pub fn store_arc(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// This entity's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current domain name; empty when none is bound.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Current collection name; empty when none is bound.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

// =============================================================================
// NODE
// =============================================================================

/// An in-memory representation of one document plus its identity and
/// required-field contract.
#[derive(Debug)]
pub struct Node<S> {
    handle: Handle<S>,
    data: Document,
    mandatory: Vec<String>,
}

impl<S: Store> Node<S> {
    /// Create a node in memory.
    ///
    /// Mandatory features absent from `data` are filled with `""`. An
    /// explicit `key` takes precedence over a `_key` field inside `data`;
    /// a key containing `/` re-derives the collection from its first
    /// half.
    pub fn create(
        handle: Handle<S>,
        data: Document,
        key: &str,
        mandatory: &[&str],
    ) -> Result<Self, NodalError> {
        let mut node = Self {
            handle,
            data: Document::new(),
            mandatory: mandatory.iter().map(|f| (*f).to_string()).collect(),
        };
        node.set_data(data);
        if !key.is_empty() {
            node.set_key(key)?;
        }
        Ok(node)
    }

    /// Create a node and, when its key is already known, overlay the
    /// constructor data on top of the stored document.
    ///
    /// A store failure during the fetch leaves the node with its local
    /// data only; construction itself still succeeds.
    pub fn fetch(
        handle: Handle<S>,
        data: Document,
        key: &str,
        mandatory: &[&str],
    ) -> Result<Self, NodalError> {
        let overlay = data.clone();
        let mut node = Self::create(handle, data, key, mandatory)?;
        let current = node.key();
        if current.is_empty() {
            return Ok(node);
        }
        match node
            .handle
            .store()
            .get(node.handle.domain(), node.handle.collection(), &current)
        {
            Ok(Some(stored)) => {
                node.set_data(stored);
                for (field, value) in overlay {
                    node.data.insert(field, value);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(collection = %node.handle.collection(), key = %current,
                    error = %e, "could not fetch stored document, keeping local data");
            }
        }
        Ok(node)
    }

    /// Replace the data mapping, then re-assert the mandatory-feature
    /// contract. An empty replacement keeps the current data (but still
    /// fills mandatory fields).
    pub fn set_data(&mut self, data: Document) {
        if !data.is_empty() {
            self.data = data;
        }
        for field in &self.mandatory {
            if !self.data.contains_key(field) {
                self.data
                    .insert(field.clone(), Value::String(String::new()));
            }
        }
    }

    /// The data mapping.
    #[must_use]
    pub fn data(&self) -> &Document {
        &self.data
    }

    /// Mutable access to the data mapping.
    pub fn data_mut(&mut self) -> &mut Document {
        &mut self.data
    }

    /// Set one field, chainable.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.data.insert(name.into(), value);
        self
    }

    /// The declared mandatory features.
    #[must_use]
    pub fn mandatory(&self) -> &[String] {
        &self.mandatory
    }

    /// The store handle.
    #[must_use]
    pub fn handle(&self) -> &Handle<S> {
        &self.handle
    }

    /// Mutable access to the store handle.
    pub fn handle_mut(&mut self) -> &mut Handle<S> {
        &mut self.handle
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    /// The node's key; empty when the store has not assigned one yet.
    #[must_use]
    pub fn key(&self) -> String {
        self.data
            .get("_key")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    }

    /// Set the node's key.
    ///
    /// An empty key is never set, so a new node keeps signalling "let the
    /// store assign one". A key of the form `"collection/key"` re-derives
    /// the collection from its first half before storing the key half.
    pub fn set_key(&mut self, new_key: &str) -> Result<(), NodalError> {
        if new_key.is_empty() {
            return Ok(());
        }
        let (collection, key) = split_full_id(new_key);
        if collection.is_empty() {
            self.data
                .insert("_key".to_string(), Value::String(new_key.to_string()));
        } else {
            let is_edge = self.handle.config().is_edge();
            self.handle.switch_collection(&collection, is_edge)?;
            self.data.insert("_key".to_string(), Value::String(key));
        }
        Ok(())
    }

    /// Canonical `"<collection>/<key>"` text; empty when no collection is
    /// bound.
    #[must_use]
    pub fn full_key(&self) -> String {
        if self.handle.collection().is_empty() {
            return String::new();
        }
        format!("{}/{}", self.handle.collection(), self.key())
    }

    // =========================================================================
    // FILTERING
    // =========================================================================

    /// The data mapping minus store-owned fields.
    ///
    /// Drops every field whose name starts with the private marker `_`
    /// (and unnamed fields), except those explicitly listed in
    /// `keep_fields`.
    #[must_use]
    pub fn filter_data(&self, keep_fields: &[&str]) -> Document {
        self.data
            .iter()
            .filter(|(name, _)| {
                !name.is_empty()
                    && (!name.starts_with(PRIVATE_PREFIX) || keep_fields.contains(&name.as_str()))
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Reconcile this node with the store's view — best-effort identity
    /// match.
    ///
    /// Without a key, the store is probed for documents matching the
    /// currently-set mandatory features exactly; the first match in store
    /// iteration order is adopted (more than one match is logged, not
    /// failed). With a key — prior or adopted — the stored document is
    /// merged in by additive overwrite: stored fields win, local-only
    /// fields survive. If no identity could be established the node stays
    /// exactly as constructed; `sync` never creates a record.
    ///
    /// Returns `false` (and restores the pre-call data) on store failure.
    pub fn sync(&mut self) -> bool {
        if self.handle.domain().is_empty() || self.handle.collection().is_empty() {
            return false;
        }
        let snapshot = self.data.clone();
        match self.try_sync() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(collection = %self.handle.collection(), error = %e,
                    "sync failed, local data left untouched");
                self.data = snapshot;
                false
            }
        }
    }

    fn try_sync(&mut self) -> Result<(), NodalError> {
        if self.key().is_empty() {
            let mut probe = Document::new();
            for field in &self.mandatory {
                if let Some(value) = self.data.get(field) {
                    probe.insert(field.clone(), value.clone());
                }
            }
            let matches =
                self.handle
                    .store()
                    .find(self.handle.domain(), self.handle.collection(), &probe)?;
            if matches.len() > 1 {
                tracing::warn!(collection = %self.handle.collection(),
                    candidates = matches.len(),
                    "ambiguous reconciliation match, adopting the first result");
            }
            if let Some(first) = matches.first() {
                if let Some(key) = first.get("_key").and_then(Value::as_str) {
                    let key = key.to_string();
                    self.set_key(&key)?;
                }
            }
        }

        let key = self.key();
        if key.is_empty() {
            // No identity could be established; stay as constructed.
            return Ok(());
        }
        if let Some(stored) =
            self.handle
                .store()
                .get(self.handle.domain(), self.handle.collection(), &key)?
        {
            for (field, value) in stored {
                self.data.insert(field, value);
            }
        }
        Ok(())
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Insert-or-update this node's filtered data.
    ///
    /// Without a key the payload is inserted and the store-assigned key
    /// adopted. With a key, an existing document gets a partial update of
    /// the filtered payload; a missing one gets the full unfiltered local
    /// data inserted under the predefined key (then the key the store
    /// confirms is adopted, in case it normalized it).
    ///
    /// Returns `false` — with the data restored to its pre-call snapshot
    /// — on any store error.
    pub fn upsave(&mut self, keep_private_fields: &[&str], sync_first: bool) -> bool {
        if self.handle.domain().is_empty() || self.handle.collection().is_empty() {
            return false;
        }
        if sync_first && !self.sync() {
            return false;
        }
        let snapshot = self.data.clone();
        match self.try_upsave(keep_private_fields) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(collection = %self.handle.collection(), error = %e,
                    "upsave failed, local data left untouched");
                self.data = snapshot;
                false
            }
        }
    }

    fn try_upsave(&mut self, keep_private_fields: &[&str]) -> Result<(), NodalError> {
        let payload = self.filter_data(keep_private_fields);
        let domain = self.handle.domain().to_string();
        let collection = self.handle.collection().to_string();
        let key = self.key();

        if key.is_empty() {
            let assigned = self
                .handle
                .store()
                .insert(&domain, &collection, &payload, None)?;
            self.set_key(&assigned)?;
        } else if self.handle.store().exists(&domain, &collection, &key)? {
            self.handle
                .store()
                .update_fields(&domain, &collection, &key, &payload)?;
        } else {
            let assigned =
                self.handle
                    .store()
                    .insert(&domain, &collection, &self.data, Some(&key))?;
            self.set_key(&assigned)?;
        }
        Ok(())
    }

    /// Delete this node's document. Caller-driven only — nothing in the
    /// mapping layer deletes a node as a side effect.
    ///
    /// Returns `false` when no key is known or on store error.
    pub fn delete(&mut self) -> bool {
        let key = self.key();
        if key.is_empty() || self.handle.domain().is_empty() || self.handle.collection().is_empty()
        {
            return false;
        }
        match self
            .handle
            .store()
            .delete(self.handle.domain(), self.handle.collection(), &key)
        {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(collection = %self.handle.collection(), key = %key,
                    error = %e, "delete failed");
                false
            }
        }
    }

    /// The `_id` of every document in this node's collection, in store
    /// order, optionally truncated.
    #[must_use]
    pub fn all_ids(&self, limit: Option<usize>) -> Vec<String> {
        if self.handle.domain().is_empty() || self.handle.collection().is_empty() {
            return Vec::new();
        }
        match self.handle.store().find(
            self.handle.domain(),
            self.handle.collection(),
            &Document::new(),
        ) {
            Ok(documents) => documents
                .iter()
                .filter_map(|doc| doc.get("_id").and_then(Value::as_str).map(str::to_owned))
                .take(limit.unwrap_or(usize::MAX))
                .collect(),
            Err(e) => {
                tracing::warn!(collection = %self.handle.collection(), error = %e,
                    "listing collection failed");
                Vec::new()
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
