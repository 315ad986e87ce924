//! # RedbStore Integration Tests
//!
//! The disk-backed store must mirror the in-memory backend's semantics
//! (ordering, conflicts, traversal) and additionally survive a close and
//! reopen of the database file.

use nodal_core::{
    Defaults, Direction, Document, Handle, Node, NodalError, RedbStore, Store, StoreConfig,
    traversal_filter,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn doc(fields: &[(&str, Value)]) -> Document {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn open_store(dir: &tempfile::TempDir) -> RedbStore {
    RedbStore::open(dir.path().join("nodal.redb")).expect("open")
}

fn seed_users(store: &RedbStore) {
    store.ensure_domain("crm").expect("domain");
    store
        .ensure_collection("crm", "users", false)
        .expect("collection");
}

// =============================================================================
// CRUD
// =============================================================================

#[test]
fn insert_get_update_delete_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    seed_users(&store);

    let key = store
        .insert("crm", "users", &doc(&[("name", json!("Ada"))]), None)
        .expect("insert");
    let stored = store.get("crm", "users", &key).expect("get").expect("doc");
    assert_eq!(stored.get("name"), Some(&json!("Ada")));
    assert_eq!(stored.get("_key"), Some(&json!(key.clone())));
    assert_eq!(stored.get("_id"), Some(&json!(format!("users/{key}"))));

    store
        .update_fields("crm", "users", &key, &doc(&[("city", json!("London"))]))
        .expect("update");
    let updated = store.get("crm", "users", &key).expect("get").expect("doc");
    assert_eq!(updated.get("name"), Some(&json!("Ada")));
    assert_eq!(updated.get("city"), Some(&json!("London")));

    assert!(store.delete("crm", "users", &key).expect("delete"));
    assert!(!store.delete("crm", "users", &key).expect("delete"));
    assert!(store.get("crm", "users", &key).expect("get").is_none());
}

#[test]
fn assigned_keys_are_unique_and_monotonic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    seed_users(&store);

    let first = store
        .insert("crm", "users", &Document::new(), None)
        .expect("insert");
    let second = store
        .insert("crm", "users", &Document::new(), None)
        .expect("insert");
    assert_ne!(first, second);
}

#[test]
fn duplicate_predefined_key_is_a_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    seed_users(&store);

    store
        .insert("crm", "users", &Document::new(), Some("ada"))
        .expect("insert");
    let result = store.insert("crm", "users", &Document::new(), Some("ada"));
    assert!(matches!(result, Err(NodalError::Conflict(_))));
}

#[test]
fn find_matches_probe_fields_in_key_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    seed_users(&store);

    for (key, kind) in [("m", "x"), ("a", "x"), ("z", "y")] {
        store
            .insert("crm", "users", &doc(&[("kind", json!(kind))]), Some(key))
            .expect("insert");
    }

    let matches = store
        .find("crm", "users", &doc(&[("kind", json!("x"))]))
        .expect("find");
    let keys: Vec<&str> = matches
        .iter()
        .filter_map(|d| d.get("_key").and_then(Value::as_str))
        .collect();
    assert_eq!(keys, vec!["a", "m"]);
}

#[test]
fn missing_collection_reads_are_empty_not_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    store.ensure_domain("crm").expect("domain");

    assert!(store.get("crm", "ghosts", "k").expect("get").is_none());
    assert!(
        store
            .find("crm", "ghosts", &Document::new())
            .expect("find")
            .is_empty()
    );
    assert!(!store.exists("crm", "ghosts", "k").expect("exists"));
    assert!(!store.delete_collection("crm", "ghosts").expect("drop"));
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn documents_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assigned;
    {
        let store = open_store(&dir);
        seed_users(&store);
        assigned = store
            .insert("crm", "users", &doc(&[("name", json!("Ada"))]), None)
            .expect("insert");
    }

    let reopened = open_store(&dir);
    let stored = reopened
        .get("crm", "users", &assigned)
        .expect("get")
        .expect("doc");
    assert_eq!(stored.get("name"), Some(&json!("Ada")));

    // The key counter also survives: no collision with the old key.
    let fresh = reopened
        .insert("crm", "users", &Document::new(), None)
        .expect("insert");
    assert_ne!(fresh, assigned);
}

// =============================================================================
// TRAVERSAL
// =============================================================================

#[test]
fn traversal_walks_registered_edges_breadth_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    store.ensure_domain("crm").expect("domain");
    store
        .ensure_collection("crm", "users", false)
        .expect("collection");
    for key in ["a", "b", "c"] {
        store
            .insert("crm", "users", &Document::new(), Some(key))
            .expect("insert");
    }
    store
        .ensure_edge_definition(
            "crm",
            "g--knows",
            "knows",
            &["users".to_string()],
            &["users".to_string()],
        )
        .expect("edge definition");
    for (from, to) in [("users/a", "users/b"), ("users/b", "users/c")] {
        store
            .insert(
                "crm",
                "knows",
                &doc(&[("_from", json!(from)), ("_to", json!(to))]),
                None,
            )
            .expect("insert");
    }

    let raw = store
        .traverse("crm", "g--knows", "users/a", Direction::Outbound)
        .expect("traverse");
    let filtered = traversal_filter(&raw, "users/a");
    let ids: Vec<&str> = filtered
        .list
        .iter()
        .filter_map(|d| d.get("_id").and_then(Value::as_str))
        .collect();
    assert_eq!(ids, vec!["users/b", "users/c"]);

    let inbound = store
        .traverse("crm", "g--knows", "users/c", Direction::Inbound)
        .expect("traverse");
    let filtered = traversal_filter(&inbound, "users/c");
    assert_eq!(filtered.list.len(), 2);
}

#[test]
fn query_execution_is_unsupported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    store.ensure_domain("crm").expect("domain");

    let result = store.execute_query("crm", "FOR v IN users RETURN v", &Document::new());
    assert!(matches!(result, Err(NodalError::Configuration(_))));
}

// =============================================================================
// THROUGH THE MAPPING LAYER
// =============================================================================

#[test]
fn nodes_reconcile_against_the_disk_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(open_store(&dir));
    let connect = || {
        Handle::connect(
            Arc::clone(&store),
            StoreConfig::for_collection("crm", "users"),
            &Defaults::default(),
        )
        .expect("connect")
    };

    let mut first = Node::create(
        connect(),
        doc(&[("email", json!("ada@acm.org")), ("city", json!("London"))]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(first.upsave(&[], false));

    let mut second = Node::create(
        connect(),
        doc(&[("email", json!("ada@acm.org"))]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(second.sync());
    assert_eq!(second.key(), first.key());
    assert_eq!(second.data().get("city"), Some(&json!("London")));
}
