//! # Mapping-Layer Integration Tests
//!
//! End-to-end flows over the in-memory backend: configuration to handle
//! to node to edge to traversal, exercising the reconciliation and
//! persistence semantics across module boundaries.

use nodal_core::{
    Defaults, Document, Edge, EdgeOptions, Endpoint, GraphView, Handle, MemoryStore, Node,
    Store, StoreConfig, graph_name,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn doc(fields: &[(&str, Value)]) -> Document {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn handle(store: &Arc<MemoryStore>, collection: &str) -> Handle<MemoryStore> {
    Handle::connect(
        Arc::clone(store),
        StoreConfig::for_collection("crm", collection),
        &Defaults::default(),
    )
    .expect("connect")
}

// =============================================================================
// RECONCILIATION FLOW
// =============================================================================

#[test]
fn two_loads_of_the_same_entity_converge_on_one_document() {
    let store = Arc::new(MemoryStore::new());

    // First ingestion run: a fresh entity gets inserted.
    let mut first = Node::create(
        handle(&store, "users"),
        doc(&[
            ("email", json!("ada@acm.org")),
            ("name", json!("Ada Lovelace")),
        ]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(first.upsave(&[], false));

    // Second run sees the same logical entity with partial, newer data.
    let mut second = Node::create(
        handle(&store, "users"),
        doc(&[
            ("email", json!("ada@acm.org")),
            ("title", json!("Countess")),
        ]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(second.upsave(&[], true));

    // One document, carrying fields from both runs.
    assert_eq!(second.key(), first.key());
    assert_eq!(second.all_ids(None).len(), 1);
    let stored = store
        .get("crm", "users", &second.key())
        .expect("get")
        .expect("stored");
    assert_eq!(stored.get("name"), Some(&json!("Ada Lovelace")));
    assert_eq!(stored.get("title"), Some(&json!("Countess")));
}

#[test]
fn sync_conflicting_stored_fields_win_over_local_ones() {
    let store = Arc::new(MemoryStore::new());
    let mut original = Node::create(
        handle(&store, "users"),
        doc(&[("email", json!("ada@acm.org")), ("city", json!("London"))]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(original.upsave(&[], false));

    let mut stale = Node::create(
        handle(&store, "users"),
        doc(&[("email", json!("ada@acm.org")), ("city", json!("Turin"))]),
        "",
        &["email"],
    )
    .expect("create");
    assert!(stale.sync());

    assert_eq!(stale.data().get("city"), Some(&json!("London")));
}

#[test]
fn composite_key_moves_a_node_between_collections() {
    let store = Arc::new(MemoryStore::new());
    let mut node = Node::create(
        handle(&store, "users"),
        doc(&[("name", json!("Ada"))]),
        "people/ada",
        &[],
    )
    .expect("create");

    assert_eq!(node.handle().collection(), "people");
    assert!(node.upsave(&[], false));
    assert!(
        store
            .get("crm", "people", "ada")
            .expect("get")
            .is_some()
    );
}

// =============================================================================
// CONFIGURATION FLOW
// =============================================================================

#[test]
fn toml_config_drives_a_working_handle() {
    let store = Arc::new(MemoryStore::new());
    let config = StoreConfig::from_toml_str(
        r#"
        domain = "crm"
        collection = "users"
        host = "db.internal"
        "#,
    )
    .expect("parse");

    let handle = Handle::connect(store, config, &Defaults::default()).expect("connect");
    assert_eq!(handle.domain(), "crm");
    assert_eq!(handle.collection(), "users");
    // Defaults filled what the file left out, without touching the host.
    assert_eq!(handle.config().host.as_deref(), Some("db.internal"));
    assert_eq!(handle.config().protocol.as_deref(), Some("http"));

    let mut node = Node::create(handle, doc(&[("name", json!("Ada"))]), "", &[]).expect("create");
    assert!(node.upsave(&[], false));
}

// =============================================================================
// EDGE & TRAVERSAL FLOW
// =============================================================================

#[test]
fn linked_entities_are_traversable_and_edges_deduplicate() {
    let store = Arc::new(MemoryStore::new());
    let mut user = Node::create(
        handle(&store, "users"),
        doc(&[("name", json!("Ada"))]),
        "",
        &[],
    )
    .expect("create");
    assert!(user.upsave(&[], false));
    let mut order = Node::create(
        handle(&store, "orders"),
        doc(&[("total", json!(99))]),
        "",
        &[],
    )
    .expect("create");
    assert!(order.upsave(&[], false));

    let options = EdgeOptions {
        auto_graph: true,
        prevent_duplicates: true,
    };
    let mut edge = Edge::link(
        Arc::clone(&store),
        &Defaults::default(),
        None,
        &Endpoint::Node(&user),
        &Endpoint::Node(&order),
        doc(&[("placed", json!("2024-05-01"))]),
        "",
        None,
        &[],
        options,
    )
    .expect("link");
    assert!(edge.upsave(&[], false));

    // Relinking the same endpoints adopts the stored edge instead of
    // duplicating it.
    let relinked = Edge::link(
        Arc::clone(&store),
        &Defaults::default(),
        None,
        &Endpoint::Node(&user),
        &Endpoint::Node(&order),
        Document::new(),
        "",
        None,
        &[],
        options,
    )
    .expect("link");
    assert_eq!(relinked.key(), edge.key());

    // The auto-registered graph makes the order reachable from the user.
    let view = GraphView::new(
        Arc::clone(&store),
        "crm",
        graph_name("users__orders"),
    )
    .expect("view");
    let reached = view.outbounds_from(&user.full_key());
    assert_eq!(reached.list.len(), 1);
    assert_eq!(
        reached.list.first().and_then(|d| d.get("_id")),
        Some(&json!(order.full_key()))
    );

    // Nothing reachable from the order side in the outbound direction.
    assert!(view.outbounds_from(&order.full_key()).list.is_empty());
}

#[test]
fn deleting_an_edge_leaves_its_endpoints_alone() {
    let store = Arc::new(MemoryStore::new());
    let mut user = Node::create(handle(&store, "users"), Document::new(), "u1", &[])
        .expect("create");
    assert!(user.upsave(&[], false));
    let mut order = Node::create(handle(&store, "orders"), Document::new(), "o1", &[])
        .expect("create");
    assert!(order.upsave(&[], false));

    let mut edge = Edge::link(
        Arc::clone(&store),
        &Defaults::default(),
        None,
        &Endpoint::Node(&user),
        &Endpoint::Node(&order),
        Document::new(),
        "",
        None,
        &[],
        EdgeOptions::default(),
    )
    .expect("link");
    assert!(edge.upsave(&[], false));
    assert!(edge.delete());

    assert!(store.get("crm", "users", "u1").expect("get").is_some());
    assert!(store.get("crm", "orders", "o1").expect("get").is_some());
    assert!(
        store
            .find("crm", "users__orders", &Document::new())
            .expect("find")
            .is_empty()
    );
}
