//! Integration tests for structures-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package structures-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use structures_core::{NodeId, NodeKind, Properties, Relation};
use structures_graph::{GraphClient, GraphConfig, GraphError, GraphSession, GraphStore, NewNode};

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// Every node a test creates carries this prefix in its id.
fn unique_prefix() -> String {
    format!("it-{}-", NodeId::new())
}

fn scoped_id(prefix: &str, name: &str) -> NodeId {
    NodeId::from(format!("{prefix}{name}"))
}

async fn cleanup(client: &GraphClient, prefix: &str) {
    let q = neo4rs::query("MATCH (n) WHERE n.id STARTS WITH $prefix DETACH DELETE n")
        .param("prefix", prefix);
    let _ = client.run(q).await;
}

fn ou(prefix: &str, name: &str, active: bool) -> NewNode {
    let mut props = Properties::new();
    props.insert("name".into(), name.into());
    props.insert("inn".into(), 7707083893_i64.into());
    props.insert("active".into(), active.into());
    NewNode {
        id: scoped_id(prefix, name),
        kind: NodeKind::OrganizationUnit,
        properties: props,
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_create_and_get_node() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();
    let root = scoped_id(&prefix, "root");
    client.bootstrap(&root).await.unwrap();

    let mut session = client.session().await.unwrap();
    session.begin().await.unwrap();
    let created = session.create_node(ou(&prefix, "A", true)).await.unwrap();
    session
        .create_relation(&created.id, Relation::ChildOf, &root)
        .await
        .unwrap();
    session.commit().await.unwrap();

    let record = session.get_node(&created.id).await.unwrap().unwrap();
    assert_eq!(record.kind, NodeKind::OrganizationUnit);
    assert_eq!(record.str_prop("name"), Some("A"));
    assert_eq!(record.int_prop("inn"), Some(7707083893));
    assert!(record.is_active());
    assert!(record.str_prop("created_at").is_some());

    let parents = session.outgoing(&created.id, Relation::ChildOf).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].kind, NodeKind::Root);

    session.close().await.unwrap();
    cleanup(&client, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_writes_outside_transaction_rejected() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();

    let mut session = client.session().await.unwrap();
    let err = session
        .create_node(ou(&prefix, "A", true))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::TransactionRequired));
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_rollback_discards_writes() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();

    let mut session = client.session().await.unwrap();
    session.begin().await.unwrap();
    let created = session.create_node(ou(&prefix, "A", true)).await.unwrap();
    session.rollback().await.unwrap();

    assert!(session.get_node(&created.id).await.unwrap().is_none());
    session.close().await.unwrap();
    cleanup(&client, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_path_and_descendants() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();
    let root = scoped_id(&prefix, "root");
    client.bootstrap(&root).await.unwrap();

    let mut session = client.session().await.unwrap();
    session.begin().await.unwrap();
    let a = session.create_node(ou(&prefix, "A", true)).await.unwrap();
    let b = session.create_node(ou(&prefix, "B", true)).await.unwrap();
    let c = session.create_node(ou(&prefix, "C", false)).await.unwrap();
    session.create_relation(&a.id, Relation::ChildOf, &root).await.unwrap();
    session.create_relation(&b.id, Relation::ChildOf, &a.id).await.unwrap();
    session.create_relation(&c.id, Relation::ChildOf, &b.id).await.unwrap();
    session.commit().await.unwrap();

    let path = session
        .path_between(&c.id, Relation::ChildOf, &root, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, vec![c.id.clone(), b.id.clone(), a.id.clone(), root.clone()]);

    let too_short = session
        .path_between(&c.id, Relation::ChildOf, &root, 2)
        .await
        .unwrap();
    assert!(too_short.is_none());

    let below_a = session
        .descendants(&[a.id.clone()], Relation::ChildOf, 10)
        .await
        .unwrap();
    let mut ids: Vec<NodeId> = below_a.into_iter().map(|n| n.id).collect();
    ids.sort();
    let mut expected = vec![b.id.clone(), c.id.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    session.close().await.unwrap();
    cleanup(&client, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_relink_parent() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();
    let root = scoped_id(&prefix, "root");
    client.bootstrap(&root).await.unwrap();

    let mut session = client.session().await.unwrap();
    session.begin().await.unwrap();
    let a = session.create_node(ou(&prefix, "A", true)).await.unwrap();
    let b = session.create_node(ou(&prefix, "B", true)).await.unwrap();
    session.create_relation(&a.id, Relation::ChildOf, &root).await.unwrap();
    session.create_relation(&b.id, Relation::ChildOf, &root).await.unwrap();

    let removed = session
        .delete_relation(&b.id, Relation::ChildOf, &root)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    session.create_relation(&b.id, Relation::ChildOf, &a.id).await.unwrap();
    session.commit().await.unwrap();

    let parents = session.outgoing(&b.id, Relation::ChildOf).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, a.id);

    session.close().await.unwrap();
    cleanup(&client, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_replace_relation_after_concurrent_commit() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let prefix = unique_prefix();
    let root = scoped_id(&prefix, "root");
    client.bootstrap(&root).await.unwrap();

    let mut setup = client.session().await.unwrap();
    setup.begin().await.unwrap();
    let a = setup.create_node(ou(&prefix, "A", true)).await.unwrap();
    let b = setup.create_node(ou(&prefix, "B", true)).await.unwrap();
    let d = setup.create_node(ou(&prefix, "D", true)).await.unwrap();
    for id in [&a.id, &b.id, &d.id] {
        setup.create_relation(id, Relation::ChildOf, &root).await.unwrap();
    }
    setup.commit().await.unwrap();
    setup.close().await.unwrap();

    let mut first = client.session().await.unwrap();
    let mut second = client.session().await.unwrap();
    second.begin().await.unwrap();
    first.begin().await.unwrap();
    let dropped = first
        .replace_relation(&b.id, Relation::ChildOf, &a.id)
        .await
        .unwrap();
    assert_eq!(dropped, 1);
    first.commit().await.unwrap();

    // The second move lands after the first committed and must drop its edge.
    second
        .replace_relation(&b.id, Relation::ChildOf, &d.id)
        .await
        .unwrap();
    second.commit().await.unwrap();

    let parents = first.outgoing(&b.id, Relation::ChildOf).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, d.id);

    first.close().await.unwrap();
    second.close().await.unwrap();
    cleanup(&client, &prefix).await;
}
