//! Path resolution, access policy, and hierarchy mutations against the
//! in-memory graph.

use structures_access::{AccessError, AccessPolicy, HierarchyMutator, PathResolver};
use structures_core::{AccessKind, NodeId, NodeKind, Properties, Relation};
use structures_graph::{GraphSession, GraphStore, MemoryGraph, NewNode};

const ROOT: &str = "33b8b452-00cf-42f7-8f4b-ce867c68b8c1";

fn props(name: &str, active: bool) -> Properties {
    let mut props = Properties::new();
    props.insert("name".into(), name.into());
    props.insert("active".into(), active.into());
    props
}

async fn add(session: &mut dyn GraphSession, kind: NodeKind, parent: &NodeId, name: &str) -> NodeId {
    let node = session
        .create_node(NewNode::new(kind, props(name, true)))
        .await
        .unwrap();
    session
        .create_relation(&node.id, kind.upward_relation().unwrap(), parent)
        .await
        .unwrap();
    node.id
}

async fn add_user(session: &mut dyn GraphSession, read: &[&NodeId], write: &[&NodeId]) -> NodeId {
    let user = session
        .create_node(NewNode::new(NodeKind::User, props("user", true)))
        .await
        .unwrap();
    for target in read {
        session
            .create_relation(&user.id, Relation::ReadAccess, target)
            .await
            .unwrap();
    }
    for target in write {
        session
            .create_relation(&user.id, Relation::WriteAccess, target)
            .await
            .unwrap();
    }
    user.id
}

/// Root <- A <- B <- C, with outlet S under B, device D at S, worker W in C.
struct Tree {
    graph: MemoryGraph,
    root: NodeId,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    outlet: NodeId,
    device: NodeId,
    worker: NodeId,
}

async fn tree() -> Tree {
    let root = NodeId::from(ROOT);
    let graph = MemoryGraph::with_root(&root).await;
    let mut session = graph.session().await.unwrap();
    session.begin().await.unwrap();

    let s = session.as_mut();
    let a = add(s, NodeKind::OrganizationUnit, &root, "A").await;
    let b = add(s, NodeKind::OrganizationUnit, &a, "B").await;
    let c = add(s, NodeKind::OrganizationUnit, &b, "C").await;
    let outlet = add(s, NodeKind::Outlet, &b, "Shop").await;
    let device = add(s, NodeKind::Device, &outlet, "Breathalyzer").await;
    let worker = add(s, NodeKind::Worker, &c, "Ivanov").await;

    session.commit().await.unwrap();
    session.close().await.unwrap();

    Tree {
        graph,
        root,
        a,
        b,
        c,
        outlet,
        device,
        worker,
    }
}

fn resolver(max_hops: u32) -> PathResolver {
    PathResolver::new(NodeId::from(ROOT), max_hops)
}

// ── Path resolution ──────────────────────────────────────────────

#[tokio::test]
async fn path_to_root_excludes_node_and_ends_at_root() {
    let t = tree().await;
    let mut session = t.graph.session().await.unwrap();
    let r = resolver(10);

    let path = r.path_to_root(session.as_mut(), &t.c).await.unwrap();
    assert_eq!(path, vec![t.b.clone(), t.a.clone(), t.root.clone()]);

    let materialized = r.materialized_path(session.as_mut(), &t.c).await.unwrap();
    assert_eq!(materialized, vec![t.c.clone(), t.b.clone(), t.a.clone(), t.root.clone()]);

    let root_path = r.path_to_root(session.as_mut(), &t.root).await.unwrap();
    assert!(root_path.is_empty());
}

#[tokio::test]
async fn device_path_climbs_through_outlet() {
    let t = tree().await;
    let mut session = t.graph.session().await.unwrap();

    let path = resolver(10)
        .path_to_root(session.as_mut(), &t.device)
        .await
        .unwrap();
    assert_eq!(path, vec![t.outlet, t.b, t.a, t.root]);
}

#[tokio::test]
async fn hop_limit_is_enforced() {
    let t = tree().await;
    let mut session = t.graph.session().await.unwrap();

    let err = resolver(2)
        .path_to_root(session.as_mut(), &t.c)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PathResolution { max_hops: 2, .. }));
    assert_eq!(err.status_code(), 500);

    let ok = resolver(3).path_to_root(session.as_mut(), &t.c).await.unwrap();
    assert_eq!(ok.len(), 3);
}

#[tokio::test]
async fn orphaned_unit_does_not_resolve() {
    let t = tree().await;
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let orphan = session
        .create_node(NewNode::new(NodeKind::OrganizationUnit, props("lost", true)))
        .await
        .unwrap();

    let err = resolver(10)
        .path_to_root(session.as_mut(), &orphan.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PathResolution { .. }));
}

#[tokio::test]
async fn inactive_ancestor_breaks_active_tree() {
    let t = tree().await;
    let r = resolver(10);
    let mut session = t.graph.session().await.unwrap();
    assert!(r.is_in_active_tree(session.as_mut(), &t.c).await.unwrap());

    session.begin().await.unwrap();
    session
        .set_properties(&t.a, &props("A", false))
        .await
        .unwrap();
    session.commit().await.unwrap();

    assert!(!r.is_in_active_tree(session.as_mut(), &t.c).await.unwrap());
    assert!(!r.is_in_active_tree(session.as_mut(), &t.a).await.unwrap());
}

// ── Access policy ────────────────────────────────────────────────

#[tokio::test]
async fn grant_on_ancestor_propagates_down() {
    let t = tree().await;
    let policy = AccessPolicy::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let reader = add_user(session.as_mut(), &[&t.a], &[]).await;
    session.commit().await.unwrap();

    let s = session.as_mut();
    for target in [&t.a, &t.b, &t.c, &t.outlet, &t.device, &t.worker] {
        assert!(
            policy
                .has_access(s, Some(&reader), target, AccessKind::Read)
                .await
                .unwrap(),
            "read on {target}"
        );
    }
    assert!(!policy
        .has_access(s, Some(&reader), &t.root, AccessKind::Read)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&reader), &t.c, AccessKind::Write)
        .await
        .unwrap());
}

#[tokio::test]
async fn grant_below_target_does_not_propagate_up() {
    let t = tree().await;
    let policy = AccessPolicy::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let writer = add_user(session.as_mut(), &[], &[&t.c]).await;
    session.commit().await.unwrap();

    let s = session.as_mut();
    assert!(policy
        .has_access(s, Some(&writer), &t.worker, AccessKind::Write)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&writer), &t.b, AccessKind::Write)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&writer), &t.device, AccessKind::Write)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&writer), &t.worker, AccessKind::Read)
        .await
        .unwrap());
}

#[tokio::test]
async fn missing_target_judged_by_root_only() {
    let t = tree().await;
    let policy = AccessPolicy::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let admin = add_user(session.as_mut(), &[&t.root], &[]).await;
    let local = add_user(session.as_mut(), &[&t.a], &[]).await;
    session.commit().await.unwrap();

    let ghost = NodeId::from("does-not-exist");
    let s = session.as_mut();
    assert!(policy
        .has_access(s, Some(&admin), &ghost, AccessKind::Read)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&local), &ghost, AccessKind::Read)
        .await
        .unwrap());
}

#[tokio::test]
async fn anonymous_and_deleted_users_hold_nothing() {
    let t = tree().await;
    let policy = AccessPolicy::new(resolver(10));
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let user = add_user(session.as_mut(), &[&t.root], &[&t.root]).await;
    mutator
        .soft_delete(session.as_mut(), NodeKind::User, &user)
        .await
        .unwrap();
    session.commit().await.unwrap();

    let s = session.as_mut();
    assert!(!policy
        .has_access(s, None, &t.a, AccessKind::Read)
        .await
        .unwrap());
    assert!(!policy
        .has_access(s, Some(&user), &t.a, AccessKind::Read)
        .await
        .unwrap());
    assert!(policy
        .available_organization_units(s, Some(&user))
        .await
        .unwrap()
        .is_empty());

    let err = policy
        .check(s, None, &t.a, AccessKind::Write, NodeKind::OrganizationUnit)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::AccessDenied {
            resource: NodeKind::OrganizationUnit,
            kind: AccessKind::Write,
            ..
        }
    ));
}

#[tokio::test]
async fn available_units_union_read_and_write() {
    let t = tree().await;
    let policy = AccessPolicy::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();
    let user = add_user(session.as_mut(), &[&t.a, &t.c], &[&t.c]).await;
    session.commit().await.unwrap();

    let units = policy
        .available_organization_units(session.as_mut(), Some(&user))
        .await
        .unwrap();
    let mut expected = vec![t.a.clone(), t.c.clone()];
    expected.sort();
    assert_eq!(units, expected);
}

// ── Mutations ────────────────────────────────────────────────────

#[tokio::test]
async fn mutations_require_transaction() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();

    let err = mutator
        .create(
            session.as_mut(),
            NodeKind::OrganizationUnit,
            &t.a,
            props("X", false),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::TransactionRequired));

    let err = mutator
        .soft_delete(session.as_mut(), NodeKind::OrganizationUnit, &t.c)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::TransactionRequired));
}

#[tokio::test]
async fn create_rejects_bad_parents() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();

    let err = mutator
        .create(session.as_mut(), NodeKind::Outlet, &t.outlet, props("X", true))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ParentNotFound { .. }));

    let err = mutator
        .create(
            session.as_mut(),
            NodeKind::OrganizationUnit,
            &NodeId::from("missing"),
            props("X", true),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    mutator
        .soft_delete(session.as_mut(), NodeKind::OrganizationUnit, &t.c)
        .await
        .unwrap();
    let err = mutator
        .create(session.as_mut(), NodeKind::Worker, &t.c, props("X", true))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ParentNotFound { .. }));
}

#[tokio::test]
async fn reparent_commit_leaves_one_edge() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();

    session.begin().await.unwrap();
    mutator
        .reparent(session.as_mut(), NodeKind::OrganizationUnit, &t.c, &t.a)
        .await
        .unwrap();
    session.commit().await.unwrap();

    assert_eq!(t.graph.edge_count(&t.c, Relation::ChildOf).await, 1);
    let path = resolver(10)
        .path_to_root(session.as_mut(), &t.c)
        .await
        .unwrap();
    assert_eq!(path, vec![t.a.clone(), t.root.clone()]);
}

#[tokio::test]
async fn reparent_rollback_keeps_old_edge() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();

    session.begin().await.unwrap();
    mutator
        .reparent(session.as_mut(), NodeKind::OrganizationUnit, &t.c, &t.a)
        .await
        .unwrap();
    session.rollback().await.unwrap();

    let parents = session.outgoing(&t.c, Relation::ChildOf).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, t.b);
}

#[tokio::test]
async fn concurrent_reparents_last_commit_wins() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut first = t.graph.session().await.unwrap();
    let mut second = t.graph.session().await.unwrap();

    first.begin().await.unwrap();
    second.begin().await.unwrap();
    mutator
        .reparent(first.as_mut(), NodeKind::OrganizationUnit, &t.c, &t.a)
        .await
        .unwrap();
    mutator
        .reparent(second.as_mut(), NodeKind::OrganizationUnit, &t.c, &t.root)
        .await
        .unwrap();
    first.commit().await.unwrap();
    second.commit().await.unwrap();

    assert_eq!(t.graph.edge_count(&t.c, Relation::ChildOf).await, 1);
    let path = resolver(10)
        .path_to_root(first.as_mut(), &t.c)
        .await
        .unwrap();
    assert_eq!(path, vec![t.root.clone()]);
}

#[tokio::test]
async fn repeated_grant_targets_create_one_edge() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();

    let user = mutator
        .create_user(session.as_mut(), props("user", true))
        .await
        .unwrap();
    let targets = [t.root.clone(), t.root.clone(), t.a.clone()];
    mutator
        .grant(session.as_mut(), &user.id, AccessKind::Read, &targets)
        .await
        .unwrap();
    mutator
        .grant(session.as_mut(), &user.id, AccessKind::Read, &targets[..2])
        .await
        .unwrap();
    session.commit().await.unwrap();

    assert_eq!(t.graph.edge_count(&user.id, Relation::ReadAccess).await, 2);
}

#[tokio::test]
async fn reparent_into_own_subtree_is_rejected() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();

    for target in [&t.c, &t.b] {
        let err = mutator
            .reparent(session.as_mut(), NodeKind::OrganizationUnit, &t.b, target)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InvalidParent { .. }));
        assert_eq!(err.status_code(), 409);
    }
}

#[tokio::test]
async fn soft_delete_is_idempotent_and_keeps_children() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();

    for _ in 0..2 {
        mutator
            .soft_delete(session.as_mut(), NodeKind::OrganizationUnit, &t.b)
            .await
            .unwrap();
    }
    session.commit().await.unwrap();

    let b = session.get_node(&t.b).await.unwrap().unwrap();
    assert!(b.is_deleted());
    let parents = session.outgoing(&t.c, Relation::ChildOf).await.unwrap();
    assert_eq!(parents[0].id, t.b);

    let path = resolver(10)
        .path_to_root(session.as_mut(), &t.c)
        .await
        .unwrap();
    assert!(path.contains(&t.b));
}

#[tokio::test]
async fn update_rejects_empty_patch_and_wrong_kind() {
    let t = tree().await;
    let mutator = HierarchyMutator::new(resolver(10));
    let mut session = t.graph.session().await.unwrap();
    session.begin().await.unwrap();

    let err = mutator
        .update(
            session.as_mut(),
            NodeKind::OrganizationUnit,
            &t.a,
            &Properties::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidRequest(_)));

    let err = mutator
        .update(session.as_mut(), NodeKind::Outlet, &t.a, &props("X", true))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound { .. }));

    let updated = mutator
        .update(
            session.as_mut(),
            NodeKind::OrganizationUnit,
            &t.a,
            &props("Renamed", true),
        )
        .await
        .unwrap();
    assert_eq!(updated.str_prop("name"), Some("Renamed"));
}
