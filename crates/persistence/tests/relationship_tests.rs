//! Parent, reference and back-reference tests.

mod common;

use std::time::Duration;

use serde_json::json;

use cfgstore_persistence::backends::sqlite::engine;
use cfgstore_persistence::core::{Cancellation, ResourceStorage};
use cfgstore_persistence::error::StorageError;
use cfgstore_persistence::types::{FieldValue, ListSpec, Reference, Resource, ResourceUpdate};

use common::*;

// ============================================================================
// Children
// ============================================================================

#[tokio::test]
async fn test_single_child_is_embedded() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;

    backend
        .create(&tenant, subnet("subnet1", "10.1.0.0/16"))
        .await
        .unwrap();

    let spec = ListSpec::new()
        .with_filter("uuid", [NET_UUID])
        .with_detail(true);
    let listed = backend.list(&tenant, "network", &spec).await.unwrap();
    assert_eq!(listed.len(), 1);

    let children = listed[0].children_of("subnet");
    assert_eq!(children.len(), 1);
    let child = &children[0];
    assert_eq!(child.uuid, "subnet1");
    assert_eq!(child.resource_type, "subnet");
    assert_eq!(child.fq_name_string(), "root:net1:subnet1");
    assert_eq!(child.parent_uuid.as_deref(), Some(NET_UUID));
    assert_eq!(child.field("cidr"), Some(&FieldValue::from("10.1.0.0/16")));
    assert_eq!(child.field("enabled"), Some(&FieldValue::Boolean(true)));
    assert_eq!(child.perms.owner.as_str(), "projA");
}

#[tokio::test]
async fn test_children_round_trip() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;

    let mut created = Vec::new();
    for i in 0..6 {
        let resource = subnet(&format!("child-{}", i), &format!("10.{}.0.0/16", i))
            .with_field("enabled", i % 2 == 0)
            .with_field("allocation", json!({"pool": i, "hosts": [i, i + 1]}));
        created.push(backend.create(&tenant, resource).await.unwrap());
    }

    let net = backend.get(&tenant, "network", NET_UUID).await.unwrap();
    let children = net.children_of("subnet");
    assert_eq!(children.len(), created.len());
    for (child, stored) in children.iter().zip(&created) {
        assert_eq!(child.uuid, stored.uuid);
        assert_eq!(child.fq_name, stored.fq_name);
        assert_eq!(child.display_name, stored.display_name);
        assert_eq!(child.fields, stored.fields);
        assert_eq!(child.perms, stored.perms);
        assert_eq!(child.created, stored.created);
    }
}

#[tokio::test]
async fn test_detail_off_omits_relations() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;
    backend.create(&tenant, subnet("s1", "10.0.0.0/24")).await.unwrap();

    let listed = backend.list(&tenant, "network", &ListSpec::new()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].children.is_empty());
    assert!(listed[0].back_refs.is_empty());
}

#[tokio::test]
async fn test_resource_without_relations_has_empty_sets() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;

    let net = backend.get(&tenant, "network", NET_UUID).await.unwrap();
    assert!(net.children_of("subnet").is_empty());
    assert!(net.children_of("port").is_empty());
    assert!(net.back_refs_from("port").is_empty());
}

// ============================================================================
// References
// ============================================================================

#[tokio::test]
async fn test_references_with_attributes() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;
    backend.create(&tenant, subnet("s1", "10.0.1.0/24")).await.unwrap();
    backend.create(&tenant, subnet("s2", "10.0.2.0/24")).await.unwrap();

    let created = backend
        .create(
            &tenant,
            port("p1")
                .with_reference("subnet", Reference::new("s2").with_attr("priority", 20i64))
                .with_reference("subnet", Reference::new("s1").with_attr("priority", 10i64))
                .with_reference("network", Reference::new(NET_UUID)),
        )
        .await
        .unwrap();

    let refs = created.references_to("subnet");
    assert_eq!(refs.len(), 2);
    let mut by_uuid: Vec<_> = refs
        .iter()
        .map(|r| (r.uuid.as_str(), r.attrs.get("priority").cloned()))
        .collect();
    by_uuid.sort_by(|a, b| a.0.cmp(b.0));
    assert_eq!(
        by_uuid,
        vec![
            ("s1", Some(FieldValue::Integer(10))),
            ("s2", Some(FieldValue::Integer(20))),
        ]
    );
    assert_eq!(created.references_to("network").len(), 1);

    let s1 = backend.get(&tenant, "subnet", "s1").await.unwrap();
    assert_eq!(uuids(s1.back_refs_from("port")), vec!["p1"]);

    // The network sees the port both as a child and as a referrer.
    let net = backend.get(&tenant, "network", NET_UUID).await.unwrap();
    assert_eq!(uuids(net.children_of("port")), vec!["p1"]);
    assert_eq!(uuids(net.back_refs_from("port")), vec!["p1"]);
}

#[tokio::test]
async fn test_reference_validation() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;

    // Undeclared target type
    assert_validation(
        backend
            .create(&tenant, port("p1").with_reference("widget", Reference::new("w1")))
            .await,
    );
    // Undeclared edge attribute
    assert_validation(
        backend
            .create(
                &tenant,
                port("p1").with_reference("subnet", Reference::new("s1").with_attr("weight", 1i64)),
            )
            .await,
    );
    // Duplicate target in one group
    assert_validation(
        backend
            .create(
                &tenant,
                port("p1")
                    .with_reference("subnet", Reference::new("s1"))
                    .with_reference("subnet", Reference::new("s1")),
            )
            .await,
    );

    assert_not_found(backend.get(&tenant, "port", "p1").await);
}

#[tokio::test]
async fn test_update_replaces_reference_group() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;
    backend.create(&tenant, subnet("s1", "10.0.1.0/24")).await.unwrap();
    backend.create(&tenant, subnet("s2", "10.0.2.0/24")).await.unwrap();
    backend
        .create(
            &tenant,
            port("p1")
                .with_reference("subnet", Reference::new("s1"))
                .with_reference("network", Reference::new(NET_UUID)),
        )
        .await
        .unwrap();

    let updated = backend
        .update(
            &tenant,
            "port",
            "p1",
            ResourceUpdate::new().with_references(
                "subnet",
                vec![Reference::new("s2").with_attr("priority", 5i64)],
            ),
        )
        .await
        .unwrap();

    assert_eq!(updated.references_to("subnet").len(), 1);
    assert_eq!(updated.references_to("subnet")[0].uuid, "s2");
    // Groups not named in the update are untouched.
    assert_eq!(updated.references_to("network").len(), 1);

    let s1 = backend.get(&tenant, "subnet", "s1").await.unwrap();
    assert!(s1.back_refs_from("port").is_empty());
    let s2 = backend.get(&tenant, "subnet", "s2").await.unwrap();
    assert_eq!(uuids(s2.back_refs_from("port")), vec!["p1"]);
}

#[tokio::test]
async fn test_delete_removes_outbound_references() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;
    backend.create(&tenant, subnet("s1", "10.0.1.0/24")).await.unwrap();
    backend
        .create(
            &tenant,
            port("p1").with_reference("subnet", Reference::new("s1")),
        )
        .await
        .unwrap();

    // A referenced subnet cannot go first.
    assert_conflict(backend.delete(&tenant, "subnet", "s1").await);

    backend.delete(&tenant, "port", "p1").await.unwrap();

    let s1 = backend.get(&tenant, "subnet", "s1").await.unwrap();
    assert!(s1.back_refs_from("port").is_empty());
    backend.delete(&tenant, "subnet", "s1").await.unwrap();

    // Metadata entries are gone: both names can be reused.
    backend.create(&tenant, port("p1")).await.unwrap();
    backend.create(&tenant, subnet("s1", "10.0.9.0/24")).await.unwrap();
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_create_leaves_nothing_behind() {
    let backend = create_backend();
    let tenant = create_tenant("projA");
    seed_network(&backend, &tenant).await;

    let token = Cancellation::new();
    token.cancel();
    let cancelled = tenant.clone().with_cancellation(token);

    let err = backend
        .create(&cancelled, subnet("s1", "10.0.1.0/24"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let err = backend
        .list(&cancelled, "subnet", &ListSpec::new())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    assert_not_found(backend.get(&tenant, "subnet", "s1").await);
    backend.create(&tenant, subnet("s1", "10.0.1.0/24")).await.unwrap();
}

#[tokio::test]
async fn test_token_cancelled_after_success_does_not_affect_result() {
    let backend = create_backend();
    let token = Cancellation::new();
    let tenant = create_tenant("projA").with_cancellation(token.clone());
    seed_network(&backend, &tenant).await;

    token.cancel();
    assert!(backend.get(&create_tenant("projA"), "network", NET_UUID).await.is_ok());
    assert!(backend.get(&tenant, "network", NET_UUID).await.unwrap_err().is_cancelled());
}

/// Produces no row until it has counted to two hundred million.
const RUNAWAY_COUNT: &str = "WITH RECURSIVE n(x) AS \
    (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 200000000) \
    SELECT count(*) FROM n";

fn cancel_after(token: Cancellation, delay: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_interrupts_running_statement() {
    let backend = create_backend();
    let token = Cancellation::new();
    let tenant = create_tenant("projA").with_cancellation(token.clone());

    let canceller = cancel_after(token, Duration::from_millis(100));
    let result = backend
        .run(&tenant, |conn, _, _| {
            conn.query_row(RUNAWAY_COUNT, [], |row| row.get::<_, i64>(0))
                .map_err(StorageError::from)
        })
        .await;
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);

    // The interrupted connection goes back to the pool in working order.
    let listed = backend
        .list(&create_tenant("projA"), "network", &ListSpec::new())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_transaction_rolls_back() {
    let backend = create_backend();
    let owner = create_tenant("projA");
    seed_network(&backend, &owner).await;

    let token = Cancellation::new();
    let tenant = create_tenant("projA").with_cancellation(token.clone());
    let canceller = cancel_after(token, Duration::from_millis(100));
    let result = backend
        .transaction(&tenant, |tx, registry, tenant| {
            engine::create_resource(tx, registry, tenant, subnet("s-slow", "10.0.9.0/24"))?;
            tx.query_row(RUNAWAY_COUNT, [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await;
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);
    assert_not_found(backend.get(&owner, "subnet", "s-slow").await);
    let remaining = backend
        .count(&admin_tenant(), "subnet", &ListSpec::new())
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    // Name and uuid were never claimed.
    backend.create(&owner, subnet("s-slow", "10.0.9.0/24")).await.unwrap();
}
