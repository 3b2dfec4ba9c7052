//! Node loss, eviction and healing

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::coordinator::Coordinator;
use ::common::error::StoreError;
use ::common::gateway::MountGateway;
use ::common::testkit::TestCluster;
use ::common::transport::Membership;

async fn mask_of(mount: &MountGateway, path: &str) -> u8 {
    mount.get(path, "ownersstate").await.unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_write_with_owner_down_then_restored() {
    let (mut cluster, alice) = common::setup_store().await;
    alice.create("/f").await.unwrap();
    assert_eq!(mask_of(&alice, "/f").await, 0b111);

    cluster.stop_node(1);
    alice.write("/f", 0, b"while degraded").await.unwrap();
    let degraded = mask_of(&alice, "/f").await;
    assert_eq!(degraded.count_ones(), 2);

    cluster.restart_node(1).await.unwrap();
    // the next write catches the returning owner up
    alice.append("/f", b"!").await.unwrap();
    assert_eq!(mask_of(&alice, "/f").await, 0b111);
    assert_eq!(alice.read_all("/f").await.unwrap(), b"while degraded!");
}

#[tokio::test]
async fn test_heal_resyncs_returning_owner() {
    let (mut cluster, alice) = common::setup_store().await;
    let id = alice.create("/f").await.unwrap();
    cluster.stop_node(2);
    alice.write("/f", 0, b"v2").await.unwrap();
    cluster.restart_node(2).await.unwrap();

    let report = cluster.repair().heal().await.unwrap();
    assert!(report.resynced >= 1);
    assert_eq!(report.added, 0);
    assert_eq!(mask_of(&alice, "/f").await, 0b111);

    let replica = cluster.node(2).node().fetch(&id).await.unwrap().unwrap();
    assert_eq!(replica.file().unwrap().read_all(), b"v2");

    // reads need one live owner, writes need a quorum
    cluster.stop_node(0);
    cluster.stop_node(1);
    assert_eq!(alice.read_all("/f").await.unwrap(), b"v2");
    assert!(matches!(
        alice.write("/f", 0, b"v3").await,
        Err(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_evict_and_heal_after_wipe() {
    let (mut cluster, alice) = common::setup_store().await;
    alice.mkdir("/docs").await.unwrap();
    alice.create("/docs/a").await.unwrap();
    alice.write("/docs/a", 0, b"alpha").await.unwrap();

    let lost = cluster.node(2).id();
    let fresh = cluster.wipe_node(2).await.unwrap();
    alice.append("/docs/a", b"beta").await.unwrap();
    assert_eq!(mask_of(&alice, "/docs/a").await.count_ones(), 2);

    let repair = cluster.repair();
    let evicted = repair.evict(&lost).await.unwrap();
    assert_eq!(evicted.scanned, 3);
    assert_eq!(evicted.updated, 3);
    // a second pass finds nothing left to do
    assert_eq!(repair.evict(&lost).await.unwrap().updated, 0);

    let healed = repair.heal().await.unwrap();
    assert_eq!(healed.added, 3);
    for path in ["/", "/docs", "/docs/a"] {
        assert_eq!(mask_of(&alice, path).await, 0b111);
        let owners = alice.get(path, "owners").await.unwrap();
        assert!(owners.contains(&fresh.to_hex()));
        assert!(!owners.contains(&lost.to_hex()));
    }

    // the wiped node carries a full copy again
    cluster.stop_node(0);
    assert_eq!(alice.read_all("/docs/a").await.unwrap(), b"alphabeta");
}

#[tokio::test]
async fn test_mask_never_exceeds_replication() {
    let (cluster, alice) = common::setup_store_with(5, 2).await;
    for i in 0..12 {
        let path = format!("/f{}", i);
        alice.create(&path).await.unwrap();
        alice.write(&path, 0, b"x").await.unwrap();
    }
    cluster.stop_node(3);
    for i in 0..12 {
        let path = format!("/f{}", i);
        // R=2 has a quorum of 2, so a write only fails when it lost an owner
        let _ = alice.append(&path, b"y").await;
        let stat = alice.stat(&path).await;
        if let Ok(stat) = stat {
            assert!(stat.owners <= 2);
            assert!(stat.mask <= 0b11);
        }
    }
}

#[tokio::test]
async fn test_placement_spreads_objects() {
    let (cluster, alice) = common::setup_store_with(5, 3).await;
    for i in 0..20 {
        alice.create(&format!("/f{}", i)).await.unwrap();
    }
    let mut holders = 0;
    for i in 0..5 {
        if cluster.node(i).node().list().await.unwrap().len() > 1 {
            holders += 1;
        }
    }
    assert!(holders >= 4);
}

#[tokio::test]
async fn test_resync_single_object() {
    let mut cluster = TestCluster::new(3, 3).await.unwrap();
    let alice = cluster.create_store("alice").await.unwrap();
    let id = alice.create("/f").await.unwrap();

    cluster.stop_node(1);
    alice.write("/f", 0, b"one").await.unwrap();
    cluster.restart_node(1).await.unwrap();
    let report = cluster.repair().resync(&id).await.unwrap();
    assert_eq!(report.resynced, 1);

    cluster
        .wait_for(Duration::from_secs(5), || {
            let alice = alice.clone();
            async move { mask_of(&alice, "/f").await == 0b111 }
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mount_view_follows_wipe_and_heal() {
    let (mut cluster, _alice) = common::setup_store().await;
    // a mount holding its own view, fed from the cluster the way a
    // daemon's view is fed from its seeds
    let view = Membership::from_clients(cluster.membership().clients())
        .with_discovery(Arc::new(cluster.membership().clone()));
    let identity = cluster
        .identities()
        .create("alice", "alice-passphrase")
        .unwrap();
    let mount = MountGateway::open(
        Coordinator::new(view.clone(), cluster.config().clone(), None),
        identity,
        None,
    )
    .await
    .unwrap();
    let id = mount.create("/f").await.unwrap();
    mount.write("/f", 0, b"alpha").await.unwrap();

    let lost = cluster.node(1).id();
    let fresh = cluster.wipe_node(1).await.unwrap();
    assert!(!view.contains(&fresh));

    let repair = cluster.repair();
    repair.evict(&lost).await.unwrap();
    repair.heal().await.unwrap();
    assert_eq!(mask_of(&mount, "/f").await, 0b111);

    // the next write reaches the owner heal added
    mount.append("/f", b"beta").await.unwrap();
    assert_eq!(mask_of(&mount, "/f").await, 0b111);
    assert!(view.contains(&fresh));
    assert!(!view.contains(&lost));

    let copy = cluster.node(1).node().fetch(&id).await.unwrap().unwrap();
    assert_eq!(copy.file().unwrap().read_all(), b"alphabeta");
}
