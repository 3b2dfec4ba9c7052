//! Capability checks across mounts with different identities

mod common;

use ::common::error::StoreError;

fn denied<T: std::fmt::Debug>(result: Result<T, StoreError>) -> bool {
    matches!(result, Err(StoreError::PermissionDenied(_)))
}

#[tokio::test]
async fn test_grant_and_revoke_read() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.create("/notes").await.unwrap();
    alice.write("/notes", 0, b"private").await.unwrap();

    assert!(denied(bob.read_all("/notes").await));
    assert!(denied(bob.stat("/notes").await));

    let bob_key = bob.public().to_hex();
    alice.set("/notes", "addreader", &bob_key).await.unwrap();
    assert_eq!(bob.read_all("/notes").await.unwrap(), b"private");
    assert!(denied(bob.write("/notes", 0, b"nope").await));

    alice.set("/notes", "removereader", &bob_key).await.unwrap();
    assert!(denied(bob.read_all("/notes").await));
}

#[tokio::test]
async fn test_grant_and_revoke_write() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.create("/draft").await.unwrap();

    let bob_key = bob.public().to_hex();
    alice.set("/draft", "addwriter", &bob_key).await.unwrap();
    bob.write("/draft", 0, b"from bob").await.unwrap();
    // writers may read
    assert_eq!(bob.read_all("/draft").await.unwrap(), b"from bob");
    assert_eq!(alice.read_all("/draft").await.unwrap(), b"from bob");

    alice.set("/draft", "removewriter", &bob_key).await.unwrap();
    assert!(denied(bob.append("/draft", b"!").await));
    assert!(denied(bob.truncate("/draft", 0).await));
    assert_eq!(alice.read_all("/draft").await.unwrap(), b"from bob");
}

#[tokio::test]
async fn test_directory_write_needed_to_create() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.mkdir("/box").await.unwrap();

    // traversal needs nothing, listing needs read
    assert!(denied(bob.readdir("/box").await));
    assert!(denied(bob.create("/box/mine").await));
    assert!(denied(bob.delete("/box").await));

    alice
        .set("/box", "addwriter", &bob.public().to_hex())
        .await
        .unwrap();
    bob.create("/box/mine").await.unwrap();
    assert_eq!(bob.readdir("/box").await.unwrap().len(), 1);
    // the creator owns what they made; the directory owner does not
    assert!(denied(alice.read_all("/box/mine").await));
}

#[tokio::test]
async fn test_rw_inheritance_across_mounts() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    let carol = cluster.mount("carol").await.unwrap();

    alice.mkdir("/team").await.unwrap();
    alice
        .set("/team", "addwriter", &bob.public().to_hex())
        .await
        .unwrap();
    alice
        .set("/team", "addreader", &carol.public().to_hex())
        .await
        .unwrap();
    alice.set("/team", "inherit", "rw").await.unwrap();

    bob.mkdir("/team/sub").await.unwrap();
    bob.create("/team/sub/plan").await.unwrap();
    bob.write("/team/sub/plan", 0, b"step one").await.unwrap();

    // the parent owner and its writers carry down two levels
    alice.append("/team/sub/plan", b", step two").await.unwrap();
    assert_eq!(
        bob.read_all("/team/sub/plan").await.unwrap(),
        b"step one, step two"
    );
    assert_eq!(
        carol.read_all("/team/sub/plan").await.unwrap(),
        b"step one, step two"
    );
    assert!(denied(carol.write("/team/sub/plan", 0, b"x").await));

    // inheritance is a snapshot taken at creation
    alice
        .set("/team", "removereader", &carol.public().to_hex())
        .await
        .unwrap();
    assert!(carol.read_all("/team/sub/plan").await.is_ok());
    bob.create("/team/later").await.unwrap();
    assert!(denied(carol.read_all("/team/later").await));
}

#[tokio::test]
async fn test_read_inheritance_only_reads() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.mkdir("/pub").await.unwrap();
    alice
        .set("/pub", "addreader", &bob.public().to_hex())
        .await
        .unwrap();
    alice.set("/pub", "inherit", "read").await.unwrap();

    alice.create("/pub/doc").await.unwrap();
    alice.write("/pub/doc", 0, b"readme").await.unwrap();
    assert_eq!(bob.read_all("/pub/doc").await.unwrap(), b"readme");
    assert!(denied(bob.write("/pub/doc", 0, b"x").await));
}

#[tokio::test]
async fn test_admin_delegation() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    let carol = cluster.mount("carol").await.unwrap();
    alice.create("/f").await.unwrap();

    assert!(denied(
        bob.set("/f", "addreader", &carol.public().to_hex()).await
    ));
    alice
        .set("/f", "addadmin", &bob.public().to_hex())
        .await
        .unwrap();
    bob.set("/f", "addreader", &carol.public().to_hex())
        .await
        .unwrap();
    carol.read_all("/f").await.unwrap();

    // the owner can never be demoted
    assert!(matches!(
        bob.set("/f", "removeadmin", &alice.public().to_hex()).await,
        Err(StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_object_aliases() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.create("/f").await.unwrap();

    let keysig = cluster.identities().read_keysig("bob").unwrap().to_string();
    alice
        .set("/f", "addalias", &format!("b:{}", keysig))
        .await
        .unwrap();
    alice.set("/f", "addreader", "b").await.unwrap();
    bob.read_all("/f").await.unwrap();

    alice.set("/f", "removealias", "b").await.unwrap();
    assert!(matches!(
        alice.set("/f", "removereader", "b").await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(alice.get("/f", "dump").await.unwrap().contains("aliases"));
}

#[tokio::test]
async fn test_root_admin_rejected() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    let bob_key = bob.public().to_hex();
    for verb in ["addreader", "addwriter", "addadmin", "removereader", "inherit"] {
        assert!(matches!(
            alice.set("/", verb, &bob_key).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }
    // mount aliases are the one thing settable on the root
    alice
        .set("/", "addalias", &format!("bob:{}", bob_key))
        .await
        .unwrap();
    alice.create("/f").await.unwrap();
    alice.set("/f", "addreader", "bob").await.unwrap();
    bob.read_all("/f").await.unwrap();
}

#[tokio::test]
async fn test_unknown_verbs() {
    let (_cluster, alice) = common::setup_store().await;
    alice.create("/f").await.unwrap();
    for result in [
        alice.set("/f", "addowner", "x").await.map(|_| ()),
        alice.get("/f", "colour").await.map(|_| ()),
        alice.set("/", "frobnicate", "").await.map(|_| ()),
    ] {
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }
}

#[tokio::test]
async fn test_group_grant() {
    let (mut cluster, alice) = common::setup_store().await;
    let bob = cluster.mount("bob").await.unwrap();
    alice.create("/f").await.unwrap();
    alice.set("/", "creategroup", "ops").await.unwrap();
    alice.set("/f", "addreader", "ops").await.unwrap();
    assert!(denied(bob.read_all("/f").await));

    // group keys are shared through the host key store: a fresh mount
    // picks up every group key present there
    let bob_again = cluster.mount("bob").await.unwrap();
    bob_again.read_all("/f").await.unwrap();
}
