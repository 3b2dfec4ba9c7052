/// In-process cluster harness for integration tests
///
/// Storage nodes live in the test process and talk to coordinators through
/// [`crate::transport::LocalClient`], so a node can be made unreachable,
/// restarted from its directory, or wiped without any real networking.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestCluster;
///
/// #[tokio::test]
/// async fn test_round_trip() -> anyhow::Result<()> {
///     let mut cluster = TestCluster::new(3, 3).await?;
///     let alice = cluster.create_store("alice").await?;
///     alice.create("/hello").await?;
///     alice.write("/hello", 0, b"world").await?;
///
///     let bob = cluster.mount("bob").await?;
///     cluster.stop_node(0);
///     cluster.shutdown().await;
///     Ok(())
/// }
/// ```
mod cluster;
mod node;

pub use cluster::TestCluster;
pub use node::TestNode;
