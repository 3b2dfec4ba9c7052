//! Shared helpers for cluster integration tests
#![allow(dead_code)]

use std::sync::Once;

use common::gateway::MountGateway;
use common::testkit::TestCluster;

static TRACING: Once = Once::new();

/// Route cluster logs to the test harness when RUST_LOG is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Three persistent nodes at R=3 with a store owned by alice
pub async fn setup_store() -> (TestCluster, MountGateway) {
    setup_store_with(3, 3).await
}

pub async fn setup_store_with(nodes: usize, replication: u8) -> (TestCluster, MountGateway) {
    init_tracing();
    let mut cluster = TestCluster::new(nodes, replication).await.unwrap();
    let alice = cluster.create_store("alice").await.unwrap();
    (cluster, alice)
}

/// Deterministic test bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
