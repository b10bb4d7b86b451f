use std::sync::Arc;

use crate::{backend::{MemoryBackend, MemoryStore}, config::{BankConfig, BenchmarkConfig, ClusterConfig, KeyspaceConfig, NodeInfo, RequestConfig, StressorConfig, SyntheticConfig}, stage::{AckPayload, MergedPayload, NodeContext, StageSpec, StateBag}};

use super::*;

fn cluster_config(n: usize) -> ClusterConfig {
    ClusterConfig {
        nodes: (0..n).map(|i| NodeInfo { name: format!("node{}", i), addr: format!("127.0.0.1:{}", 4000 + i) }).collect(),
        connect_max_retry: 2,
        recv_buffer_size: 64,
    }
}

fn benchmark(n: usize, stages: Vec<StageSpec>, abort_on_failure: bool) -> BenchmarkConfig {
    BenchmarkConfig {
        cluster: cluster_config(n),
        backend: Default::default(),
        stages,
        abort_on_failure,
    }
}

fn keyspace() -> KeyspaceConfig {
    KeyspaceConfig { num_keys: 200, value_size: 8, ..Default::default() }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_pipeline() {
    let stages = vec![
        StageSpec::Population { keyspace: keyspace(), num_threads: 2, seed: Some(1) },
        StageSpec::Warmup { keyspace: keyspace(), num_threads: 2, seed: Some(1) },
        StageSpec::Stress {
            keyspace: keyspace(),
            stressor: StressorConfig { num_threads: 2, simulation_time_ms: 100, seed: Some(9), ..Default::default() },
            workload: RequestConfig::Synthetic(SyntheticConfig::default()),
            parameters: Default::default(),
            destroy_after: false,
        },
        StageSpec::ClearBackend,
    ];
    let coordinator = Coordinator::local_cluster(benchmark(3, stages, true)).unwrap();
    assert_eq!(coordinator.cluster_size(), 3);

    let outcomes = coordinator.run().await;
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.success), "{:?}", outcomes);
    assert_eq!(outcomes[0].payload, MergedPayload::Total(200));
    match &outcomes[2].payload {
        MergedPayload::PerNode(m) => assert_eq!(m.len(), 3),
        other => panic!("Unexpected {:?}", other),
    }
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_on_failure() {
    // Validating before populating fails on every node.
    let stages = vec![
        StageSpec::BankValidation { bank: BankConfig::default() },
        StageSpec::BankPopulation { bank: BankConfig::default() },
        StageSpec::BankValidation { bank: BankConfig::default() },
    ];

    let coordinator = Coordinator::local_cluster(benchmark(2, stages.clone(), true)).unwrap();
    let outcomes = coordinator.run().await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);

    let coordinator = Coordinator::local_cluster(benchmark(2, stages, false)).unwrap();
    let outcomes = coordinator.run().await;
    assert_eq!(outcomes.iter().map(|o| o.success).collect::<Vec<_>>(), vec![false, true, true]);
}

#[tokio::test]
async fn test_frame_round_trip() {
    let (mut a, mut b) = tokio::io::duplex(1 << 16);
    let spec = StageSpec::Population { keyspace: keyspace(), num_threads: 3, seed: None };
    write_frame(&mut a, &NodeRequest::RunStage(spec.clone())).await.unwrap();
    write_frame(&mut a, &NodeRequest::Shutdown).await.unwrap();

    // Starts smaller than the first frame.
    let mut buf = vec![0u8; 4];
    let got: Option<NodeRequest> = read_frame(&mut b, &mut buf).await.unwrap();
    assert_eq!(got, Some(NodeRequest::RunStage(spec)));
    assert!(buf.len() > 4);
    let got: Option<NodeRequest> = read_frame(&mut b, &mut buf).await.unwrap();
    assert_eq!(got, Some(NodeRequest::Shutdown));

    tokio::io::AsyncWriteExt::write_u32(&mut a, 0).await.unwrap();
    let got: Option<NodeRequest> = read_frame(&mut b, &mut buf).await.unwrap();
    assert_eq!(got, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_node_over_tcp() {
    let store = Arc::new(MemoryStore::new());
    let server = NodeServer::new(NodeContext {
        node_index: 0,
        cluster_size: 1,
        address: String::from("127.0.0.1:0"),
        backend: Arc::new(MemoryBackend::attach(store.clone())),
        state: StateBag::new(),
    }, 64);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server_handle = tokio::spawn(async move { server.run(listener).await });

    let node = RemoteNode::new(0, &addr, 3, 16);
    let ack = node.run_stage(&StageSpec::BankPopulation { bank: BankConfig::default() }).await;
    assert_eq!(ack.error, None);
    assert_eq!(ack.payload, Some(AckPayload::Total(11)));
    assert_eq!(store.len(), 11);

    let ack = node.run_stage(&StageSpec::BankValidation { bank: BankConfig::default() }).await;
    assert_eq!(ack.payload, Some(AckPayload::Total(11000)));

    node.shutdown().await.unwrap();
    server_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unreachable_node_becomes_error_ack() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let node = RemoteNode::new(2, &addr, 1, 16);
    let ack = node.run_stage(&StageSpec::ClearBackend).await;
    assert_eq!(ack.node_index, 2);
    assert!(ack.is_error());
    assert_eq!(ack.address, addr);
}
