//! End-to-end tests of the socket bridge over loopback TCP.

use appproxy_core::types::{
    Block, CommitResponse, InternalTransaction, NodeState, Peer, Snapshot, StateHash,
    TransactionType,
};
use appproxy_core::{
    AppProxy, CommitDriver, ErrorKind, Idempotent, ProxyConfig, ProxyError, ProxyHandler,
    Result, SocketConfig,
};
use appproxy_socket::{proxy_from_config, SocketAppClient, SocketAppProxy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Accepts peer additions, refuses removals, and hashes to the block index.
#[derive(Default)]
struct Ledger {
    commits: Mutex<Vec<u64>>,
    states: Mutex<Vec<NodeState>>,
    delay: Option<Duration>,
}

#[async_trait]
impl ProxyHandler for Ledger {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if block.transactions().iter().any(|tx| tx.as_slice() == b"poison") {
            return Err(ProxyError::application("poison transaction"));
        }
        self.commits.lock().push(block.index());

        let receipts = block
            .internal_transactions()
            .iter()
            .map(|itx| match itx.kind() {
                TransactionType::PeerAdd => itx.as_accepted(),
                TransactionType::PeerRemove => itx.as_refused(),
            })
            .collect();
        Ok(CommitResponse::new(format!("h{}", block.index()).into_bytes(), receipts))
    }

    async fn state_change_handler(&self, state: NodeState) -> Result<()> {
        self.states.lock().push(state);
        Ok(())
    }

    async fn snapshot_handler(&self, _block_index: u64) -> Result<Snapshot> {
        Ok(b"snapshot".to_vec())
    }

    async fn restore_handler(&self, _snapshot: &[u8]) -> Result<StateHash> {
        Ok(b"statehash".to_vec())
    }
}

/// A loopback address nobody is listening on yet.
fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn quick(config: SocketConfig, timeout: Duration) -> SocketConfig {
    let mut config = config.with_timeout(timeout);
    config.retry.initial_delay_ms = 10;
    config.retry.max_delay_ms = 50;
    config
}

/// Starts both halves of the bridge wired to each other.
async fn bridge<H: ProxyHandler + 'static>(
    handler: H,
    timeout: Duration,
) -> (SocketAppProxy, SocketAppClient<H>) {
    let app_addr = free_addr();
    let engine = SocketAppProxy::bind(&quick(SocketConfig::new(loopback(), app_addr), timeout))
        .await
        .unwrap();
    let app = SocketAppClient::bind(
        &quick(SocketConfig::new(app_addr, engine.local_addr()), timeout),
        handler,
    )
    .await
    .unwrap();
    (engine, app)
}

fn membership_block(index: u64) -> (Block, InternalTransaction, InternalTransaction) {
    let add = InternalTransaction::new(
        TransactionType::PeerAdd,
        Peer::new("0xA11CE", "127.0.0.1:1001", "alice"),
    );
    let remove = InternalTransaction::new(
        TransactionType::PeerRemove,
        Peer::new("0xB0B", "127.0.0.1:1002", "bob"),
    );
    let block = Block::new(
        index,
        index,
        vec![],
        vec![],
        vec![b"tx1".to_vec()],
        vec![add.clone(), remove.clone()],
    );
    (block, add, remove)
}

#[tokio::test]
async fn test_commit_round_trip_keeps_receipt_order() {
    let (engine, app) = bridge(Ledger::default(), Duration::from_secs(2)).await;
    let (block, add, remove) = membership_block(1);

    let response = engine.commit_block(&block).await.unwrap();

    assert_eq!(response.state_hash, b"h1".to_vec());
    assert_eq!(response.internal_transaction_receipts.len(), 2);
    assert_eq!(response.internal_transaction_receipts[0].internal_transaction, add);
    assert!(response.internal_transaction_receipts[0].accepted);
    assert_eq!(response.internal_transaction_receipts[1].internal_transaction, remove);
    assert!(!response.internal_transaction_receipts[1].accepted);
    assert_eq!(*app.handler().commits.lock(), vec![1]);
}

#[tokio::test]
async fn test_submitted_transactions_reach_engine_queue() {
    let (engine, app) = bridge(Ledger::default(), Duration::from_secs(2)).await;
    let mut rx = engine.take_submit_receiver().unwrap();
    assert!(engine.take_submit_receiver().is_none());

    for i in 0..10u8 {
        app.submit_tx(vec![i]).await.unwrap();
    }

    for i in 0..10u8 {
        assert_eq!(rx.recv().await.unwrap(), vec![i]);
    }
    assert_eq!(rx.submitted(), 10);
}

#[tokio::test]
async fn test_snapshot_and_restore() {
    let (engine, _app) = bridge(Ledger::default(), Duration::from_secs(2)).await;

    assert_eq!(engine.get_snapshot(1).await.unwrap(), b"snapshot".to_vec());
    assert_eq!(engine.restore(b"snapshot").await.unwrap(), b"statehash".to_vec());
}

#[tokio::test]
async fn test_state_changes_delivered() {
    let (engine, app) = bridge(Ledger::default(), Duration::from_secs(2)).await;

    engine.on_state_changed(NodeState::CatchingUp).await.unwrap();
    engine.on_state_changed(NodeState::Babbling).await.unwrap();

    assert_eq!(
        *app.handler().states.lock(),
        vec![NodeState::CatchingUp, NodeState::Babbling]
    );
}

#[tokio::test]
async fn test_remote_errors_keep_their_kind() {
    struct CommitOnly;

    #[async_trait]
    impl ProxyHandler for CommitOnly {
        async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
            Err(ProxyError::application(format!("cannot apply {}", block.index())))
        }
    }

    let (engine, _app) = bridge(CommitOnly, Duration::from_secs(2)).await;

    let err = engine
        .commit_block(&Block::with_transactions(4, vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(err.message(), "cannot apply 4");

    let err = engine.get_snapshot(4).await.unwrap_err();
    assert!(err.is_unsupported());
    let err = engine.restore(b"x").await.unwrap_err();
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn test_slow_application_times_out() {
    let timeout = Duration::from_millis(200);
    let ledger = Ledger {
        delay: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let (engine, _app) = bridge(ledger, timeout).await;

    let started = Instant::now();
    let err = engine
        .commit_block(&Block::with_transactions(1, vec![]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    assert!(started.elapsed() < timeout + Duration::from_millis(500));
}

#[tokio::test]
async fn test_connection_lost_mid_commit() {
    let ledger = Ledger {
        delay: Some(Duration::from_millis(500)),
        ..Default::default()
    };
    let (engine, app) = bridge(ledger, Duration::from_secs(5)).await;
    let engine = Arc::new(engine);

    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .commit_block(&Block::with_transactions(1, vec![]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    drop(app);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_application_unreachable() {
    let config = quick(
        SocketConfig::new(loopback(), free_addr()),
        Duration::from_millis(300),
    );
    let engine = SocketAppProxy::bind(&config).await.unwrap();

    let err = engine
        .commit_block(&Block::with_transactions(1, vec![]))
        .await
        .unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_reconnects_after_application_restart() {
    let timeout = Duration::from_secs(2);
    let app_addr = free_addr();
    let engine = Arc::new(
        SocketAppProxy::bind(&quick(SocketConfig::new(loopback(), app_addr), timeout))
            .await
            .unwrap(),
    );
    let app_config = quick(SocketConfig::new(app_addr, engine.local_addr()), timeout);
    let driver = CommitDriver::new(engine.clone());

    let app = SocketAppClient::bind(&app_config, Idempotent::new(Ledger::default()))
        .await
        .unwrap();
    driver
        .commit_block(&Block::with_transactions(1, vec![]))
        .await
        .unwrap();
    drop(app);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let app = SocketAppClient::bind(&app_config, Idempotent::new(Ledger::default()))
        .await
        .unwrap();
    let response = driver
        .commit_block(&Block::with_transactions(2, vec![]))
        .await
        .unwrap();

    assert_eq!(response.state_hash, b"h2".to_vec());
    assert_eq!(driver.last_committed().await, Some(2));
    assert_eq!(*app.handler().inner().commits.lock(), vec![2]);
}

#[tokio::test]
async fn test_redelivered_block_is_not_applied_twice() {
    let (engine, app) = bridge(Idempotent::new(Ledger::default()), Duration::from_secs(2)).await;
    let (block, _, _) = membership_block(7);

    let first = engine.commit_block(&block).await.unwrap();
    let again = engine.commit_block(&block).await.unwrap();

    assert_eq!(first, again);
    assert_eq!(*app.handler().inner().commits.lock(), vec![7]);
}

#[tokio::test]
async fn test_failed_commit_does_not_advance_driver() {
    let (engine, app) = bridge(Ledger::default(), Duration::from_secs(2)).await;
    let driver = CommitDriver::new(Arc::new(engine));

    driver
        .commit_block(&Block::with_transactions(1, vec![]))
        .await
        .unwrap();
    let err = driver
        .commit_block(&Block::with_transactions(2, vec![b"poison".to_vec()]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(driver.last_committed().await, Some(1));

    driver
        .commit_block(&Block::with_transactions(2, vec![b"tx".to_vec()]))
        .await
        .unwrap();
    assert_eq!(*app.handler().commits.lock(), vec![1, 2]);
}

#[tokio::test]
async fn test_proxy_from_config() {
    let inmem = proxy_from_config(&ProxyConfig::Inmem, Some(Ledger::default()))
        .await
        .unwrap();
    let response = inmem
        .commit_block(&Block::with_transactions(3, vec![]))
        .await
        .unwrap();
    assert_eq!(response.state_hash, b"h3".to_vec());

    let err = proxy_from_config::<Ledger>(&ProxyConfig::Inmem, None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ProxyError::Config(_)));

    let socket = ProxyConfig::Socket(SocketConfig::new(loopback(), free_addr()));
    let proxy = proxy_from_config::<Ledger>(&socket, None).await.unwrap();
    assert!(proxy.take_submit_receiver().is_some());
}

/// Serves snapshots of a configurable size.
struct Bulk {
    snapshot_len: usize,
}

#[async_trait]
impl ProxyHandler for Bulk {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        let len: usize = block.transactions().iter().map(Vec::len).sum();
        Ok(CommitResponse::new(len.to_be_bytes().to_vec(), vec![]))
    }

    async fn snapshot_handler(&self, _block_index: u64) -> Result<Snapshot> {
        Ok(vec![200u8; self.snapshot_len])
    }

    async fn restore_handler(&self, snapshot: &[u8]) -> Result<StateHash> {
        Ok(snapshot.len().to_be_bytes().to_vec())
    }
}

const SIX_MIB: usize = 6 * 1024 * 1024;

#[tokio::test]
async fn test_large_payloads_cross_the_bridge() {
    let (engine, _app) = bridge(
        Bulk {
            snapshot_len: SIX_MIB,
        },
        Duration::from_secs(10),
    )
    .await;

    let snapshot = engine.get_snapshot(1).await.unwrap();
    assert_eq!(snapshot.len(), SIX_MIB);
    assert!(snapshot.iter().all(|b| *b == 200));

    let state_hash = engine.restore(&snapshot).await.unwrap();
    assert_eq!(state_hash, SIX_MIB.to_be_bytes().to_vec());

    let block = Block::with_transactions(1, vec![vec![7u8; SIX_MIB]]);
    let response = engine.commit_block(&block).await.unwrap();
    assert_eq!(response.state_hash, SIX_MIB.to_be_bytes().to_vec());
}

#[tokio::test]
async fn test_oversized_payloads_are_protocol_violations() {
    let oversized = 13 * 1024 * 1024;
    let (engine, _app) = bridge(
        Bulk {
            snapshot_len: oversized,
        },
        Duration::from_secs(10),
    )
    .await;

    // Too large to send: refused before touching the socket.
    let started = Instant::now();
    let err = engine.restore(&vec![1u8; oversized]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(!err.is_retriable());
    assert!(started.elapsed() < Duration::from_secs(5));

    // Too large to answer: the application reports it instead of hanging up.
    let err = engine.get_snapshot(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(!err.is_retriable());

    // The link is still usable.
    let response = engine
        .commit_block(&Block::with_transactions(1, vec![vec![1, 2, 3]]))
        .await
        .unwrap();
    assert_eq!(response.state_hash, 3usize.to_be_bytes().to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_over_socket() {
    const SUBMITTERS: usize = 8;
    const PER_SUBMITTER: usize = 50;

    let (engine, app) = bridge(Ledger::default(), Duration::from_secs(5)).await;
    let mut rx = engine.take_submit_receiver().unwrap();
    let app = Arc::new(app);

    let mut handles = Vec::new();
    for s in 0..SUBMITTERS {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_SUBMITTER {
                app.submit_tx(format!("{s}:{i}").into_bytes()).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for _ in 0..SUBMITTERS * PER_SUBMITTER {
        assert!(seen.insert(rx.recv().await.unwrap()));
    }
    assert!(rx.try_recv().is_none());
    assert_eq!(seen.len(), SUBMITTERS * PER_SUBMITTER);
}
