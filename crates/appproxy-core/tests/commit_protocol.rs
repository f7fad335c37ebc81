//! Commit protocol properties for the in-process proxy.
//!
//! These tests verify:
//! - blocks reach the handler in order, without gaps, while state changes race
//! - receipts mirror internal transactions in length and order
//! - redelivery after a failure replays the first response
//! - concurrent submitters lose and duplicate nothing

use appproxy_core::types::{
    Block, CommitResponse, InternalTransaction, NodeState, Peer, StateHash, TransactionType,
};
use appproxy_core::{
    AppProxy, CommitDriver, Idempotent, InmemProxy, ProxyError, ProxyHandler, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Records the order of commits and state changes.
#[derive(Default)]
struct Recorder {
    commits: RwLock<Vec<u64>>,
    states: RwLock<Vec<NodeState>>,
    /// Accept or refuse by the low bit of the peer's first key byte.
    verdict_by_key: bool,
}

#[async_trait]
impl ProxyHandler for Recorder {
    async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
        self.commits.write().push(block.index());
        tokio::task::yield_now().await;

        let receipts = block
            .internal_transactions()
            .iter()
            .map(|itx| {
                let accept = if self.verdict_by_key {
                    itx.peer().pub_key_hex.as_bytes().first().copied().unwrap_or(0) % 2 == 0
                } else {
                    true
                };
                if accept {
                    itx.as_accepted()
                } else {
                    itx.as_refused()
                }
            })
            .collect();
        Ok(CommitResponse::new(
            block.index().to_be_bytes().to_vec(),
            receipts,
        ))
    }

    async fn state_change_handler(&self, state: NodeState) -> Result<()> {
        self.states.write().push(state);
        Ok(())
    }

    async fn restore_handler(&self, snapshot: &[u8]) -> Result<StateHash> {
        Ok(snapshot.to_vec())
    }
}

fn internal_tx_strategy() -> impl Strategy<Value = InternalTransaction> {
    (
        prop_oneof![Just(TransactionType::PeerAdd), Just(TransactionType::PeerRemove)],
        "[0-9A-F]{4,16}",
        1024u16..65535,
    )
        .prop_map(|(kind, key, port)| {
            InternalTransaction::new(kind, Peer::new(key, format!("127.0.0.1:{port}"), ""))
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: blocks are delivered in exactly the order they were committed,
    /// even while state change notifications run concurrently.
    #[test]
    fn prop_in_order_delivery(start in 0u64..1000, count in 1usize..40) {
        let rt = runtime();
        let delivered = rt.block_on(async move {
            let proxy = Arc::new(InmemProxy::new(Recorder::default()));
            let driver = Arc::new(CommitDriver::new(proxy.clone()));

            let notifier = {
                let driver = driver.clone();
                tokio::spawn(async move {
                    for state in NodeState::ALL.iter().cycle().take(count * 2) {
                        driver.notify_state_changed(*state).await;
                        tokio::task::yield_now().await;
                    }
                })
            };

            for index in start..start + count as u64 {
                let block = Block::with_transactions(index, vec![index.to_le_bytes().to_vec()]);
                driver.commit_block(&block).await.unwrap();
            }
            notifier.await.unwrap();

            assert_eq!(proxy.handler().states.read().len(), count * 2);
            let commits = proxy.handler().commits.read().clone();
            commits
        });

        let expected: Vec<u64> = (start..start + count as u64).collect();
        prop_assert_eq!(delivered, expected);
    }

    /// Property: the receipt list has the same length and order as the block's
    /// internal transactions.
    #[test]
    fn prop_receipts_mirror_internal_transactions(
        itxs in prop::collection::vec(internal_tx_strategy(), 0..12)
    ) {
        let rt = runtime();
        let block = Block::new(1, 1, vec![], vec![], vec![], itxs.clone());
        let response = rt.block_on(async {
            let proxy = Arc::new(InmemProxy::new(Recorder {
                verdict_by_key: true,
                ..Default::default()
            }));
            CommitDriver::new(proxy).commit_block(&block).await.unwrap()
        });

        prop_assert_eq!(response.internal_transaction_receipts.len(), itxs.len());
        for (receipt, itx) in response.internal_transaction_receipts.iter().zip(&itxs) {
            prop_assert_eq!(&receipt.internal_transaction, itx);
        }
    }

    /// Property: redelivering an index yields the first response.
    #[test]
    fn prop_redelivery_is_idempotent(count in 1u64..20, replay in 0u64..20) {
        let replay = replay % count;
        let rt = runtime();
        let (first, again, applied) = rt.block_on(async move {
            let proxy = InmemProxy::new(Idempotent::new(Recorder::default()));
            let mut responses = Vec::new();
            for index in 0..count {
                let block = Block::with_transactions(index, vec![]);
                responses.push(proxy.commit_block(&block).await.unwrap());
            }
            let again = proxy
                .commit_block(&Block::with_transactions(replay, vec![]))
                .await
                .unwrap();
            let applied = proxy.handler().inner().commits.read().len();
            (responses[replay as usize].clone(), again, applied)
        });

        prop_assert_eq!(first, again);
        prop_assert_eq!(applied as u64, count);
    }
}

#[tokio::test]
async fn test_add_and_remove_receipts_in_order() {
    let add = InternalTransaction::new(
        TransactionType::PeerAdd,
        Peer::new("0A11CE", "127.0.0.1:1001", "alice"),
    );
    let remove = InternalTransaction::new(
        TransactionType::PeerRemove,
        Peer::new("1B0B", "127.0.0.1:1002", "bob"),
    );
    let block = Block::new(1, 1, vec![], vec![], vec![], vec![add.clone(), remove.clone()]);

    // Keys starting with '0' are accepted, '1' refused.
    let proxy = Arc::new(InmemProxy::new(Recorder {
        verdict_by_key: true,
        ..Default::default()
    }));
    let response = CommitDriver::new(proxy).commit_block(&block).await.unwrap();

    assert_eq!(response.internal_transaction_receipts.len(), 2);
    assert_eq!(response.internal_transaction_receipts[0].internal_transaction, add);
    assert!(response.internal_transaction_receipts[0].accepted);
    assert_eq!(response.internal_transaction_receipts[1].internal_transaction, remove);
    assert!(!response.internal_transaction_receipts[1].accepted);
}

#[tokio::test]
async fn test_redelivery_after_failure_matches_first_response() {
    /// Fails the first attempt at index 2 after applying it, as a transport
    /// drop after the application committed would look to the engine.
    struct LossyAck {
        inner: Idempotent<Recorder>,
        dropped: RwLock<bool>,
    }

    #[async_trait]
    impl ProxyHandler for LossyAck {
        async fn commit_handler(&self, block: &Block) -> Result<CommitResponse> {
            let response = self.inner.commit_handler(block).await?;
            if block.index() == 2 && !*self.dropped.read() {
                *self.dropped.write() = true;
                return Err(ProxyError::transport("connection reset"));
            }
            Ok(response)
        }
    }

    let proxy = Arc::new(InmemProxy::new(LossyAck {
        inner: Idempotent::new(Recorder::default()),
        dropped: RwLock::new(false),
    }));
    let driver = CommitDriver::new(proxy.clone());

    driver
        .commit_block(&Block::with_transactions(1, vec![]))
        .await
        .unwrap();
    let block = Block::with_transactions(2, vec![b"tx".to_vec()]);
    let err = driver.commit_block(&block).await.unwrap_err();
    assert!(err.is_retriable());

    let response = driver.commit_block(&block).await.unwrap();
    assert_eq!(response.state_hash, 2u64.to_be_bytes().to_vec());
    assert_eq!(*proxy.handler().inner.inner().commits.read(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_reach_consumer() {
    const SUBMITTERS: usize = 16;
    const PER_SUBMITTER: usize = 100;

    let proxy = Arc::new(InmemProxy::new(Recorder::default()));
    let mut rx = proxy.take_submit_receiver().unwrap();

    let mut handles = Vec::new();
    for s in 0..SUBMITTERS {
        let proxy = proxy.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_SUBMITTER {
                proxy.submit_tx(format!("{s}:{i}").into_bytes());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..SUBMITTERS * PER_SUBMITTER {
        let tx = rx.recv().await.unwrap();
        assert!(seen.insert(tx));
    }
    assert!(rx.try_recv().is_none());
    assert_eq!(seen.len(), SUBMITTERS * PER_SUBMITTER);
}
