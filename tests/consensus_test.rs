//! Vote pool / reactor scenarios at the quorum-math level named in the
//! spec's testable properties.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes};
use gtos_core::crypto::Hash;
use gtos_core::reactor::{Broadcaster, QcCallback, Reactor};
use gtos_core::types::{Qc, Vote};
use gtos_core::vote_pool::{required_weight, PoolError, VotePool};

fn vote(height: u64, round: u64, hash: u8, validator: u8, weight: u64) -> Vote {
    Vote {
        height,
        round,
        block_hash: Hash([hash; 32]),
        validator: Address::repeat_byte(validator),
        weight,
        signature: Bytes::new(),
    }
}

#[tokio::test]
async fn scenario_quorum_assembly_at_total_30() {
    let pool = VotePool::new(30);
    assert_eq!(required_weight(30), 21);

    let (added, err) = pool.add_vote(vote(10, 1, 0x10, 1, 10)).await;
    assert!(added && err.is_none());
    let (qc, ready) = pool.build_qc(10, 1, Hash([0x10; 32])).await;
    assert!(!ready && qc.is_none());

    let (added, err) = pool.add_vote(vote(10, 1, 0x10, 2, 11)).await;
    assert!(added && err.is_none());
    let (qc, ready) = pool.build_qc(10, 1, Hash([0x10; 32])).await;
    assert!(ready);
    let qc = qc.unwrap();
    assert_eq!(qc.total_weight, 21);
    assert_eq!(qc.required, 21);
    assert!(qc.verify());
}

#[tokio::test]
async fn scenario_equivocation_rejected_first_vote_kept() {
    let pool = VotePool::new(30);
    let (added, err) = pool.add_vote(vote(20, 2, 0x20, 1, 10)).await;
    assert!(added && err.is_none());

    let (added, err) = pool.add_vote(vote(20, 2, 0x21, 1, 10)).await;
    assert!(!added);
    assert_eq!(err, Some(PoolError::Equivocation));

    let (weight, count) = pool.tally(20, 2, Hash([0x20; 32])).await;
    assert_eq!(weight, 10);
    assert_eq!(count, 1);
}

#[derive(Default)]
struct RecordingSink {
    votes: Mutex<Vec<Vote>>,
    qcs: AtomicUsize,
}

impl Broadcaster for RecordingSink {
    fn broadcast_vote(&self, vote: &Vote) {
        self.votes.lock().unwrap().push(vote.clone());
    }
    fn broadcast_qc(&self, _qc: &Qc) {
        self.qcs.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingCallback {
    calls: AtomicUsize,
}

impl QcCallback for CountingCallback {
    fn on_qc(&self, _qc: &Qc) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn reactor_idempotence_duplicate_proposal_never_rebroadcasts() {
    let pool = Arc::new(VotePool::new(30));
    let sink = Arc::new(RecordingSink::default());
    let callback = Arc::new(CountingCallback::default());
    let reactor = Reactor::new(pool, sink.clone(), callback);

    let v = vote(1, 0, 0xAA, 5, 10);
    reactor.propose_vote(v.clone()).await;
    reactor.propose_vote(v).await;

    assert_eq!(sink.votes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reactor_emits_qc_callback_exactly_once_on_quorum() {
    let pool = Arc::new(VotePool::new(30));
    let sink = Arc::new(RecordingSink::default());
    let callback = Arc::new(CountingCallback::default());
    let reactor = Reactor::new(pool, sink.clone(), callback.clone());

    assert!(reactor.handle_incoming_vote(vote(7, 0, 0xBB, 1, 10)).await.is_none());
    let qc = reactor.handle_incoming_vote(vote(7, 0, 0xBB, 2, 11)).await;

    assert!(qc.is_some());
    assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.qcs.load(Ordering::SeqCst), 1);
}
