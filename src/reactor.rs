//! Reactor (C8): glues inbound/outbound votes to the pool. Owns
//! non-owning handles to the pool and to a broadcaster capability
//! registered at construction rather than holding a back-reference —
//! the cyclic pool/reactor/broadcaster relationship the teacher expresses
//! through callback registration, not shared mutable state.

use std::sync::Arc;

use crate::crypto::Hash;
use crate::types::{BlockHeight, Qc, Vote};
use crate::vote_pool::VotePool;

/// Notified once per assembled QC. Broadcast is fire-and-forget; any send
/// error is logged and dropped rather than stalling consensus.
pub trait Broadcaster: Send + Sync {
    fn broadcast_vote(&self, vote: &Vote);
    fn broadcast_qc(&self, qc: &Qc);
}

/// Invoked once per assembled QC, before broadcast. Separate from
/// `Broadcaster` so a test can observe QC completion without wiring up
/// network plumbing.
pub trait QcCallback: Send + Sync {
    fn on_qc(&self, qc: &Qc);
}

pub struct Reactor {
    pool: Arc<VotePool>,
    broadcaster: Arc<dyn Broadcaster>,
    qc_callback: Arc<dyn QcCallback>,
}

impl Reactor {
    pub fn new(pool: Arc<VotePool>, broadcaster: Arc<dyn Broadcaster>, qc_callback: Arc<dyn QcCallback>) -> Self {
        Self {
            pool,
            broadcaster,
            qc_callback,
        }
    }

    /// Forwards to `add_vote`, then attempts `build_qc`. On success
    /// invokes the QC callback and broadcasts the QC. Returns the QC if
    /// quorum was reached by this call, `None` otherwise (including on a
    /// rejected/duplicate vote).
    pub async fn handle_incoming_vote(&self, vote: Vote) -> Option<Qc> {
        let (height, round, block_hash) = (vote.height, vote.round, vote.block_hash);
        let (added, err) = self.pool.add_vote(vote).await;
        if let Some(err) = err {
            log::warn!("reactor.handle_incoming_vote rejected: {err}");
        }
        if !added {
            return None;
        }
        self.try_complete_qc(height, round, block_hash).await
    }

    /// Forwards a locally-produced vote to `add_vote`; broadcasts it only
    /// if genuinely new (the idempotence rule — a duplicate local
    /// proposal never rebroadcasts). If the add also completes a QC,
    /// callback + QC broadcast fire immediately.
    pub async fn propose_vote(&self, vote: Vote) -> Option<Qc> {
        let (height, round, block_hash) = (vote.height, vote.round, vote.block_hash);
        let (added, err) = self.pool.add_vote(vote.clone()).await;
        if let Some(err) = err {
            log::warn!("reactor.propose_vote rejected: {err}");
            return None;
        }
        if !added {
            return None;
        }

        self.broadcaster.broadcast_vote(&vote);
        self.try_complete_qc(height, round, block_hash).await
    }

    async fn try_complete_qc(&self, height: BlockHeight, round: u64, block_hash: Hash) -> Option<Qc> {
        let (qc, ready) = self.pool.build_qc(height, round, block_hash).await;
        if !ready {
            return None;
        }
        let qc = qc.expect("ready implies a QC was produced");
        self.qc_callback.on_qc(&qc);
        self.broadcaster.broadcast_qc(&qc);
        Some(qc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

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

    fn vote(validator: u8, weight: u64) -> Vote {
        Vote {
            height: 1,
            round: 0,
            block_hash: Hash([0xAA; 32]),
            validator: Address::repeat_byte(validator),
            weight,
            signature: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_local_proposal_does_not_rebroadcast() {
        let pool = Arc::new(VotePool::new(30));
        let sink = Arc::new(RecordingSink::default());
        let callback = Arc::new(CountingCallback::default());
        let reactor = Reactor::new(pool, sink.clone(), callback);

        let v = vote(1, 10);
        reactor.propose_vote(v.clone()).await;
        reactor.propose_vote(v).await;

        assert_eq!(sink.votes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incoming_votes_complete_qc_and_notify_once() {
        let pool = Arc::new(VotePool::new(30));
        let sink = Arc::new(RecordingSink::default());
        let callback = Arc::new(CountingCallback::default());
        let reactor = Reactor::new(pool, sink.clone(), callback.clone());

        assert!(reactor.handle_incoming_vote(vote(1, 10)).await.is_none());
        let qc = reactor.handle_incoming_vote(vote(2, 11)).await;

        assert!(qc.is_some());
        assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.qcs.load(Ordering::SeqCst), 1);
    }
}
