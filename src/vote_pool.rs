//! Vote pool + QC assembler (C7): collects validator votes per
//! `(height, round, blockHash)` target, detects equivocation, and
//! assembles quorum certificates once accepted weight clears
//! `required = floor(2*total/3) + 1`.
//!
//! Reader-writer policy per the concurrency model: `tally`/`build_qc` take
//! a shared guard, `add_vote`/`prune_below` take an exclusive one, and
//! equivocation detection happens under that same exclusive guard so two
//! concurrent conflicting votes for one validator/round yield exactly one
//! `Equivocation`.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::crypto::Hash;
use crate::types::{BlockHeight, Qc, Vote};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("vote is structurally invalid")]
    InvalidVote,
    #[error("validator already voted for a different block at this height/round")]
    Equivocation,
}

pub fn required_weight(total: u64) -> u64 {
    let q = (2 * total) / 3 + 1;
    q.max(1)
}

type Target = (BlockHeight, u64, Hash);

#[derive(Default)]
struct PoolInner {
    /// Accepted votes, keyed by the full target so multiple blockHash
    /// candidates at the same (height, round) are tracked independently.
    votes: HashMap<Target, Vec<Vote>>,
    /// The validator's single accepted `(round, blockHash)` per height,
    /// used to detect a second vote for a different hash.
    voted_hash: HashMap<(BlockHeight, u64, alloy_primitives::Address), Hash>,
    weight_sum: HashMap<Target, u64>,
}

pub struct VotePool {
    total_weight: u64,
    inner: RwLock<PoolInner>,
}

impl VotePool {
    pub fn new(total_weight: u64) -> Self {
        Self {
            total_weight,
            inner: RwLock::new(PoolInner::default()),
        }
    }

    fn required(&self) -> u64 {
        required_weight(self.total_weight)
    }

    /// Returns `(added, error)`. A structural defect is `InvalidVote`; a
    /// conflicting prior vote from the same validator/round is
    /// `Equivocation` (the earlier vote is preserved); an exact duplicate
    /// of an already-accepted vote is `(false, None)`.
    pub async fn add_vote(&self, vote: Vote) -> (bool, Option<PoolError>) {
        if vote.weight == 0 {
            return (false, Some(PoolError::InvalidVote));
        }

        let mut inner = self.inner.write().await;
        let key = (vote.height, vote.round, vote.validator);

        if let Some(existing_hash) = inner.voted_hash.get(&key).copied() {
            if existing_hash == vote.block_hash {
                return (false, None);
            }
            return (false, Some(PoolError::Equivocation));
        }

        inner.voted_hash.insert(key, vote.block_hash);
        let target = (vote.height, vote.round, vote.block_hash);
        *inner.weight_sum.entry(target).or_insert(0) += vote.weight;
        inner.votes.entry(target).or_default().push(vote);
        (true, None)
    }

    /// Returns `(qc, true)` iff accumulated weight at the target meets
    /// `required`; `(_, false)` otherwise — quorum-not-ready is a
    /// protocol state, not an error.
    pub async fn build_qc(&self, height: BlockHeight, round: u64, block_hash: Hash) -> (Option<Qc>, bool) {
        let inner = self.inner.read().await;
        let target = (height, round, block_hash);
        let total = inner.weight_sum.get(&target).copied().unwrap_or(0);
        let required = self.required();
        if total < required {
            return (None, false);
        }
        let attestations = inner.votes.get(&target).cloned().unwrap_or_default();
        let qc = Qc {
            height,
            round,
            block_hash,
            total_weight: total,
            required,
            attestations,
        };
        (Some(qc), true)
    }

    pub async fn tally(&self, height: BlockHeight, round: u64, block_hash: Hash) -> (u64, usize) {
        let inner = self.inner.read().await;
        let target = (height, round, block_hash);
        let weight = inner.weight_sum.get(&target).copied().unwrap_or(0);
        let count = inner.votes.get(&target).map(Vec::len).unwrap_or(0);
        (weight, count)
    }

    /// Discards all state strictly below `height` in one pass.
    pub async fn prune_below(&self, height: BlockHeight) {
        let mut inner = self.inner.write().await;
        inner.votes.retain(|(h, _, _), _| *h >= height);
        inner.weight_sum.retain(|(h, _, _), _| *h >= height);
        inner.voted_hash.retain(|(h, _, _), _| *h >= height);
    }
}
