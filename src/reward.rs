//! Reward distributor (C9): at block finalization, mints the per-block
//! reward for each contributing node and splits it between operator
//! commission (pending reward) and the delegator pool (reward-per-share
//! delta). Phase 1 callers pass just the block proposer; the loop shape
//! supports more nodes per call without change.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::config::{REWARD_SCALE, STAKING_RESERVE_ADDRESS};
use crate::staking::{read_validator, write_validator, StakingError};
use crate::state::{StateError, StateManager};

#[derive(Debug, Error)]
pub enum RewardError {
    #[error(transparent)]
    Staking(#[from] StakingError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Distributes `block_reward` across `nodes`, weighting each by
/// `nodeTotalStake / networkTotalStake`. A node with zero computed share
/// (rounds down to 0) is skipped entirely — no state touched, no event.
pub fn distribute(
    state: &StateManager,
    block_reward: U256,
    network_total_stake: U256,
    nodes: &[Address],
) -> Result<(), RewardError> {
    if network_total_stake.is_zero() {
        log::warn!("reward.distribute skipped: network_total_stake is zero");
        return Ok(());
    }

    for &node in nodes {
        let mut v = read_validator(state, node)?;
        if v.total_stake.is_zero() {
            continue;
        }

        let node_share = block_reward * v.total_stake / network_total_stake;
        if node_share.is_zero() {
            continue;
        }

        let commission = node_share * U256::from(v.commission_bps) / U256::from(10_000u64);
        let delegator_pool = node_share - commission;
        let total_stake = v.total_stake;

        v.reward_per_share_apply(commission, delegator_pool, total_stake);
        write_validator(state, node, &v)?;

        if !commission.is_zero() {
            let mut pending = crate::staking::read_pending_reward(state, node)?;
            pending += commission;
            crate::staking::write_pending_reward(state, node, pending)?;
        }

        state.credit(STAKING_RESERVE_ADDRESS, node_share)?;

        log::info!(
            "reward.distribute node={node:?} node_share={node_share} commission={commission} delegator_pool={delegator_pool}"
        );
    }
    Ok(())
}

/// Small helper extension kept local to this module: applying a reward
/// split to a `ValidatorEntry` is the one place `rewardPerShare` is
/// mutated from outside `staking::settle`.
trait ApplyRewardSplit {
    fn reward_per_share_apply(&mut self, commission: U256, delegator_pool: U256, total_stake: U256);
}

impl ApplyRewardSplit for crate::types::ValidatorEntry {
    fn reward_per_share_apply(&mut self, _commission: U256, delegator_pool: U256, total_stake: U256) {
        if !delegator_pool.is_zero() && !total_stake.is_zero() {
            self.reward_per_share += delegator_pool * U256::from(REWARD_SCALE) / total_stake;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::{delegate, stake};
    use crate::storage::MemStorage;
    use crate::config::ChainConfig;
    use std::sync::Arc;

    fn fresh() -> (StateManager, ChainConfig) {
        (StateManager::new(Arc::new(MemStorage::new()), None), ChainConfig::default())
    }

    #[test]
    fn commission_and_delegator_pool_split_and_reward_per_share_is_monotonic() {
        let (state, cfg) = fresh();
        let node = Address::repeat_byte(0x01);
        let delegator = Address::repeat_byte(0x02);
        stake(&state, &cfg, node, cfg.min_node_stake, 1_000, 1).unwrap(); // 10% commission
        delegate(&state, delegator, node, U256::from(5_000u64)).unwrap();

        let before = read_validator(&state, node).unwrap().reward_per_share;
        let network_stake = crate::staking::read_network_stake(&state).unwrap();
        distribute(&state, U256::from(1_000_000u64), network_stake, &[node]).unwrap();
        let after = read_validator(&state, node).unwrap();

        assert!(after.reward_per_share > before);
        let pending = crate::staking::read_pending_reward(&state, node).unwrap();
        assert!(!pending.is_zero(), "operator commission should be pending");
        assert!(!state.get_balance(STAKING_RESERVE_ADDRESS).unwrap().is_zero());
    }

    #[test]
    fn zero_total_stake_node_is_skipped_without_error() {
        let (state, cfg) = fresh();
        let node = Address::repeat_byte(0x03);
        let _ = cfg;
        distribute(&state, U256::from(100u64), U256::from(1u64), &[node]).unwrap();
        assert_eq!(read_validator(&state, node).unwrap().reward_per_share, U256::ZERO);
    }
}
