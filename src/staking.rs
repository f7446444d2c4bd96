//! Staking state (C4): validator self-stake, delegation shares, the
//! reward-per-share accumulator, pending rewards, and lock windows.
//!
//! `ValidatorEntry`/`Delegation` live in the validator's and delegator's
//! own account storage respectively (per-account field slots derived by
//! [`crate::slot`]); C6 (validator registry) and C9 (reward distributor)
//! share these same slots rather than keeping a parallel copy.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::config::{ChainConfig, REWARD_SCALE};
use crate::slot;
use crate::state::{StateError, StateManager};
use crate::types::{Delegation, ValidatorEntry, ValidatorStatus};

#[derive(Debug, Error)]
pub enum StakingError {
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("commissionBps {0} exceeds the 5000 bps maximum")]
    CommissionTooHigh(u32),
    #[error("validator is not active")]
    NotActive,
    #[error("insufficient delegated shares")]
    InsufficientShares,
    #[error(transparent)]
    State(#[from] StateError),
}

/// Network-wide sum of active stake, stored on the zero-address sentinel
/// per spec §6 ("networkStake ... for the zero-address sentinel").
const NETWORK_STAKE_OWNER: Address = Address::ZERO;

pub fn read_validator(state: &StateManager, node: Address) -> Result<ValidatorEntry, StakingError> {
    Ok(ValidatorEntry {
        self_stake: read_u256(state, node, slot::F_SELF_STAKE)?,
        status: read_u256(state, node, slot::F_STATUS)?.to::<u64>() as u8,
        commission_bps: read_u256(state, node, slot::F_COMMISSION)?.to::<u64>() as u32,
        reward_per_share: read_u256(state, node, slot::F_REWARD_PER_SHARE)?,
        total_stake: read_u256(state, node, slot::F_TOTAL_STAKE)?,
        unstake_unlock_block: read_u256(state, node, slot::F_UNSTAKE_UNLOCK)?.to::<u64>(),
        registered: read_bool(state, node, slot::F_REGISTERED)?,
    })
}

pub fn write_validator(state: &StateManager, node: Address, v: &ValidatorEntry) -> Result<(), StakingError> {
    write_u256(state, node, slot::F_SELF_STAKE, v.self_stake)?;
    write_u256(state, node, slot::F_STATUS, U256::from(v.status))?;
    write_u256(state, node, slot::F_COMMISSION, U256::from(v.commission_bps))?;
    write_u256(state, node, slot::F_REWARD_PER_SHARE, v.reward_per_share)?;
    write_u256(state, node, slot::F_TOTAL_STAKE, v.total_stake)?;
    write_u256(state, node, slot::F_UNSTAKE_UNLOCK, U256::from(v.unstake_unlock_block))?;
    write_bool(state, node, slot::F_REGISTERED, v.registered)?;
    Ok(())
}

pub fn read_delegation(state: &StateManager, delegator: Address, node: Address) -> Result<Delegation, StakingError> {
    Ok(Delegation {
        shares: read_u256_deleg(state, delegator, node, slot::F_DELEG_SHARES)?,
        reward_debt: read_u256_deleg(state, delegator, node, slot::F_DELEG_REWARD_DEBT)?,
        undelegate_unlock_block: read_u256_deleg(state, delegator, node, slot::F_DELEG_UNLOCK)?.to::<u64>(),
    })
}

pub fn write_delegation(
    state: &StateManager,
    delegator: Address,
    node: Address,
    d: &Delegation,
) -> Result<(), StakingError> {
    write_u256_deleg(state, delegator, node, slot::F_DELEG_SHARES, d.shares)?;
    write_u256_deleg(state, delegator, node, slot::F_DELEG_REWARD_DEBT, d.reward_debt)?;
    write_u256_deleg(
        state,
        delegator,
        node,
        slot::F_DELEG_UNLOCK,
        U256::from(d.undelegate_unlock_block),
    )?;
    Ok(())
}

pub fn read_pending_reward(state: &StateManager, addr: Address) -> Result<U256, StakingError> {
    read_u256(state, addr, slot::F_PENDING_REWARD)
}

pub fn write_pending_reward(state: &StateManager, addr: Address, amount: U256) -> Result<(), StakingError> {
    write_u256(state, addr, slot::F_PENDING_REWARD, amount)
}

pub fn read_network_stake(state: &StateManager) -> Result<U256, StakingError> {
    read_u256(state, NETWORK_STAKE_OWNER, slot::F_NETWORK_STAKE)
}

pub fn write_network_stake(state: &StateManager, value: U256) -> Result<(), StakingError> {
    write_u256(state, NETWORK_STAKE_OWNER, slot::F_NETWORK_STAKE, value)
}

/// `stake`: fails if amount is zero or commission exceeds 5000 bps.
/// Commission is recorded only the first time a node receives stake;
/// thereafter it stays immutable while active. Transitions to Active once
/// `selfStake >= MinNodeStake`.
pub fn stake(
    state: &StateManager,
    cfg: &ChainConfig,
    node: Address,
    amount: U256,
    commission_bps: u32,
    _current_block: u64,
) -> Result<(), StakingError> {
    if amount.is_zero() {
        return Err(StakingError::ZeroAmount);
    }
    if commission_bps as u64 > cfg.max_commission_bps as u64 {
        return Err(StakingError::CommissionTooHigh(commission_bps));
    }

    let mut v = read_validator(state, node)?;
    let first_stake = v.self_stake.is_zero();
    v.self_stake += amount;
    v.total_stake += amount;
    if first_stake {
        v.commission_bps = commission_bps;
    }
    if v.self_stake >= cfg.min_node_stake {
        v.status = ValidatorStatus::Active as u8;
    }
    write_validator(state, node, &v)?;

    let network_stake = read_network_stake(state)? + amount;
    write_network_stake(state, network_stake)?;

    log::info!("staking.stake node={node:?} amount={amount} first_stake={first_stake}");
    Ok(())
}

/// `unstake`: a nil/zero/over-balance amount removes the full self-stake.
/// Funds return immediately in this MVP even though `unstakeUnlockBlock`
/// is recorded (spec's documented open question).
pub fn unstake(
    state: &StateManager,
    cfg: &ChainConfig,
    node: Address,
    amount: Option<U256>,
    current_block: u64,
) -> Result<U256, StakingError> {
    let mut v = read_validator(state, node)?;
    let withdraw = match amount {
        Some(a) if !a.is_zero() && a <= v.self_stake => a,
        _ => v.self_stake,
    };

    v.self_stake -= withdraw;
    v.total_stake -= withdraw;
    v.unstake_unlock_block = current_block + cfg.unstake_lock_blocks;
    if v.self_stake < cfg.min_node_stake {
        v.status = ValidatorStatus::Inactive as u8;
    }
    write_validator(state, node, &v)?;

    let network_stake = read_network_stake(state)?.saturating_sub(withdraw);
    write_network_stake(state, network_stake)?;

    log::info!("staking.unstake node={node:?} amount={withdraw}");
    Ok(withdraw)
}

/// Shares are issued 1:1 with staked wei. On a delegator's first
/// delegation to this validator, snapshot `rewardPerShare` into
/// `rewardDebt` so past rewards aren't retroactively claimed.
pub fn delegate(
    state: &StateManager,
    delegator: Address,
    node: Address,
    amount: U256,
) -> Result<(), StakingError> {
    if amount.is_zero() {
        return Err(StakingError::ZeroAmount);
    }

    let validator = read_validator(state, node)?;
    let mut d = read_delegation(state, delegator, node)?;
    if d.shares.is_zero() {
        d.reward_debt = validator.reward_per_share;
    }
    d.shares += amount;
    write_delegation(state, delegator, node, &d)?;

    let mut v = validator;
    v.total_stake += amount;
    write_validator(state, node, &v)?;

    let network_stake = read_network_stake(state)? + amount;
    write_network_stake(state, network_stake)?;

    log::info!("staking.delegate delegator={delegator:?} node={node:?} amount={amount}");
    Ok(())
}

/// Settles accrued rewards first, then decrements shares/totals and
/// records the lock block. Funds return immediately in this MVP.
pub fn undelegate(
    state: &StateManager,
    cfg: &ChainConfig,
    delegator: Address,
    node: Address,
    shares: Option<U256>,
    current_block: u64,
) -> Result<U256, StakingError> {
    settle(state, delegator, node)?;

    let mut d = read_delegation(state, delegator, node)?;
    let withdraw = match shares {
        Some(s) if !s.is_zero() => {
            if s > d.shares {
                return Err(StakingError::InsufficientShares);
            }
            s
        }
        _ => d.shares,
    };

    d.shares -= withdraw;
    d.undelegate_unlock_block = current_block + cfg.undelegate_lock_blocks;
    write_delegation(state, delegator, node, &d)?;

    let mut v = read_validator(state, node)?;
    v.total_stake = v.total_stake.saturating_sub(withdraw);
    write_validator(state, node, &v)?;

    let network_stake = read_network_stake(state)?.saturating_sub(withdraw);
    write_network_stake(state, network_stake)?;

    log::info!("staking.undelegate delegator={delegator:?} node={node:?} shares={withdraw}");
    Ok(withdraw)
}

/// `claim_reward`: if `node` is given, settle that delegation first, then
/// pay out and clear `pendingReward`.
pub fn claim_reward(state: &StateManager, addr: Address, node: Option<Address>) -> Result<U256, StakingError> {
    if let Some(node) = node {
        settle(state, addr, node)?;
    }
    let pending = read_pending_reward(state, addr)?;
    write_pending_reward(state, addr, U256::ZERO)?;
    log::info!("staking.claim_reward addr={addr:?} amount={pending}");
    Ok(pending)
}

/// `earned = shares * (rewardPerShare - rewardDebt) / 10^18`, moved into
/// `pendingReward(delegator)`; `rewardDebt` snapshot updated.
fn settle(state: &StateManager, delegator: Address, node: Address) -> Result<(), StakingError> {
    let v = read_validator(state, node)?;
    let mut d = read_delegation(state, delegator, node)?;

    if d.shares.is_zero() {
        d.reward_debt = v.reward_per_share;
        write_delegation(state, delegator, node, &d)?;
        return Ok(());
    }

    if v.reward_per_share > d.reward_debt {
        let delta = v.reward_per_share - d.reward_debt;
        let earned = (d.shares * delta) / U256::from(REWARD_SCALE);
        if !earned.is_zero() {
            let pending = read_pending_reward(state, delegator)? + earned;
            write_pending_reward(state, delegator, pending)?;
        }
    }
    d.reward_debt = v.reward_per_share;
    write_delegation(state, delegator, node, &d)?;
    Ok(())
}

fn read_u256(state: &StateManager, owner: Address, field: &str) -> Result<U256, StakingError> {
    Ok(slot::read_u256(&state.get_slot(owner, slot::field_slot(field))?))
}

fn write_u256(state: &StateManager, owner: Address, field: &str, v: U256) -> Result<(), StakingError> {
    let mut buf = [0u8; 32];
    slot::write_u256(&mut buf, v);
    state.set_slot(owner, slot::field_slot(field), buf)?;
    Ok(())
}

fn read_bool(state: &StateManager, owner: Address, field: &str) -> Result<bool, StakingError> {
    Ok(slot::read_bool(&state.get_slot(owner, slot::field_slot(field))?))
}

fn write_bool(state: &StateManager, owner: Address, field: &str, b: bool) -> Result<(), StakingError> {
    let mut buf = [0u8; 32];
    slot::write_bool(&mut buf, b);
    state.set_slot(owner, slot::field_slot(field), buf)?;
    Ok(())
}

fn read_u256_deleg(state: &StateManager, delegator: Address, node: Address, field: &str) -> Result<U256, StakingError> {
    Ok(slot::read_u256(
        &state.get_slot(delegator, slot::delegation_field_slot(field, node))?,
    ))
}

fn write_u256_deleg(
    state: &StateManager,
    delegator: Address,
    node: Address,
    field: &str,
    v: U256,
) -> Result<(), StakingError> {
    let mut buf = [0u8; 32];
    slot::write_u256(&mut buf, v);
    state.set_slot(delegator, slot::delegation_field_slot(field, node), buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use std::sync::Arc;

    fn fresh() -> (StateManager, ChainConfig) {
        (StateManager::new(Arc::new(MemStorage::new()), None), ChainConfig::default())
    }

    #[test]
    fn stake_activates_once_min_reached_and_locks_commission() {
        let (state, cfg) = fresh();
        let node = Address::repeat_byte(0x01);
        stake(&state, &cfg, node, cfg.min_node_stake, 500, 1).unwrap();
        let v = read_validator(&state, node).unwrap();
        assert_eq!(v.status(), ValidatorStatus::Active);
        assert_eq!(v.commission_bps, 500);

        stake(&state, &cfg, node, U256::from(1u64), 4_999, 2).unwrap();
        let v = read_validator(&state, node).unwrap();
        assert_eq!(v.commission_bps, 500, "commission immutable after first stake");
    }

    #[test]
    fn delegate_and_settle_reward_per_share() {
        let (state, cfg) = fresh();
        let node = Address::repeat_byte(0x02);
        let delegator = Address::repeat_byte(0x03);
        stake(&state, &cfg, node, cfg.min_node_stake, 0, 1).unwrap();
        delegate(&state, delegator, node, U256::from(1_000u64)).unwrap();

        let mut v = read_validator(&state, node).unwrap();
        v.reward_per_share += U256::from(REWARD_SCALE); // 1 wei per share
        write_validator(&state, node, &v).unwrap();

        let paid = claim_reward(&state, delegator, Some(node)).unwrap();
        assert_eq!(paid, U256::from(1_000u64));
        assert_eq!(read_pending_reward(&state, delegator).unwrap(), U256::ZERO);
    }

    #[test]
    fn global_stake_tracks_total_stake_sum() {
        let (state, cfg) = fresh();
        let n1 = Address::repeat_byte(0x10);
        let n2 = Address::repeat_byte(0x11);
        stake(&state, &cfg, n1, cfg.min_node_stake, 0, 1).unwrap();
        stake(&state, &cfg, n2, cfg.min_node_stake, 0, 1).unwrap();

        let v1 = read_validator(&state, n1).unwrap();
        let v2 = read_validator(&state, n2).unwrap();
        let network_stake = read_network_stake(&state).unwrap();
        assert_eq!(network_stake, v1.total_stake + v2.total_stake);
    }
}
