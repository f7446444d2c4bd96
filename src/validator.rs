//! Validator registry (C6): REGISTER/WITHDRAW and the deterministic
//! active-set selection every implementation must reproduce byte-for-byte
//! (the final address-ascending order is the round-robin order the
//! consensus engine uses).

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::config::{ChainConfig, VALIDATOR_REGISTRY_ADDRESS};
use crate::slot;
use crate::staking::{read_validator, write_validator, StakingError};
use crate::state::{StateError, StateManager};
use crate::types::ValidatorStatus;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("stake {0} is below the minimum validator stake")]
    BelowMinimumStake(U256),
    #[error("sender balance insufficient to cover the transferred stake")]
    InsufficientBalance,
    #[error("validator already registered and active")]
    AlreadyRegistered,
    #[error("validator is not active")]
    NotActive,
    #[error("registry balance invariant violated: balance < sum of active self-stake")]
    InvariantViolated,
    #[error(transparent)]
    Staking(#[from] StakingError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Four-phase REGISTER:
/// (a) `value >= MinValidatorStake`
/// (b) explicit sender-balance check (legacy gas accounting gap)
/// (c) reject duplicate active registration
/// (d) detect first-ever registration via the permanent `registered` flag
pub fn register(
    state: &StateManager,
    cfg: &ChainConfig,
    sender: Address,
    value: U256,
    current_block: u64,
) -> Result<(), ValidatorError> {
    if value < cfg.min_validator_stake {
        return Err(ValidatorError::BelowMinimumStake(value));
    }

    let sender_balance = state.get_balance(sender)?;
    if sender_balance < value {
        return Err(ValidatorError::InsufficientBalance);
    }

    let mut v = read_validator(state, sender)?;
    if !v.self_stake.is_zero() {
        return Err(ValidatorError::AlreadyRegistered);
    }

    let first_ever = !v.registered;

    state.transfer(sender, VALIDATOR_REGISTRY_ADDRESS, value)?;
    v.self_stake = value;
    v.total_stake += value;
    v.status = ValidatorStatus::Active as u8;
    v.unstake_unlock_block = current_block;
    if first_ever {
        v.registered = true;
    }
    write_validator(state, sender, &v)?;

    if first_ever {
        append_to_registry_list(state, sender)?;
    }

    log::info!("validator.register addr={sender:?} value={value} first_ever={first_ever}");
    Ok(())
}

/// WITHDRAW requires `status = Active`. Defensive guard: registry balance
/// must cover `selfStake` (V3) before refunding, or the node is treated
/// as corrupted and must halt rather than silently under-fund the
/// refund.
pub fn withdraw(state: &StateManager, sender: Address) -> Result<(), ValidatorError> {
    let mut v = read_validator(state, sender)?;
    if v.status() != ValidatorStatus::Active {
        return Err(ValidatorError::NotActive);
    }

    let registry_balance = state.get_balance(VALIDATOR_REGISTRY_ADDRESS)?;
    if registry_balance < v.self_stake {
        log::error!(
            "validator registry invariant violated: balance {registry_balance} < self_stake {} for {sender:?}",
            v.self_stake
        );
        return Err(ValidatorError::InvariantViolated);
    }

    let refund = v.self_stake;
    v.total_stake = v.total_stake.saturating_sub(refund);
    v.self_stake = U256::ZERO;
    v.status = ValidatorStatus::Inactive as u8;
    write_validator(state, sender, &v)?;

    state.transfer(VALIDATOR_REGISTRY_ADDRESS, sender, refund)?;
    log::info!("validator.withdraw addr={sender:?} refund={refund}");
    Ok(())
}

fn registry_count(state: &StateManager) -> Result<u64, ValidatorError> {
    let slot = slot::field_slot(slot::F_REGISTRY_COUNT);
    Ok(slot::read_uint64(&state.get_slot(VALIDATOR_REGISTRY_ADDRESS, slot)?))
}

fn append_to_registry_list(state: &StateManager, addr: Address) -> Result<(), ValidatorError> {
    let count = registry_count(state)?;
    let mut addr_buf = [0u8; 32];
    slot::write_address(&mut addr_buf, addr);
    state.set_slot(VALIDATOR_REGISTRY_ADDRESS, slot::registry_entry_slot(count), addr_buf)?;

    let mut count_buf = [0u8; 32];
    slot::write_uint64(&mut count_buf, count + 1);
    state.set_slot(
        VALIDATOR_REGISTRY_ADDRESS,
        slot::field_slot(slot::F_REGISTRY_COUNT),
        count_buf,
    )?;
    Ok(())
}

/// O(N) over the registered list: materialize `(addr, selfStake)` for
/// active validators, stable-sort by stake descending with address
/// ascending as tiebreak, truncate to `maxValidators`, then re-sort the
/// truncated slice by address ascending. Exactly one pass — no lazy
/// iterator hides the O(N) cost.
pub fn read_active_validators(state: &StateManager, cfg: &ChainConfig) -> Result<Vec<Address>, ValidatorError> {
    let count = registry_count(state)?;
    let mut active: Vec<(Address, U256)> = Vec::new();

    for i in 0..count {
        let addr_buf = state.get_slot(VALIDATOR_REGISTRY_ADDRESS, slot::registry_entry_slot(i))?;
        let addr = slot::read_address(&addr_buf);
        let v = read_validator(state, addr)?;
        if v.status() == ValidatorStatus::Active {
            active.push((addr, v.self_stake));
        }
    }

    active.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    active.truncate(cfg.max_validators);
    active.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(active.into_iter().map(|(addr, _)| addr).collect())
}
