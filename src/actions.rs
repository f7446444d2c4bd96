//! System-action dispatcher (C5): decodes the tagged envelope from
//! transaction data and routes to the matching handler (validator,
//! staking, agent). There is no global mutable handler table — dispatch
//! is a plain match over [`ActionKind`], so nothing needs registering at
//! construction or reset between tests.

use std::str::FromStr;

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::agent::AgentError;
use crate::config::ChainConfig;
use crate::gas::{self, GasError};
use crate::staking::{self, StakingError};
use crate::state::{StateError, StateManager};
use crate::types::{ActionKind, ActionOutcome, SystemActionEnvelope};
use crate::validator::{self, ValidatorError};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("malformed system-action envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unknown system action: {0}")]
    UnknownAction(String),
    #[error("commission_bps {0} out of range 0..=5000")]
    BadCommission(u32),
    #[error("node_address is required")]
    MissingNodeAddress,
    #[error("value must be greater than zero")]
    ZeroValue,
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Staking(#[from] StakingError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Gas(#[from] GasError),
}

/// Everything a handler needs, mirroring the teacher's executor context:
/// caller, transferred value, block number, mutable state handle, chain
/// configuration.
pub struct ActionContext<'a> {
    pub state: &'a StateManager,
    pub cfg: &'a ChainConfig,
    pub caller: Address,
    pub value: U256,
    pub block_number: u64,
}

/// Decodes `data` as `{action, payload}` and dispatches. Charges
/// `intrinsic + SysActionGas` regardless of handler outcome — gas is
/// returned alongside the result so the caller (router) can account for
/// it even on a failed action.
pub fn dispatch(ctx: &ActionContext, data: &[u8]) -> (Result<ActionOutcome, ActionError>, u64) {
    let gas_used = match gas::sys_action_gas(ctx.cfg, data) {
        Ok(g) => g,
        Err(e) => return (Err(ActionError::Gas(e)), 0),
    };

    let envelope: SystemActionEnvelope = match serde_json::from_slice(data) {
        Ok(e) => e,
        Err(e) => return (Err(ActionError::MalformedEnvelope(e.to_string())), gas_used),
    };

    let kind = match ActionKind::from_str(&envelope.action) {
        Some(k) => k,
        None => return (Err(ActionError::UnknownAction(envelope.action.clone())), gas_used),
    };

    let result = dispatch_kind(ctx, kind, &envelope.payload).map(|o| o.with_gas(gas_used));
    (result, gas_used)
}

trait WithGas {
    fn with_gas(self, gas_used: u64) -> ActionOutcome;
}

impl WithGas for ActionOutcome {
    fn with_gas(mut self, gas_used: u64) -> ActionOutcome {
        self.gas_used = gas_used;
        self
    }
}

fn dispatch_kind(
    ctx: &ActionContext,
    kind: ActionKind,
    payload: &serde_json::Value,
) -> Result<ActionOutcome, ActionError> {
    match kind {
        ActionKind::ValidatorRegister => {
            validator::register(ctx.state, ctx.cfg, ctx.caller, ctx.value, ctx.block_number)?;
            Ok(ActionOutcome::new(0).with_event("validator_registered"))
        }
        ActionKind::ValidatorWithdraw => {
            validator::withdraw(ctx.state, ctx.caller)?;
            Ok(ActionOutcome::new(0).with_event("validator_withdrawn"))
        }
        ActionKind::AccountSetSigner => {
            // Signer rotation has no persisted counterpart in this crate's
            // scope (no signature verification surface); accepted as a
            // no-op so well-formed transactions don't fail spuriously.
            Ok(ActionOutcome::new(0))
        }
        ActionKind::NodeRegister | ActionKind::NodeUpdate => {
            let commission_bps = payload
                .get("commission_bps")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            if commission_bps > ctx.cfg.max_commission_bps {
                return Err(ActionError::BadCommission(commission_bps));
            }
            staking::stake(ctx.state, ctx.cfg, ctx.caller, ctx.value, commission_bps, ctx.block_number)?;
            Ok(ActionOutcome::new(0).with_event("node_registered"))
        }
        ActionKind::NodeStake => {
            if ctx.value.is_zero() {
                return Err(ActionError::ZeroValue);
            }
            let v = staking::read_validator(ctx.state, ctx.caller)?;
            staking::stake(
                ctx.state,
                ctx.cfg,
                ctx.caller,
                ctx.value,
                v.commission_bps,
                ctx.block_number,
            )?;
            Ok(ActionOutcome::new(0).with_event("node_staked"))
        }
        ActionKind::NodeUnstake => {
            let withdrawn = staking::unstake(ctx.state, ctx.cfg, ctx.caller, None, ctx.block_number)?;
            Ok(ActionOutcome::new(0).with_event(format!("node_unstaked:{withdrawn}")))
        }
        ActionKind::Delegate => {
            let node = parse_address(payload, "node_address")?;
            if ctx.value.is_zero() {
                return Err(ActionError::ZeroValue);
            }
            staking::delegate(ctx.state, ctx.caller, node, ctx.value)?;
            Ok(ActionOutcome::new(0).with_event("delegated"))
        }
        ActionKind::Undelegate => {
            let node = parse_address(payload, "node_address")?;
            let shares = payload
                .get("shares")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .and_then(|s| U256::from_str(s).ok());
            let withdrawn = staking::undelegate(ctx.state, ctx.cfg, ctx.caller, node, shares, ctx.block_number)?;
            Ok(ActionOutcome::new(0).with_event(format!("undelegated:{withdrawn}")))
        }
        ActionKind::ClaimReward => {
            let node = parse_optional_address(payload, "node_address");
            let amount = staking::claim_reward(ctx.state, ctx.caller, node)?;
            if !amount.is_zero() {
                ctx.state.transfer(crate::config::STAKING_RESERVE_ADDRESS, ctx.caller, amount)?;
            }
            Ok(ActionOutcome::new(0).with_event(format!("reward_claimed:{amount}")))
        }
        ActionKind::AgentRegister | ActionKind::AgentUpdate => {
            let agent_id = payload
                .get("agent_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ActionError::MalformedEnvelope("missing agent_id".to_string()))?;
            let manifest = payload.get("manifest").cloned().unwrap_or(serde_json::Value::Null);
            crate::agent::register_or_update(ctx.state, agent_id, ctx.caller, &manifest)?;
            Ok(ActionOutcome::new(0).with_event("agent_registered"))
        }
        ActionKind::AgentHeartbeat => {
            let agent_id = payload
                .get("agent_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ActionError::MalformedEnvelope("missing agent_id".to_string()))?;
            crate::agent::heartbeat(ctx.state, agent_id, ctx.caller)?;
            Ok(ActionOutcome::new(0).with_event("agent_heartbeat"))
        }
    }
}

fn parse_address(payload: &serde_json::Value, field: &str) -> Result<Address, ActionError> {
    parse_optional_address(payload, field).ok_or(ActionError::MissingNodeAddress)
}

fn parse_optional_address(payload: &serde_json::Value, field: &str) -> Option<Address> {
    payload.get(field).and_then(|v| v.as_str()).and_then(|s| Address::from_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx<'a>(state: &'a StateManager, cfg: &'a ChainConfig, caller: Address, value: U256) -> ActionContext<'a> {
        ActionContext {
            state,
            cfg,
            caller,
            value,
            block_number: 1,
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let state = StateManager::new(Arc::new(MemStorage::new()), None);
        let cfg = ChainConfig::default();
        let c = ctx(&state, &cfg, Address::repeat_byte(0x01), U256::ZERO);
        let data = serde_json::to_vec(&json!({"action": "BOGUS", "payload": {}})).unwrap();
        let (result, _gas) = dispatch(&c, &data);
        assert!(matches!(result, Err(ActionError::UnknownAction(_))));
    }

    #[test]
    fn validator_register_dispatches_through_to_validator_module() {
        let state = StateManager::new(Arc::new(MemStorage::new()), None);
        let cfg = ChainConfig::default();
        let addr = Address::repeat_byte(0x02);
        state.credit(addr, cfg.min_validator_stake).unwrap();

        let c = ctx(&state, &cfg, addr, cfg.min_validator_stake);
        let data = serde_json::to_vec(&json!({"action": "VALIDATOR_REGISTER", "payload": {}})).unwrap();
        let (result, gas_used) = dispatch(&c, &data);
        assert!(result.is_ok());
        assert!(gas_used >= cfg.sys_action_gas);

        let v = staking::read_validator(&state, addr).unwrap();
        assert_eq!(v.self_stake, cfg.min_validator_stake);
    }

    #[test]
    fn delegate_requires_node_address() {
        let state = StateManager::new(Arc::new(MemStorage::new()), None);
        let cfg = ChainConfig::default();
        let addr = Address::repeat_byte(0x03);
        let c = ctx(&state, &cfg, addr, U256::from(10u64));
        let data = serde_json::to_vec(&json!({"action": "DELEGATE", "payload": {}})).unwrap();
        let (result, _) = dispatch(&c, &data);
        assert!(matches!(result, Err(ActionError::MissingNodeAddress)));
    }
}
