//! Transaction router (C10): recognizes the two envelope-address cases
//! (system action, KV put) and falls through to an ordinary balance
//! transfer otherwise.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::actions::{dispatch, ActionContext, ActionError};
use crate::config::{ChainConfig, KV_ROUTER_ADDRESS, SYSTEM_ACTION_ADDRESS};
use crate::gas::{self, GasError};
use crate::kv::{self, KvError};
use crate::state::{StateError, StateManager};
use crate::types::ActionOutcome;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("insufficient balance for value + gas")]
    InsufficientBalance,
    #[error("malformed KV put payload: {0}")]
    MalformedKvPayload(String),
    /// `dispatch` charges `SysActionGas` whether or not the handler
    /// succeeds (spec: "charged whether or not the handler succeeds"), so
    /// a failed system action still carries the gas owed for it.
    #[error("system action dispatch failed (gas_used={gas_used}): {source}")]
    Action {
        #[source]
        source: ActionError,
        gas_used: u64,
    },
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Gas(#[from] GasError),
}

impl RouterError {
    /// Gas the caller owes even though the call failed. Zero for every
    /// variant except a failed system action, where `dispatch` already
    /// computed and charged `SysActionGas` before the handler ran.
    pub fn gas_owed(&self) -> u64 {
        match self {
            RouterError::Action { gas_used, .. } => *gas_used,
            _ => 0,
        }
    }
}

const KV_MAGIC: &[u8; 7] = b"GTOSKV1";

/// Decoded KV put payload carried in transaction data to the KV-router
/// sentinel: magic `"GTOSKV1"` followed by `{version=1, namespace, key,
/// value, ttl}`, serialized as JSON for simplicity (the magic prefix is
/// the wire-format contract; the body encoding is an implementation
/// detail behind it).
#[derive(serde::Serialize, serde::Deserialize)]
struct KvPutPayload {
    version: u8,
    namespace: String,
    #[serde(with = "hex_bytes")]
    key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    value: Vec<u8>,
    ttl: u64,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

pub fn route(
    state: &StateManager,
    cfg: &ChainConfig,
    sender: Address,
    to: Address,
    value: U256,
    data: &[u8],
    block_number: u64,
) -> Result<ActionOutcome, RouterError> {
    if to == SYSTEM_ACTION_ADDRESS {
        let ctx = ActionContext {
            state,
            cfg,
            caller: sender,
            value,
            block_number,
        };
        let (result, gas_used) = dispatch(&ctx, data);
        return result.map_err(|source| RouterError::Action { source, gas_used });
    }

    if to == KV_ROUTER_ADDRESS {
        return route_kv_put(state, cfg, sender, data, block_number);
    }

    route_transfer(state, cfg, sender, to, value, data)
}

fn route_kv_put(
    state: &StateManager,
    cfg: &ChainConfig,
    sender: Address,
    data: &[u8],
    block_number: u64,
) -> Result<ActionOutcome, RouterError> {
    if data.len() < KV_MAGIC.len() || &data[..KV_MAGIC.len()] != KV_MAGIC {
        return Err(RouterError::MalformedKvPayload("missing GTOSKV1 magic".to_string()));
    }
    let payload: KvPutPayload = serde_json::from_slice(&data[KV_MAGIC.len()..])
        .map_err(|e| RouterError::MalformedKvPayload(e.to_string()))?;
    if payload.version != 1 {
        return Err(RouterError::MalformedKvPayload(format!("unsupported version {}", payload.version)));
    }
    if payload.ttl == 0 {
        return Err(RouterError::MalformedKvPayload("ttl must be >= 1".to_string()));
    }

    let gas_used = gas::intrinsic_with_ttl(cfg, data, payload.ttl)?;
    let expire_at = block_number + payload.ttl;
    kv::put(
        state,
        sender,
        &payload.namespace,
        &payload.key,
        &payload.value,
        block_number,
        expire_at,
    )?;

    Ok(ActionOutcome::new(gas_used).with_event("kv_put"))
}

fn route_transfer(
    state: &StateManager,
    cfg: &ChainConfig,
    sender: Address,
    to: Address,
    value: U256,
    data: &[u8],
) -> Result<ActionOutcome, RouterError> {
    let gas_used = gas::intrinsic_gas(cfg, data)?;
    let balance = state.get_balance(sender)?;
    let total_cost = value + U256::from(gas_used);
    if balance < total_cost {
        return Err(RouterError::InsufficientBalance);
    }

    state.transfer(sender, to, value)?;
    Ok(ActionOutcome::new(gas_used).with_event("transfer"))
}

#[allow(dead_code)]
fn encode_kv_put(namespace: &str, key: &[u8], value: &[u8], ttl: u64) -> Vec<u8> {
    let payload = KvPutPayload {
        version: 1,
        namespace: namespace.to_string(),
        key: key.to_vec(),
        value: value.to_vec(),
        ttl,
    };
    let mut out = KV_MAGIC.to_vec();
    out.extend_from_slice(&serde_json::to_vec(&payload).unwrap());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn fresh() -> (StateManager, ChainConfig) {
        (StateManager::new(Arc::new(MemStorage::new()), None), ChainConfig::default())
    }

    #[test]
    fn ordinary_transfer_moves_balance() {
        let (state, cfg) = fresh();
        let sender = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        state.credit(sender, U256::from(1_000_000u64)).unwrap();

        route(&state, &cfg, sender, to, U256::from(100u64), &[], 1).unwrap();

        assert_eq!(state.get_balance(to).unwrap(), U256::from(100u64));
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let (state, cfg) = fresh();
        let sender = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        state.credit(sender, U256::from(50u64)).unwrap();

        let err = route(&state, &cfg, sender, to, U256::from(100u64), &[], 1).unwrap_err();
        assert!(matches!(err, RouterError::InsufficientBalance));
    }

    #[test]
    fn system_action_sentinel_dispatches_to_action_handler() {
        let (state, cfg) = fresh();
        let sender = Address::repeat_byte(0x03);
        state.credit(sender, cfg.min_validator_stake).unwrap();

        let data = serde_json::to_vec(&json!({"action": "VALIDATOR_REGISTER", "payload": {}})).unwrap();
        route(
            &state,
            &cfg,
            sender,
            SYSTEM_ACTION_ADDRESS,
            cfg.min_validator_stake,
            &data,
            1,
        )
        .unwrap();

        let v = crate::staking::read_validator(&state, sender).unwrap();
        assert_eq!(v.self_stake, cfg.min_validator_stake);
    }

    #[test]
    fn kv_router_sentinel_writes_through_to_kv_engine() {
        let (state, cfg) = fresh();
        let sender = Address::repeat_byte(0x04);

        let data = encode_kv_put("ns", b"k", b"hello", 10);
        route(&state, &cfg, sender, KV_ROUTER_ADDRESS, U256::ZERO, &data, 1).unwrap();

        let (value, _meta, found) = kv::get(&state, sender, "ns", b"k", 5).unwrap();
        assert!(found);
        assert_eq!(value, b"hello");
    }
}
