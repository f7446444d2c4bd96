//! End-to-end scenarios exercised through the public router/action
//! surface rather than individual module internals, covering the
//! concrete cases named in the specification's testable-properties
//! section.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use gtos_core::config::{ChainConfig, KV_ROUTER_ADDRESS, SYSTEM_ACTION_ADDRESS};
use gtos_core::kv;
use gtos_core::router::route;
use gtos_core::staking::read_validator;
use gtos_core::state::StateManager;
use gtos_core::storage::MemStorage;
use gtos_core::types::ValidatorStatus;
use gtos_core::validator::read_active_validators;
use serde_json::json;

fn fresh() -> (StateManager, ChainConfig) {
    let _ = env_logger::builder().is_test(true).try_init();
    (StateManager::new(Arc::new(MemStorage::new()), None), ChainConfig::default())
}

#[test]
fn scenario_register_withdraw_round_trip_through_router() {
    let (state, cfg) = fresh();
    let addr = Address::repeat_byte(0x02);
    let fund = cfg.min_validator_stake + U256::from(1u64) * U256::from(10u64).pow(U256::from(18));
    state.credit(addr, fund).unwrap();

    let register = serde_json::to_vec(&json!({"action": "VALIDATOR_REGISTER", "payload": {}})).unwrap();
    route(&state, &cfg, addr, SYSTEM_ACTION_ADDRESS, cfg.min_validator_stake, &register, 1).unwrap();

    let withdraw = serde_json::to_vec(&json!({"action": "VALIDATOR_WITHDRAW", "payload": {}})).unwrap();
    route(&state, &cfg, addr, SYSTEM_ACTION_ADDRESS, U256::ZERO, &withdraw, 2).unwrap();

    let v = read_validator(&state, addr).unwrap();
    assert_eq!(v.self_stake, U256::ZERO);
    assert_eq!(v.status(), ValidatorStatus::Inactive);
    assert_eq!(state.get_balance(addr).unwrap(), fund);

    route(&state, &cfg, addr, SYSTEM_ACTION_ADDRESS, cfg.min_validator_stake, &register, 3).unwrap();
    let v = read_validator(&state, addr).unwrap();
    assert_eq!(v.self_stake, cfg.min_validator_stake);
    assert_eq!(v.status(), ValidatorStatus::Active);
}

#[test]
fn scenario_active_set_ordering_after_three_registrations() {
    let (state, cfg) = fresh();
    let addrs = [Address::repeat_byte(0x01), Address::repeat_byte(0x02), Address::repeat_byte(0x03)];
    let multipliers = [1u64, 3u64, 2u64];

    for (addr, m) in addrs.iter().zip(multipliers.iter()) {
        let stake = cfg.min_validator_stake * U256::from(*m);
        state.credit(*addr, stake).unwrap();
        let data = serde_json::to_vec(&json!({"action": "VALIDATOR_REGISTER", "payload": {}})).unwrap();
        route(&state, &cfg, *addr, SYSTEM_ACTION_ADDRESS, stake, &data, 1).unwrap();
    }

    let active = read_active_validators(&state, &cfg).unwrap();
    assert_eq!(active, vec![addrs[0], addrs[1], addrs[2]]);
}

#[test]
fn scenario_lazy_expiry_and_stale_bucket_entry_through_router() {
    let (state, cfg) = fresh();
    let owner = Address::repeat_byte(0x11);

    let put_at = |state: &StateManager, created_at: u64, ttl: u64, value: &[u8]| {
        let mut data = b"GTOSKV1".to_vec();
        data.extend_from_slice(
            &serde_json::to_vec(&json!({
                "version": 1,
                "namespace": "ns",
                "key": hex::encode(b"k1"),
                "value": hex::encode(value),
                "ttl": ttl,
            }))
            .unwrap(),
        );
        route(state, &cfg, owner, KV_ROUTER_ADDRESS, U256::ZERO, &data, created_at).unwrap();
    };

    put_at(&state, 10, 40, b"v1"); // expire_at = 50
    put_at(&state, 20, 40, b"v2"); // expire_at = 60, stale bucket entry left at 50

    let pruned = kv::prune_expired_at(&state, 50).unwrap();
    assert_eq!(pruned, 0);
    let (value, meta, found) = kv::get(&state, owner, "ns", b"k1", 55).unwrap();
    assert!(found);
    assert_eq!(value, b"v2");
    assert_eq!(meta.expire_at, 60);

    let pruned = kv::prune_expired_at(&state, 60).unwrap();
    assert_eq!(pruned, 1);
    let (_, _, found) = kv::get(&state, owner, "ns", b"k1", 65).unwrap();
    assert!(!found);
}

#[test]
fn scenario_ordinary_transfer_fails_closed_on_insufficient_funds() {
    let (state, cfg) = fresh();
    let sender = Address::repeat_byte(0x30);
    let to = Address::repeat_byte(0x31);
    state.credit(sender, U256::from(10u64)).unwrap();

    let err = route(&state, &cfg, sender, to, U256::from(100u64), &[], 1).unwrap_err();
    assert!(matches!(err, gtos_core::router::RouterError::InsufficientBalance));
    assert_eq!(state.get_balance(to).unwrap(), U256::ZERO);
}
