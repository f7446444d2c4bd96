//! Chain-wide protocol constants, threaded through execution contexts
//! rather than hard-coded inline, the way the teacher threads
//! `block_gas_limit` through `Executor`.

use alloy_primitives::{Address, U256};
use std::str::FromStr;

/// Well-known sentinel addresses. The source keeps these distinct and any
/// implementation must match byte-for-byte to preserve state-root
/// equivalence, so they are pinned literals, not derived.
pub const SYSTEM_ACTION_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x00,
]);
pub const KV_ROUTER_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20, 0x00,
]);
/// Owns the code engine's per-block expiry bucket index, the same way
/// `KV_ROUTER_ADDRESS` owns the KV engine's. Not named explicitly by the
/// distilled spec (only the KV bucket's nonce trick is), so this is this
/// crate's own open-question resolution — see DESIGN.md.
pub const CODE_REGISTRY_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x30, 0x00,
]);
/// Holds pooled validator self-stake (V3: balance >= sum of active
/// self-stake) and the append-only registered-address list.
pub const VALIDATOR_REGISTRY_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x40, 0x00,
]);
/// Owns the agent registry's owner/manifest-hash/status slots. Agent
/// storage is global (keyed by agent id, not by account), so it needs
/// its own addressable owner the same way the KV/code bucket indexes do.
pub const AGENT_REGISTRY_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x50, 0x00,
]);
/// Receives the per-block minted reward (spec §4.9's "credit nodeShare
/// to the staking reserve account"); `claim_reward` payouts are funded
/// from this balance by the router.
pub const STAKING_RESERVE_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x60, 0x00,
]);

/// Reward-per-share fixed-point scale.
pub const REWARD_SCALE: u128 = 1_000_000_000_000_000_000;

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub min_validator_stake: U256,
    pub min_node_stake: U256,
    pub max_commission_bps: u32,
    pub unstake_lock_blocks: u64,
    pub undelegate_lock_blocks: u64,
    pub max_validators: usize,
    pub sys_action_gas: u64,
    pub tx_base_gas: u64,
    pub gas_per_zero_byte: u64,
    pub gas_per_nonzero_byte: u64,
    pub per_block_ttl_gas: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            min_validator_stake: U256::from_str("10000000000000000000000")
                .expect("literal min validator stake parses"),
            min_node_stake: U256::from_str("10000000000000000000000")
                .expect("literal min node stake parses"),
            max_commission_bps: 5_000,
            unstake_lock_blocks: 14 * 24 * 60 * 20, // ~14 days at 3s blocks
            undelegate_lock_blocks: 14 * 24 * 60 * 20,
            max_validators: 21,
            sys_action_gas: 100_000,
            tx_base_gas: 21_000,
            gas_per_zero_byte: 4,
            gas_per_nonzero_byte: 16,
            per_block_ttl_gas: 5,
        }
    }
}
