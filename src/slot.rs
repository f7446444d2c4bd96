//! Slot kernel (C1): deterministic 32-byte storage keys from structured
//! field descriptors. Pure — this module never touches `Storage`.
//!
//! Every descriptor literal below is part of the on-disk contract (see
//! spec §6, "Persisted state layout"). Changing a literal changes the
//! storage layout for every node; code review must treat a diff here as a
//! protocol change.

use alloy_primitives::{keccak256, Address, B256, U256};

// --- Validator / staking field descriptors -------------------------------

pub const F_SELF_STAKE: &str = "selfStake";
pub const F_TOTAL_STAKE: &str = "totalStake";
pub const F_COMMISSION: &str = "commission";
pub const F_STATUS: &str = "status";
pub const F_REWARD_PER_SHARE: &str = "rewardPerShare";
pub const F_PENDING_REWARD: &str = "pendingReward";
pub const F_UNSTAKE_UNLOCK: &str = "unstakeUnlock";
pub const F_REGISTERED: &str = "registered";
pub const F_NETWORK_STAKE: &str = "networkStake";

// --- Delegation field descriptors (per (delegator, validator) pair) ------

pub const F_DELEG_SHARES: &str = "delegationShares";
pub const F_DELEG_REWARD_DEBT: &str = "delegationRewardDebt";
pub const F_DELEG_UNLOCK: &str = "delegationUnlock";

// --- KV engine descriptors ------------------------------------------------

pub const KV_RECORD_DOMAIN: &[u8] = b"gtos.kv.record";
pub const F_KV_VALUE_LEN: &str = "valueLen";
pub const F_KV_CREATED_AT: &str = "createdAt";
pub const F_KV_EXPIRE_AT: &str = "expireAt";
pub const F_KV_EXISTS: &str = "exists";

pub const KV_EXPIRY_BUCKET_DOMAIN: &[u8] = b"gtos.kv.expiry.bucket";
pub const F_BUCKET_COUNT: &str = "count";
pub const F_BUCKET_OWNER: &str = "owner";
pub const F_BUCKET_RECORD: &str = "record";

// --- Code engine descriptors ----------------------------------------------

pub const F_CODE_CREATED_AT: &str = "gtos.setCode.createdAt";
pub const F_CODE_EXPIRE_AT: &str = "gtos.setCode.expireAt";
pub const CODE_EXPIRY_BUCKET_DOMAIN: &[u8] = b"gtos.code.expiry.bucket";

// --- Validator registry list descriptors -----------------------------------

pub const F_REGISTRY_COUNT: &str = "registryCount";

pub fn registry_entry_slot(index: u64) -> B256 {
    let mut buf = Vec::with_capacity(24 + 8);
    buf.extend_from_slice(b"gtos.validator.registry.entry");
    buf.extend_from_slice(&index.to_be_bytes());
    keccak256(buf)
}

// --- Agent registry descriptors --------------------------------------------

pub const F_AGENT_OWNER: &str = "owner";
pub const F_AGENT_MANIFEST_HASH: &str = "manifestHash";
pub const F_AGENT_STATUS: &str = "status";

// --- Encoding primitives ---------------------------------------------------

/// Store `n` right-aligned in the last 8 bytes of `slot`.
pub fn write_uint64(slot: &mut [u8; 32], n: u64) {
    slot[..24].fill(0);
    slot[24..32].copy_from_slice(&n.to_be_bytes());
}

pub fn read_uint64(slot: &[u8; 32]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&slot[24..32]);
    u64::from_be_bytes(buf)
}

/// Store `b` as 0 or 1 in byte 31.
pub fn write_bool(slot: &mut [u8; 32], b: bool) {
    slot.fill(0);
    slot[31] = b as u8;
}

pub fn read_bool(slot: &[u8; 32]) -> bool {
    slot[31] != 0
}

/// Store the 20-byte address right-aligned (bytes 12..32).
pub fn write_address(slot: &mut [u8; 32], a: Address) {
    slot[..12].fill(0);
    slot[12..32].copy_from_slice(a.as_slice());
}

pub fn read_address(slot: &[u8; 32]) -> Address {
    Address::from_slice(&slot[12..32])
}

pub fn write_u256(slot: &mut [u8; 32], v: U256) {
    *slot = v.to_be_bytes();
}

pub fn read_u256(slot: &[u8; 32]) -> U256 {
    U256::from_be_bytes(*slot)
}

// --- Slot derivation --------------------------------------------------------

/// A per-account field slot: `keccak256(field_name)`. Each field lives in
/// the owning account's own storage namespace, so the descriptor alone is
/// enough to disambiguate it.
pub fn field_slot(field: &str) -> B256 {
    keccak256(field.as_bytes())
}

/// Delegation fields are additionally keyed by the validator address so
/// that one delegator's per-validator slots don't collide; the delegator
/// is the owning account.
pub fn delegation_field_slot(field: &str, validator: Address) -> B256 {
    let mut buf = Vec::with_capacity(field.len() + 20);
    buf.extend_from_slice(field.as_bytes());
    buf.extend_from_slice(validator.as_slice());
    keccak256(buf)
}

/// `keccak256("gtos.kv.record" || u64(ns_len) || ns || u64(key_len) || key)`
pub fn kv_base_slot(namespace: &str, key: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(KV_RECORD_DOMAIN.len() + 8 + namespace.len() + 8 + key.len());
    buf.extend_from_slice(KV_RECORD_DOMAIN);
    buf.extend_from_slice(&(namespace.len() as u64).to_be_bytes());
    buf.extend_from_slice(namespace.as_bytes());
    buf.extend_from_slice(&(key.len() as u64).to_be_bytes());
    buf.extend_from_slice(key);
    keccak256(buf)
}

/// Meta slot derived from a KV record's base slot and a field name.
pub fn kv_meta_slot(base: B256, field: &str) -> B256 {
    let mut buf = Vec::with_capacity(32 + field.len());
    buf.extend_from_slice(base.as_slice());
    buf.extend_from_slice(field.as_bytes());
    keccak256(buf)
}

/// Sequential value-chunk slot at `index`, derived from the base slot.
pub fn kv_chunk_slot(base: B256, index: u64) -> B256 {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(base.as_slice());
    buf.extend_from_slice(b"chunk");
    buf.extend_from_slice(&index.to_be_bytes());
    keccak256(buf)
}

/// `keccak256("gtos.kv.expiry.bucket" || u64(expireAt))`
pub fn kv_expiry_bucket_base(expire_at: u64) -> B256 {
    let mut buf = Vec::with_capacity(KV_EXPIRY_BUCKET_DOMAIN.len() + 8);
    buf.extend_from_slice(KV_EXPIRY_BUCKET_DOMAIN);
    buf.extend_from_slice(&expire_at.to_be_bytes());
    keccak256(buf)
}

pub fn bucket_count_slot(base: B256) -> B256 {
    kv_meta_slot(base, F_BUCKET_COUNT)
}

pub fn bucket_owner_slot(base: B256, index: u64) -> B256 {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(base.as_slice());
    buf.extend_from_slice(F_BUCKET_OWNER.as_bytes());
    buf.extend_from_slice(&index.to_be_bytes());
    keccak256(buf)
}

pub fn bucket_record_slot(base: B256, index: u64) -> B256 {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(base.as_slice());
    buf.extend_from_slice(F_BUCKET_RECORD.as_bytes());
    buf.extend_from_slice(&index.to_be_bytes());
    keccak256(buf)
}

/// `keccak256("gtos.code.expiry.bucket" || u64(expireAt))`, the per-block
/// index the code engine sweeps on prune.
pub fn code_expiry_bucket_base(expire_at: u64) -> B256 {
    let mut buf = Vec::with_capacity(CODE_EXPIRY_BUCKET_DOMAIN.len() + 8);
    buf.extend_from_slice(CODE_EXPIRY_BUCKET_DOMAIN);
    buf.extend_from_slice(&expire_at.to_be_bytes());
    keccak256(buf)
}

pub fn code_bucket_count_slot(base: B256) -> B256 {
    kv_meta_slot(base, F_BUCKET_COUNT)
}

pub fn code_bucket_owner_slot(base: B256, index: u64) -> B256 {
    bucket_owner_slot(base, index)
}

/// Agent storage keys: `keccak256(agentId || 0x00 || field)`.
pub fn agent_field_slot(agent_id: &str, field: &str) -> B256 {
    let mut buf = Vec::with_capacity(agent_id.len() + 1 + field.len());
    buf.extend_from_slice(agent_id.as_bytes());
    buf.push(0u8);
    buf.extend_from_slice(field.as_bytes());
    keccak256(buf)
}
