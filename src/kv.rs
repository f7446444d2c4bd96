//! TTL KV engine (C2): upsert/read of `(owner, namespace, key) -> bytes`
//! with chunked values and an expiry-bucket index driving bulk pruning.

use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::config::KV_ROUTER_ADDRESS;
use crate::slot;
use crate::state::{StateError, StateManager};

#[derive(Debug, Error)]
pub enum KvError {
    #[error("namespace must be non-empty")]
    EmptyNamespace,
    #[error("expireAt ({expire_at}) must be greater than createdAt ({created_at})")]
    InvalidExpiry { created_at: u64, expire_at: u64 },
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KvMeta {
    pub value_len: u64,
    pub created_at: u64,
    pub expire_at: u64,
    pub exists: bool,
}

const CHUNK_SIZE: usize = 32;

fn chunks_for_len(len: u64) -> u64 {
    len.div_ceil(CHUNK_SIZE as u64)
}

/// `put`: overwrite truncates prior value chunks (K1), no residue.
/// Idempotent up to equal `(createdAt, expireAt, value)`.
pub fn put(
    state: &StateManager,
    owner: Address,
    namespace: &str,
    key: &[u8],
    value: &[u8],
    created_at: u64,
    expire_at: u64,
) -> Result<(), KvError> {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        return Err(KvError::EmptyNamespace);
    }
    if expire_at <= created_at {
        return Err(KvError::InvalidExpiry { created_at, expire_at });
    }

    let base = slot::kv_base_slot(namespace, key);
    let old_meta = read_meta(state, owner, base)?;
    let old_chunks = chunks_for_len(old_meta.value_len);
    let new_chunks = chunks_for_len(value.len() as u64);

    for i in 0..new_chunks {
        let mut buf = [0u8; CHUNK_SIZE];
        let start = (i as usize) * CHUNK_SIZE;
        let end = std::cmp::min(start + CHUNK_SIZE, value.len());
        buf[..end - start].copy_from_slice(&value[start..end]);
        state.set_slot(owner, slot::kv_chunk_slot(base, i), buf)?;
    }
    for i in new_chunks..old_chunks {
        state.set_slot(owner, slot::kv_chunk_slot(base, i), [0u8; CHUNK_SIZE])?;
    }

    write_meta(
        state,
        owner,
        base,
        KvMeta {
            value_len: value.len() as u64,
            created_at,
            expire_at,
            exists: true,
        },
    )?;

    append_to_bucket(state, expire_at, owner, base)?;
    log::info!(
        "kv.put owner={owner:?} ns={namespace} len={} expire_at={expire_at}",
        value.len()
    );
    Ok(())
}

/// Returns `(value, meta, found)`. Lazy expiry: `found=false` iff no
/// record or `expireAt <= currentBlock` (K2).
pub fn get(
    state: &StateManager,
    owner: Address,
    namespace: &str,
    key: &[u8],
    current_block: u64,
) -> Result<(Vec<u8>, KvMeta, bool), KvError> {
    let base = slot::kv_base_slot(namespace, key);
    let meta = read_meta(state, owner, base)?;
    if !meta.exists || meta.expire_at <= current_block {
        return Ok((Vec::new(), meta, false));
    }
    let chunk_count = chunks_for_len(meta.value_len);
    let mut value = Vec::with_capacity(meta.value_len as usize);
    for i in 0..chunk_count {
        let chunk = state.get_slot(owner, slot::kv_chunk_slot(base, i))?;
        value.extend_from_slice(&chunk);
    }
    value.truncate(meta.value_len as usize);
    Ok((value, meta, true))
}

/// Same lazy-expiry rule as `get` but without loading chunk data.
pub fn get_meta(
    state: &StateManager,
    owner: Address,
    namespace: &str,
    key: &[u8],
    current_block: u64,
) -> Result<(KvMeta, bool), KvError> {
    let base = slot::kv_base_slot(namespace, key);
    let meta = read_meta(state, owner, base)?;
    let found = meta.exists && meta.expire_at > current_block;
    Ok((meta, found))
}

/// Sweeps the expiry bucket for `block_number`. A bucket entry is cleared
/// unconditionally; the record it points at is only actually deleted if
/// it still exists and its *current* `expireAt` still matches this
/// bucket (guards against stale entries left by an overwrite that moved
/// the record to a later expiry — spec scenario 5).
pub fn prune_expired_at(state: &StateManager, block_number: u64) -> Result<u64, KvError> {
    let bucket_base = slot::kv_expiry_bucket_base(block_number);
    let count = read_u64(state, KV_ROUTER_ADDRESS, slot::bucket_count_slot(bucket_base))?;

    let mut pruned = 0u64;
    for i in 0..count {
        let owner_slot = slot::bucket_owner_slot(bucket_base, i);
        let record_slot = slot::bucket_record_slot(bucket_base, i);

        let owner_bytes = state.get_slot(KV_ROUTER_ADDRESS, owner_slot)?;
        let owner = slot::read_address(&owner_bytes);
        let record_bytes = state.get_slot(KV_ROUTER_ADDRESS, record_slot)?;
        let record_base = B256::from(record_bytes);

        state.set_slot(KV_ROUTER_ADDRESS, owner_slot, [0u8; 32])?;
        state.set_slot(KV_ROUTER_ADDRESS, record_slot, [0u8; 32])?;

        let meta = read_meta(state, owner, record_base)?;
        if !meta.exists {
            continue;
        }
        if meta.expire_at != block_number {
            continue;
        }

        let chunk_count = chunks_for_len(meta.value_len);
        for c in 0..chunk_count {
            state.set_slot(owner, slot::kv_chunk_slot(record_base, c), [0u8; 32])?;
        }
        write_meta(state, owner, record_base, KvMeta::default())?;
        pruned += 1;
    }

    state.set_slot(KV_ROUTER_ADDRESS, slot::bucket_count_slot(bucket_base), [0u8; 32])?;
    log::info!("kv.prune_expired_at block={block_number} pruned={pruned}");
    Ok(pruned)
}

fn append_to_bucket(
    state: &StateManager,
    expire_at: u64,
    owner: Address,
    record_base: B256,
) -> Result<(), KvError> {
    let bucket_base = slot::kv_expiry_bucket_base(expire_at);
    let count = read_u64(state, KV_ROUTER_ADDRESS, slot::bucket_count_slot(bucket_base))?;

    let mut owner_buf = [0u8; 32];
    slot::write_address(&mut owner_buf, owner);
    state.set_slot(KV_ROUTER_ADDRESS, slot::bucket_owner_slot(bucket_base, count), owner_buf)?;
    state.set_slot(
        KV_ROUTER_ADDRESS,
        slot::bucket_record_slot(bucket_base, count),
        record_base.0,
    )?;

    let mut count_buf = [0u8; 32];
    slot::write_uint64(&mut count_buf, count + 1);
    state.set_slot(KV_ROUTER_ADDRESS, slot::bucket_count_slot(bucket_base), count_buf)?;

    // The router's nonce must stay >= 1 once a bucket is populated so an
    // "empty account" sweep elsewhere can't drop this storage mid-block.
    state.ensure_nonce_at_least(KV_ROUTER_ADDRESS, 1)?;
    Ok(())
}

fn read_meta(state: &StateManager, owner: Address, base: B256) -> Result<KvMeta, KvError> {
    let value_len = read_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_VALUE_LEN))?;
    let created_at = read_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_CREATED_AT))?;
    let expire_at = read_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_EXPIRE_AT))?;
    let exists_slot = state.get_slot(owner, slot::kv_meta_slot(base, slot::F_KV_EXISTS))?;
    Ok(KvMeta {
        value_len,
        created_at,
        expire_at,
        exists: slot::read_bool(&exists_slot),
    })
}

fn write_meta(state: &StateManager, owner: Address, base: B256, meta: KvMeta) -> Result<(), KvError> {
    write_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_VALUE_LEN), meta.value_len)?;
    write_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_CREATED_AT), meta.created_at)?;
    write_u64(state, owner, slot::kv_meta_slot(base, slot::F_KV_EXPIRE_AT), meta.expire_at)?;
    let mut exists_buf = [0u8; 32];
    slot::write_bool(&mut exists_buf, meta.exists);
    state.set_slot(owner, slot::kv_meta_slot(base, slot::F_KV_EXISTS), exists_buf)?;
    Ok(())
}

fn read_u64(state: &StateManager, owner: Address, s: B256) -> Result<u64, KvError> {
    Ok(slot::read_uint64(&state.get_slot(owner, s)?))
}

fn write_u64(state: &StateManager, owner: Address, s: B256, v: u64) -> Result<(), KvError> {
    let mut buf = [0u8; 32];
    slot::write_uint64(&mut buf, v);
    state.set_slot(owner, s, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use std::sync::Arc;

    fn fresh_state() -> StateManager {
        StateManager::new(Arc::new(MemStorage::new()), None)
    }

    #[test]
    fn lazy_expiry_scenario() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x11);
        put(&state, owner, "ns", b"k2", b"v2", 11, 60).unwrap();

        let (value, _meta, found) = get(&state, owner, "ns", b"k2", 49).unwrap();
        assert!(found);
        assert_eq!(value, b"v2");

        let (_, _, found) = get(&state, owner, "ns", b"k2", 60).unwrap();
        assert!(!found);
    }

    #[test]
    fn overwrite_leaves_no_chunk_residue() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x22);
        put(&state, owner, "ns", b"k", &[0xAA; 70], 1, 100).unwrap();
        put(&state, owner, "ns", b"k", b"short", 1, 100).unwrap();

        let (value, meta, found) = get(&state, owner, "ns", b"k", 2).unwrap();
        assert!(found);
        assert_eq!(value, b"short");
        assert_eq!(meta.value_len, 5);
    }

    #[test]
    fn stale_bucket_entry_is_not_deleted() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x33);
        put(&state, owner, "ns", b"k1", b"v1", 10, 50).unwrap();
        put(&state, owner, "ns", b"k1", b"v2", 20, 60).unwrap();

        let pruned_at_50 = prune_expired_at(&state, 50).unwrap();
        assert_eq!(pruned_at_50, 0);

        let (value, meta, found) = get(&state, owner, "ns", b"k1", 55).unwrap();
        assert!(found);
        assert_eq!(value, b"v2");
        assert_eq!(meta.expire_at, 60);

        let pruned_at_60 = prune_expired_at(&state, 60).unwrap();
        assert_eq!(pruned_at_60, 1);
        let (_, _, found) = get(&state, owner, "ns", b"k1", 65).unwrap();
        assert!(!found);
    }

    #[test]
    fn rejects_empty_namespace_and_bad_expiry() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x44);
        assert!(matches!(
            put(&state, owner, "  ", b"k", b"v", 1, 10),
            Err(KvError::EmptyNamespace)
        ));
        assert!(matches!(
            put(&state, owner, "ns", b"k", b"v", 10, 10),
            Err(KvError::InvalidExpiry { .. })
        ));
    }
}
