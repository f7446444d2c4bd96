//! TTL code engine (C3): write-once-until-expiry per-account code with a
//! per-block expiry index, mirroring the KV engine's bucket-sweep shape
//! but with a single immutable blob per account instead of chunked
//! key/value records.

use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::config::CODE_REGISTRY_ADDRESS;
use crate::slot;
use crate::state::{StateError, StateManager};

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("unsupported setCode envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("ttl must be non-zero")]
    ZeroTtl,
    #[error("trailing bytes after setCode envelope")]
    TrailingBytes,
    #[error("envelope too short")]
    Truncated,
    #[error("account already has live code")]
    AlreadyLive,
    #[error(transparent)]
    State(#[from] StateError),
}

const ENVELOPE_VERSION: u8 = 1;

/// `{version=1, ttl, code}`, encoded as `version(1) || ttl(8 BE) ||
/// code_len(8 BE) || code`.
pub fn encode(ttl: u64, code: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + 8 + code.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&ttl.to_be_bytes());
    out.extend_from_slice(&(code.len() as u64).to_be_bytes());
    out.extend_from_slice(code);
    out
}

pub fn decode(bytes: &[u8]) -> Result<(u64, Vec<u8>), CodeError> {
    if bytes.len() < 1 + 8 + 8 {
        return Err(CodeError::Truncated);
    }
    let version = bytes[0];
    if version != ENVELOPE_VERSION {
        return Err(CodeError::UnsupportedVersion(version));
    }
    let mut ttl_buf = [0u8; 8];
    ttl_buf.copy_from_slice(&bytes[1..9]);
    let ttl = u64::from_be_bytes(ttl_buf);
    if ttl == 0 {
        return Err(CodeError::ZeroTtl);
    }
    let mut len_buf = [0u8; 8];
    len_buf.copy_from_slice(&bytes[9..17]);
    let code_len = u64::from_be_bytes(len_buf) as usize;
    let body = &bytes[17..];
    if body.len() != code_len {
        return Err(CodeError::TrailingBytes);
    }
    Ok((ttl, body.to_vec()))
}

/// Fails if the account already has live (unexpired) code. Writes code,
/// `createdAt`/`expireAt` meta slots, and an expiry-bucket entry.
pub fn set_code(
    state: &StateManager,
    owner: Address,
    code: &[u8],
    ttl: u64,
    current_block: u64,
) -> Result<(), CodeError> {
    if has_live_code(state, owner, current_block)? {
        return Err(CodeError::AlreadyLive);
    }

    let expire_at = current_block + ttl;
    state.set_code(owner, code)?;
    write_u64(state, owner, slot::field_slot(slot::F_CODE_CREATED_AT), current_block)?;
    write_u64(state, owner, slot::field_slot(slot::F_CODE_EXPIRE_AT), expire_at)?;

    append_to_bucket(state, expire_at, owner)?;
    log::info!("code.set_code owner={owner:?} ttl={ttl} expire_at={expire_at}");
    Ok(())
}

pub fn has_live_code(state: &StateManager, owner: Address, current_block: u64) -> Result<bool, CodeError> {
    if state.get_code(owner)?.is_none() {
        return Ok(false);
    }
    let expire_at = read_u64(state, owner, slot::field_slot(slot::F_CODE_EXPIRE_AT))?;
    Ok(expire_at > current_block)
}

/// Sweeps the per-block index and clears code + meta for every account
/// whose `expireAt == block`.
pub fn prune_code_at(state: &StateManager, block: u64) -> Result<u64, CodeError> {
    let bucket_base = slot::code_expiry_bucket_base(block);
    let count = read_u64(state, CODE_REGISTRY_ADDRESS, slot::code_bucket_count_slot(bucket_base))?;

    let mut pruned = 0u64;
    for i in 0..count {
        let owner_slot = slot::code_bucket_owner_slot(bucket_base, i);
        let owner_bytes = state.get_slot(CODE_REGISTRY_ADDRESS, owner_slot)?;
        let owner = slot::read_address(&owner_bytes);
        state.set_slot(CODE_REGISTRY_ADDRESS, owner_slot, [0u8; 32])?;

        if state.get_code(owner)?.is_none() {
            continue;
        }
        let expire_at = read_u64(state, owner, slot::field_slot(slot::F_CODE_EXPIRE_AT))?;
        if expire_at != block {
            continue;
        }

        state.clear_code(owner)?;
        write_u64(state, owner, slot::field_slot(slot::F_CODE_CREATED_AT), 0)?;
        write_u64(state, owner, slot::field_slot(slot::F_CODE_EXPIRE_AT), 0)?;
        pruned += 1;
    }

    state.set_slot(
        CODE_REGISTRY_ADDRESS,
        slot::code_bucket_count_slot(bucket_base),
        [0u8; 32],
    )?;
    log::info!("code.prune_code_at block={block} pruned={pruned}");
    Ok(pruned)
}

fn append_to_bucket(state: &StateManager, expire_at: u64, owner: Address) -> Result<(), CodeError> {
    let bucket_base = slot::code_expiry_bucket_base(expire_at);
    let count = read_u64(state, CODE_REGISTRY_ADDRESS, slot::code_bucket_count_slot(bucket_base))?;

    let mut owner_buf = [0u8; 32];
    slot::write_address(&mut owner_buf, owner);
    state.set_slot(
        CODE_REGISTRY_ADDRESS,
        slot::code_bucket_owner_slot(bucket_base, count),
        owner_buf,
    )?;

    let mut count_buf = [0u8; 32];
    slot::write_uint64(&mut count_buf, count + 1);
    state.set_slot(CODE_REGISTRY_ADDRESS, slot::code_bucket_count_slot(bucket_base), count_buf)?;
    state.ensure_nonce_at_least(CODE_REGISTRY_ADDRESS, 1)?;
    Ok(())
}

fn read_u64(state: &StateManager, owner: Address, s: B256) -> Result<u64, CodeError> {
    Ok(slot::read_uint64(&state.get_slot(owner, s)?))
}

fn write_u64(state: &StateManager, owner: Address, s: B256, v: u64) -> Result<(), CodeError> {
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
    fn encode_decode_round_trips() {
        let bytes = encode(100, b"\x60\x00\x60\x00");
        let (ttl, code) = decode(&bytes).unwrap();
        assert_eq!(ttl, 100);
        assert_eq!(code, b"\x60\x00\x60\x00");
    }

    #[test]
    fn decode_rejects_bad_version_zero_ttl_and_trailing_bytes() {
        let mut bytes = encode(10, b"abc");
        bytes[0] = 2;
        assert!(matches!(decode(&bytes), Err(CodeError::UnsupportedVersion(2))));

        let zero_ttl = encode(0, b"abc");
        assert!(matches!(decode(&zero_ttl), Err(CodeError::ZeroTtl)));

        let mut trailing = encode(10, b"abc");
        trailing.push(0xFF);
        assert!(matches!(decode(&trailing), Err(CodeError::TrailingBytes)));
    }

    #[test]
    fn set_code_rejects_overwrite_while_live_then_allows_after_prune() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x55);
        set_code(&state, owner, b"code-v1", 10, 100).unwrap();

        assert!(matches!(
            set_code(&state, owner, b"code-v2", 10, 105),
            Err(CodeError::AlreadyLive)
        ));

        let pruned = prune_code_at(&state, 110).unwrap();
        assert_eq!(pruned, 1);
        assert!(state.get_code(owner).unwrap().is_none());

        set_code(&state, owner, b"code-v2", 10, 110).unwrap();
        assert_eq!(state.get_code(owner).unwrap().unwrap(), b"code-v2");
    }
}
