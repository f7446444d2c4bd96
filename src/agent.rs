//! Agent registry handler (C12): owner/manifest-hash/status slots keyed
//! by an agent id string. Register and update share one write path;
//! heartbeat only checks liveness of ownership.

use alloy_primitives::Address;
use thiserror::Error;

use crate::crypto::{sha256, Hash};
use crate::slot;
use crate::state::{StateError, StateManager};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent_id is required")]
    MissingAgentId,
    #[error("sender is not owner")]
    NotOwner,
    #[error("agent is not registered")]
    NotRegistered,
    #[error(transparent)]
    State(#[from] StateError),
}

const STATUS_ACTIVE: u64 = 1;

use crate::config::AGENT_REGISTRY_ADDRESS as AGENT_STORAGE_ADDRESS;

/// `register`/`update`: records `owner` (the caller), `manifestHash`
/// (sha-256 over the manifest with signature fields stripped), and sets
/// `status = 1`. Both actions share this path; there is no distinct
/// "already registered" rejection — update-in-place is the contract.
pub fn register_or_update(
    state: &StateManager,
    agent_id: &str,
    caller: Address,
    manifest: &serde_json::Value,
) -> Result<Hash, AgentError> {
    if agent_id.is_empty() {
        return Err(AgentError::MissingAgentId);
    }

    let manifest_hash = hash_manifest(manifest);

    let mut owner_buf = [0u8; 32];
    slot::write_address(&mut owner_buf, caller);
    state.set_slot(AGENT_STORAGE_ADDRESS, slot::agent_field_slot(agent_id, slot::F_AGENT_OWNER), owner_buf)?;

    state.set_slot(
        AGENT_STORAGE_ADDRESS,
        slot::agent_field_slot(agent_id, slot::F_AGENT_MANIFEST_HASH),
        manifest_hash.0,
    )?;

    let mut status_buf = [0u8; 32];
    slot::write_uint64(&mut status_buf, STATUS_ACTIVE);
    state.set_slot(AGENT_STORAGE_ADDRESS, slot::agent_field_slot(agent_id, slot::F_AGENT_STATUS), status_buf)?;

    log::info!("agent.register_or_update agent_id={agent_id} caller={caller:?}");
    Ok(manifest_hash)
}

/// `heartbeat`: the owner slot must equal `caller`, otherwise
/// `NotOwner`. An agent with no owner slot ever written (status slot
/// still zero) is treated as unregistered.
pub fn heartbeat(state: &StateManager, agent_id: &str, caller: Address) -> Result<(), AgentError> {
    if agent_id.is_empty() {
        return Err(AgentError::MissingAgentId);
    }

    let status = slot::read_uint64(&state.get_slot(
        AGENT_STORAGE_ADDRESS,
        slot::agent_field_slot(agent_id, slot::F_AGENT_STATUS),
    )?);
    if status != STATUS_ACTIVE {
        return Err(AgentError::NotRegistered);
    }

    let owner_slot = state.get_slot(AGENT_STORAGE_ADDRESS, slot::agent_field_slot(agent_id, slot::F_AGENT_OWNER))?;
    let owner = slot::read_address(&owner_slot);
    if owner != caller {
        return Err(AgentError::NotOwner);
    }

    log::info!("agent.heartbeat agent_id={agent_id} caller={caller:?}");
    Ok(())
}

/// Canonicalizes the manifest by stripping any top-level `signature`
/// field before hashing, so a signed and unsigned copy of the same
/// manifest hash identically.
fn hash_manifest(manifest: &serde_json::Value) -> Hash {
    let mut canonical = manifest.clone();
    if let serde_json::Value::Object(map) = &mut canonical {
        map.remove("signature");
        map.remove("signatures");
    }
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    sha256(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn fresh_state() -> StateManager {
        StateManager::new(Arc::new(MemStorage::new()), None)
    }

    #[test]
    fn register_then_heartbeat_by_owner_succeeds() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x77);
        let manifest = json!({"tools": ["a", "b"], "signature": "deadbeef"});

        register_or_update(&state, "agent-1", owner, &manifest).unwrap();
        heartbeat(&state, "agent-1", owner).unwrap();
    }

    #[test]
    fn heartbeat_rejects_non_owner() {
        let state = fresh_state();
        let owner = Address::repeat_byte(0x77);
        let stranger = Address::repeat_byte(0x88);
        let manifest = json!({"tools": []});

        register_or_update(&state, "agent-2", owner, &manifest).unwrap();
        assert!(matches!(heartbeat(&state, "agent-2", stranger), Err(AgentError::NotOwner)));
    }

    #[test]
    fn manifest_hash_ignores_signature_field() {
        let signed = json!({"tools": ["x"], "signature": "aa"});
        let unsigned = json!({"tools": ["x"]});
        assert_eq!(hash_manifest(&signed), hash_manifest(&unsigned));
    }

    #[test]
    fn heartbeat_on_unregistered_agent_fails() {
        let state = fresh_state();
        let caller = Address::repeat_byte(0x01);
        assert!(matches!(heartbeat(&state, "ghost", caller), Err(AgentError::NotRegistered)));
    }
}
