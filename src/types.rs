//! Core domain types: addresses, validator/delegation records, votes and
//! quorum certificates, and the system-action envelope.

pub use alloy_primitives::{Address, Bytes, U256};

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

pub type BlockHeight = u64;

/// V1: `selfStake > 0 => status = Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValidatorStatus {
    Inactive = 0,
    Active = 1,
    Jailed = 2,
    Exiting = 3,
}

impl ValidatorStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ValidatorStatus::Active,
            2 => ValidatorStatus::Jailed,
            3 => ValidatorStatus::Exiting,
            _ => ValidatorStatus::Inactive,
        }
    }
}

/// A validator's staking entry. Mirrors the slots described in spec §3/§6
/// (`selfStake`, `totalStake`, `commission`, `status`, `rewardPerShare`,
/// `pendingReward`, `unstakeUnlock`, `registered`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub self_stake: U256,
    pub status: u8,
    pub commission_bps: u32,
    pub reward_per_share: U256,
    pub total_stake: U256,
    pub unstake_unlock_block: BlockHeight,
    pub registered: bool,
}

impl ValidatorEntry {
    pub fn status(&self) -> ValidatorStatus {
        ValidatorStatus::from_u8(self.status)
    }
}

/// Keyed by (delegator, validator). Shares are issued 1:1 with staked wei.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Delegation {
    pub shares: U256,
    pub reward_debt: U256,
    pub undelegate_unlock_block: BlockHeight,
}

/// A vote from a validator for a `(height, round, blockHash)` target.
/// The signature is an opaque byte blob; verifying it is a consensus-layer
/// concern above this pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub height: BlockHeight,
    pub round: u64,
    pub block_hash: Hash,
    pub validator: Address,
    pub weight: u64,
    pub signature: Bytes,
}

/// A quorum certificate assembled once accepted weight reaches
/// `required = floor(2 * total / 3) + 1`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Qc {
    pub height: BlockHeight,
    pub round: u64,
    pub block_hash: Hash,
    pub total_weight: u64,
    pub required: u64,
    pub attestations: Vec<Vote>,
}

impl Qc {
    /// Structural validation: enough weight, non-empty attestations, a
    /// sane (non-zero) quorum threshold.
    pub fn verify(&self) -> bool {
        self.total_weight >= self.required && !self.attestations.is_empty() && self.required > 0
    }
}

/// The closed set of system-action kinds routed by the dispatcher (C5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    ValidatorRegister,
    ValidatorWithdraw,
    AccountSetSigner,
    NodeRegister,
    NodeUpdate,
    NodeStake,
    NodeUnstake,
    Delegate,
    Undelegate,
    ClaimReward,
    AgentRegister,
    AgentUpdate,
    AgentHeartbeat,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ValidatorRegister => "VALIDATOR_REGISTER",
            ActionKind::ValidatorWithdraw => "VALIDATOR_WITHDRAW",
            ActionKind::AccountSetSigner => "ACCOUNT_SET_SIGNER",
            ActionKind::NodeRegister => "NODE_REGISTER",
            ActionKind::NodeUpdate => "NODE_UPDATE",
            ActionKind::NodeStake => "NODE_STAKE",
            ActionKind::NodeUnstake => "NODE_UNSTAKE",
            ActionKind::Delegate => "DELEGATE",
            ActionKind::Undelegate => "UNDELEGATE",
            ActionKind::ClaimReward => "CLAIM_REWARD",
            ActionKind::AgentRegister => "AGENT_REGISTER",
            ActionKind::AgentUpdate => "AGENT_UPDATE",
            ActionKind::AgentHeartbeat => "AGENT_HEARTBEAT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "VALIDATOR_REGISTER" => ActionKind::ValidatorRegister,
            "VALIDATOR_WITHDRAW" => ActionKind::ValidatorWithdraw,
            "ACCOUNT_SET_SIGNER" => ActionKind::AccountSetSigner,
            "NODE_REGISTER" => ActionKind::NodeRegister,
            "NODE_UPDATE" => ActionKind::NodeUpdate,
            "NODE_STAKE" => ActionKind::NodeStake,
            "NODE_UNSTAKE" => ActionKind::NodeUnstake,
            "DELEGATE" => ActionKind::Delegate,
            "UNDELEGATE" => ActionKind::Undelegate,
            "CLAIM_REWARD" => ActionKind::ClaimReward,
            "AGENT_REGISTER" => ActionKind::AgentRegister,
            "AGENT_UPDATE" => ActionKind::AgentUpdate,
            "AGENT_HEARTBEAT" => ActionKind::AgentHeartbeat,
            _ => return None,
        })
    }
}

/// `{action, payload}` envelope decoded from transaction data addressed to
/// the system-action sentinel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemActionEnvelope {
    pub action: String,
    pub payload: serde_json::Value,
}

/// A small outcome handlers return instead of `()`, mirroring the
/// teacher's `Receipt`/`Log` shape, so a future block executor can fold
/// these into a receipts root the same way `calculate_receipts_root` does.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub gas_used: u64,
    pub events: Vec<String>,
}

impl ActionOutcome {
    pub fn new(gas_used: u64) -> Self {
        Self {
            gas_used,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }
}
