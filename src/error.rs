//! Crate-level error aggregation.
//!
//! Each subsystem owns a small `thiserror::Error` enum; `GtosError` wraps
//! them so the dispatcher and router can return one error type to the
//! (out-of-scope) transaction executor.

use thiserror::Error;

use crate::actions::ActionError;
use crate::agent::AgentError;
use crate::code::CodeError;
use crate::gas::GasError;
use crate::kv::KvError;
use crate::router::RouterError;
use crate::staking::StakingError;
use crate::state::StateError;
use crate::validator::ValidatorError;
use crate::vote_pool::PoolError;

/// RPC error codes this crate exposes so an (out-of-scope) RPC layer can
/// surface them verbatim. `-38005` is part of the external protocol
/// contract, not an internal convention, so it is pinned here rather than
/// derived.
pub const RPC_HISTORY_PRUNED_CODE: i64 = -38005;
pub const RPC_HISTORY_PRUNED_MESSAGE: &str = "history_pruned";

#[derive(Debug, Error)]
pub enum GtosError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error(transparent)]
    Staking(#[from] StakingError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Gas(#[from] GasError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error("history pruned")]
    HistoryPruned,
}
