//! Delegated proof-of-stake consensus state.
//!
//! Token holders delegate stake to candidates; every `DYNASTY_INTERVAL`
//! seconds an election promotes the top-voted candidates into the next
//! dynasty of block producers. Within a dynasty, each `BLOCK_INTERVAL`
//! slot has exactly one legal proposer.
//!
//! The state is held in six authenticated tries whose combined root is
//! committed in every block header:
//!
//! | trie           | key                          | value      |
//! |----------------|------------------------------|------------|
//! | `dynasty`      | delegatee                    | delegatee  |
//! | `next_dynasty` | delegatee                    | delegatee  |
//! | `delegate`     | delegatee ‖ delegator        | delegator  |
//! | `vote`         | delegator                    | delegatee  |
//! | `candidate`    | delegatee                    | delegatee  |
//! | `mint_cnt`     | dynasty id ‖ delegatee       | count      |
//!
//! [`DposContext`] owns the tries and the batch protocol; a
//! [`DynastyContext`] is the scheduler's view of the state at a specific
//! timestamp, with elections already applied and the slot proposer
//! resolved.

pub mod context;
pub mod dynasty;
pub mod election;

pub use context::{ContextRoots, DposContext};
pub use dynasty::{traverse_dynasty, DynastyContext};
pub use election::RankedCandidate;

use crate::address::AddressError;
use crate::storage::StorageError;
use crate::trie::TrieError;

/// Errors from consensus state operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Fewer than `SAFE_SIZE` ranked candidates at election time.
    #[error("too few candidates to elect a dynasty")]
    TooFewCandidates,
    /// The requested timestamp is not a legal slot boundary.
    #[error("timestamp is not a block forge slot")]
    NotBlockForgeTime,
    /// The genesis configuration lists fewer than `SAFE_SIZE` validators.
    #[error("genesis dynasty has too few validators")]
    InitialDynastyNotEnough,
    /// The genesis dynasty root registry is absent from storage. Electing
    /// without it would diverge from nodes that have it.
    #[error("genesis dynasty record missing from storage")]
    GenesisDynastyMissing,
    /// Delegating to an address that is not a candidate.
    #[error("delegatee is not a registered candidate")]
    DelegateToNonCandidate,
    /// Withdrawing a delegation that does not exist.
    #[error("delegator has no current vote")]
    NotDelegated,
    #[error("trie error: {0}")]
    Trie(#[from] TrieError),
    #[error("address decode error: {0}")]
    Address(#[from] AddressError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
