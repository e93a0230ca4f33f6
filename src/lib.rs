//! # Aurum DPoS
//!
//! The delegated proof-of-stake consensus state of an Aurum chain node:
//! - **Six authenticated tries** — dynasty, next-dynasty, delegate, vote,
//!   candidate and mint-count state with a single combined root folded into
//!   every block header
//! - **Deterministic elections** — stake-weighted tally, candidate ranking
//!   with bootstrap precedence, and a pseudo-random tail seat
//! - **Kick-out rules** — absent validators are removed from candidacy,
//!   their delegations and votes cleaned up in the same pass
//! - **Transactional mutation** — every write happens inside a batch scope
//!   that commits or rolls back across all six tries
//!
//! Everything here is consensus-critical: two nodes holding contexts with
//! equal root tuples must agree bit-for-bit on the next block producer.

pub mod account;
pub mod address;
pub mod consensus;
pub mod genesis;
pub mod storage;
pub mod trie;

/// Chain parameters.
///
/// These are part of consensus: all nodes of a chain must agree on every
/// value below, and changing any of them forks the chain.
pub mod constants {
    /// Seconds between consecutive block slots.
    pub const BLOCK_INTERVAL: i64 = 5;
    /// Largest tolerated block propagation delay in seconds (advisory).
    pub const ACCEPTED_NETWORK_DELAY: i64 = 2;
    /// Seconds covered by a single dynasty.
    pub const DYNASTY_INTERVAL: i64 = 60;
    /// Number of validators producing blocks within one dynasty.
    pub const DYNASTY_SIZE: usize = 6;
    /// Minimum candidate count for an election to succeed.
    pub const SAFE_SIZE: usize = DYNASTY_SIZE / 3 + 1;
    /// Timestamp of the genesis dynasty context.
    pub const GENESIS_TIMESTAMP: i64 = 0;
}

/// 32-byte hash used throughout the consensus state.
pub type Hash = [u8; 32];

/// Encode a signed 64-bit integer as big-endian two's-complement bytes.
///
/// This encoding appears in mint-count trie keys and in the election tail
/// seed, so it must stay byte-exact across platforms.
pub fn encode_i64(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a big-endian signed 64-bit integer. Returns `None` when the slice
/// is not exactly 8 bytes (on-disk corruption).
pub fn decode_i64(bytes: &[u8]) -> Option<i64> {
    bytes.try_into().ok().map(i64::from_be_bytes)
}
