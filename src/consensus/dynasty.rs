//! Dynasty contexts: the consensus state as seen from one block slot.
//!
//! A [`DynastyContext`] is produced by [`DposContext::next_dynasty_context`]
//! for the slot at `timestamp + elapsed`. It clones the six tries, replays
//! any elections between the base dynasty and the target dynasty, and
//! resolves the proposer for the slot. The caller adopts the context into a
//! block (`DposContext::from_dynasty_context`) or drops it.

use std::sync::Arc;

use crate::account::AccountProvider;
use crate::address::{Address, AddressError};
use crate::consensus::context::DposContext;
use crate::consensus::ConsensusError;
use crate::constants;
use crate::genesis::GenesisConfig;
use crate::storage::Storage;
use crate::trie::BatchTrie;

/// Storage key under which genesis seeding records the root of the genesis
/// dynasty trie. Candidate ranking and kick-out protection read it back to
/// identify bootstrap validators.
pub(crate) const GENESIS_DYNASTY_ROOT_KEY: &[u8] = b"dpos:genesis:dynasty-root";

/// The dynasty state effective at a given timestamp.
#[derive(Clone)]
pub struct DynastyContext {
    /// Timestamp of the slot this context was resolved for.
    pub timestamp: i64,
    /// Slot index within the dynasty.
    pub offset: i64,
    /// The unique legal proposer for the slot, if the dynasty has a member
    /// at this slot index.
    pub proposer: Option<Address>,
    pub dynasty: BatchTrie,
    pub next_dynasty: BatchTrie,
    pub delegate: BatchTrie,
    pub candidate: BatchTrie,
    pub vote: BatchTrie,
    pub mint_cnt: BatchTrie,
    pub accounts: Arc<dyn AccountProvider>,
    pub storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for DynastyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynastyContext")
            .field("timestamp", &self.timestamp)
            .field("offset", &self.offset)
            .field("proposer", &self.proposer)
            .field("dynasty", &self.dynasty)
            .field("next_dynasty", &self.next_dynasty)
            .field("delegate", &self.delegate)
            .field("candidate", &self.candidate)
            .field("vote", &self.vote)
            .field("mint_cnt", &self.mint_cnt)
            .finish()
    }
}

impl DynastyContext {
    /// Materialize the genesis dynasty context from configuration.
    ///
    /// Every configured validator becomes a candidate with a self-vote and
    /// a self-delegation; the first `DYNASTY_SIZE` seed the opening
    /// dynasty, and `next_dynasty` starts as its clone. The genesis dynasty
    /// root is recorded in storage for later bootstrap-validator checks.
    pub fn genesis(
        config: &GenesisConfig,
        storage: Arc<dyn Storage>,
        accounts: Arc<dyn AccountProvider>,
    ) -> Result<Self, ConsensusError> {
        if config.dynasty.len() < constants::SAFE_SIZE {
            return Err(ConsensusError::InitialDynastyNotEnough);
        }
        let mut dynasty = BatchTrie::new(None, storage.clone())?;
        let mut delegate = BatchTrie::new(None, storage.clone())?;
        let mut candidate = BatchTrie::new(None, storage.clone())?;
        let mut vote = BatchTrie::new(None, storage.clone())?;
        let mint_cnt = BatchTrie::new(None, storage.clone())?;

        for (i, entry) in config.dynasty.iter().enumerate() {
            let member: Address = entry.parse()?;
            let v = member.as_bytes();
            if i < constants::DYNASTY_SIZE {
                dynasty.put(v, v)?;
            }
            vote.put(v, v)?;
            let mut key = v.to_vec();
            key.extend_from_slice(v);
            delegate.put(&key, v)?;
            candidate.put(v, v)?;
        }
        let next_dynasty = dynasty.clone();
        storage.put(GENESIS_DYNASTY_ROOT_KEY, &dynasty.root_hash())?;
        tracing::info!(
            validators = config.dynasty.len(),
            "genesis dynasty context seeded"
        );

        Ok(DynastyContext {
            timestamp: constants::GENESIS_TIMESTAMP,
            offset: 0,
            proposer: None,
            dynasty,
            next_dynasty,
            delegate,
            candidate,
            vote,
            mint_cnt,
            accounts,
            storage,
        })
    }
}

impl DposContext {
    /// Resolve the dynasty context for the slot at `timestamp + elapsed`,
    /// where `timestamp` is the enclosing block's timestamp.
    ///
    /// Clones the six tries, replays every election between the base
    /// dynasty and the target dynasty in order, and resolves the slot
    /// proposer. Fails with [`ConsensusError::NotBlockForgeTime`] when the
    /// target timestamp is not a slot boundary.
    pub fn next_dynasty_context(
        &self,
        timestamp: i64,
        elapsed: i64,
        accounts: Arc<dyn AccountProvider>,
    ) -> Result<DynastyContext, ConsensusError> {
        let mut context = DynastyContext {
            timestamp: timestamp + elapsed,
            offset: 0,
            proposer: None,
            dynasty: self.dynasty.clone(),
            next_dynasty: self.next_dynasty.clone(),
            delegate: self.delegate.clone(),
            candidate: self.candidate.clone(),
            vote: self.vote.clone(),
            mint_cnt: self.mint_cnt.clone(),
            accounts,
            storage: self.storage.clone(),
        };

        let base_dynasty_id = timestamp / constants::DYNASTY_INTERVAL;
        let new_dynasty_id = context.timestamp / constants::DYNASTY_INTERVAL;
        let mut offset = context.timestamp % constants::DYNASTY_INTERVAL;
        if offset % constants::BLOCK_INTERVAL != 0 {
            return Err(ConsensusError::NotBlockForgeTime);
        }
        offset /= constants::BLOCK_INTERVAL;
        offset %= constants::DYNASTY_SIZE as i64;

        if base_dynasty_id < new_dynasty_id {
            // the genesis dynasty and its next dynasty are never kicked
            let base_is_genesis = base_dynasty_id == 0;
            if base_dynasty_id + 1 < new_dynasty_id {
                context.elect_next_dynasty_on_base_dynasty(
                    base_dynasty_id,
                    new_dynasty_id - 1,
                    base_is_genesis,
                )?;
            }
            context.elect_next_dynasty_on_base_dynasty(
                new_dynasty_id - 1,
                new_dynasty_id,
                base_is_genesis,
            )?;
        }

        let delegatees = traverse_dynasty(&context.dynasty)?;
        context.offset = offset;
        context.proposer = delegatees.get(offset as usize).copied();
        Ok(context)
    }
}

/// Enumerate all members of a dynasty trie in trie-iteration order.
pub fn traverse_dynasty(dynasty: &BatchTrie) -> Result<Vec<Address>, AddressError> {
    let mut members = Vec::new();
    for (_, value) in dynasty.iter_prefix(&[]) {
        members.push(Address::from_bytes(value)?);
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MemoryAccounts;
    use crate::storage::MemoryStorage;

    fn addr(n: u8) -> Address {
        Address::from_bytes(&[n; 20]).unwrap()
    }

    fn config(n: u8) -> GenesisConfig {
        GenesisConfig {
            dynasty: (1..=n).map(|i| addr(i).to_string()).collect(),
        }
    }

    fn genesis(n: u8) -> Result<DynastyContext, ConsensusError> {
        DynastyContext::genesis(
            &config(n),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryAccounts::new()),
        )
    }

    #[test]
    fn genesis_seeds_all_tries() {
        let context = genesis(7).unwrap();
        assert_eq!(context.candidate.len(), 7);
        assert_eq!(context.dynasty.len(), constants::DYNASTY_SIZE);
        assert_eq!(context.next_dynasty.len(), constants::DYNASTY_SIZE);
        assert_eq!(context.vote.len(), 7);
        assert_eq!(context.delegate.len(), 7);
        assert_eq!(context.timestamp, constants::GENESIS_TIMESTAMP);

        // self-vote and self-delegation layout
        let first = addr(1);
        assert_eq!(
            context.vote.get(first.as_bytes()),
            Some(&first.as_bytes()[..])
        );
        let mut self_key = first.as_bytes().to_vec();
        self_key.extend_from_slice(first.as_bytes());
        assert_eq!(
            context.delegate.get(&self_key),
            Some(&first.as_bytes()[..])
        );
    }

    #[test]
    fn genesis_requires_safe_size() {
        assert!(matches!(
            genesis(2),
            Err(ConsensusError::InitialDynastyNotEnough)
        ));
    }

    #[test]
    fn traversal_is_lexicographic() {
        let context = genesis(7).unwrap();
        let members = traverse_dynasty(&context.dynasty).unwrap();
        assert_eq!(members, (1..=6).map(addr).collect::<Vec<_>>());
    }

    #[test]
    fn misaligned_slot_is_rejected() {
        let context = genesis(7).unwrap();
        let dpos = DposContext::from_dynasty_context(&context);
        let err = dpos
            .next_dynasty_context(0, 3, context.accounts.clone())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::NotBlockForgeTime));
    }

    #[test]
    fn same_dynasty_advance_resolves_proposer_without_election() {
        let context = genesis(7).unwrap();
        let dpos = DposContext::from_dynasty_context(&context);
        let next = dpos
            .next_dynasty_context(0, 10, context.accounts.clone())
            .unwrap();
        assert_eq!(next.offset, 2);
        assert_eq!(next.proposer, Some(addr(3)));
        // no election ran
        assert_eq!(next.dynasty.root_hash(), context.dynasty.root_hash());
        assert_eq!(
            next.next_dynasty.root_hash(),
            context.next_dynasty.root_hash()
        );
    }
}
