//! The DPoS context store: six tries behind one batch boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::address::Address;
use crate::consensus::dynasty::DynastyContext;
use crate::consensus::election;
use crate::consensus::ConsensusError;
use crate::storage::Storage;
use crate::trie::{BatchTrie, TrieError};
use crate::{constants, decode_i64, encode_i64, Hash};

/// The six trie roots as they appear in a block header.
///
/// The tuple order here (`dynasty, next_dynasty, delegate, candidate, vote,
/// mint_cnt`) differs from the combined-digest order in
/// [`DposContext::root_hash`]; both are consensus-critical and must never
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRoots {
    pub dynasty_root: Hash,
    pub next_dynasty_root: Hash,
    pub delegate_root: Hash,
    pub candidate_root: Hash,
    pub vote_root: Hash,
    pub mint_cnt_root: Hash,
}

/// The DPoS consensus state carried by every block.
#[derive(Clone)]
pub struct DposContext {
    pub(crate) dynasty: BatchTrie,
    pub(crate) next_dynasty: BatchTrie,
    pub(crate) delegate: BatchTrie,
    pub(crate) vote: BatchTrie,
    pub(crate) candidate: BatchTrie,
    pub(crate) mint_cnt: BatchTrie,
    pub(crate) storage: Arc<dyn Storage>,
}

impl DposContext {
    /// Create an empty context over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Result<Self, TrieError> {
        Ok(DposContext {
            dynasty: BatchTrie::new(None, storage.clone())?,
            next_dynasty: BatchTrie::new(None, storage.clone())?,
            delegate: BatchTrie::new(None, storage.clone())?,
            vote: BatchTrie::new(None, storage.clone())?,
            candidate: BatchTrie::new(None, storage.clone())?,
            mint_cnt: BatchTrie::new(None, storage.clone())?,
            storage,
        })
    }

    /// Rehydrate a context from the root tuple of a block header.
    pub fn from_roots(
        roots: &ContextRoots,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, TrieError> {
        Ok(DposContext {
            dynasty: BatchTrie::new(Some(&roots.dynasty_root), storage.clone())?,
            next_dynasty: BatchTrie::new(Some(&roots.next_dynasty_root), storage.clone())?,
            delegate: BatchTrie::new(Some(&roots.delegate_root), storage.clone())?,
            candidate: BatchTrie::new(Some(&roots.candidate_root), storage.clone())?,
            vote: BatchTrie::new(Some(&roots.vote_root), storage.clone())?,
            mint_cnt: BatchTrie::new(Some(&roots.mint_cnt_root), storage.clone())?,
            storage,
        })
    }

    /// Adopt a scheduler-produced dynasty context as the state of a block
    /// under assembly or validation.
    pub fn from_dynasty_context(context: &DynastyContext) -> Self {
        DposContext {
            dynasty: context.dynasty.clone(),
            next_dynasty: context.next_dynasty.clone(),
            delegate: context.delegate.clone(),
            vote: context.vote.clone(),
            candidate: context.candidate.clone(),
            mint_cnt: context.mint_cnt.clone(),
            storage: context.storage.clone(),
        }
    }

    /// Project the context to its header root tuple.
    pub fn to_roots(&self) -> ContextRoots {
        ContextRoots {
            dynasty_root: self.dynasty.root_hash(),
            next_dynasty_root: self.next_dynasty.root_hash(),
            delegate_root: self.delegate.root_hash(),
            candidate_root: self.candidate.root_hash(),
            vote_root: self.vote.root_hash(),
            mint_cnt_root: self.mint_cnt.root_hash(),
        }
    }

    /// Combined root over all six tries.
    ///
    /// SHA3-256 over the concatenation in the order `dynasty, next_dynasty,
    /// delegate, vote, candidate, mint_cnt`. Note this is not the header
    /// tuple order.
    pub fn root_hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.dynasty.root_hash());
        hasher.update(self.next_dynasty.root_hash());
        hasher.update(self.delegate.root_hash());
        hasher.update(self.vote.root_hash());
        hasher.update(self.candidate.root_hash());
        hasher.update(self.mint_cnt.root_hash());
        let digest = hasher.finalize();
        let mut root = [0u8; 32];
        root.copy_from_slice(&digest);
        root
    }

    /// Open a batch scope on all six tries.
    pub fn begin_batch(&mut self) {
        tracing::debug!("dpos context batch begin");
        self.delegate.begin_batch();
        self.dynasty.begin_batch();
        self.next_dynasty.begin_batch();
        self.candidate.begin_batch();
        self.vote.begin_batch();
        self.mint_cnt.begin_batch();
    }

    /// Commit the open batch on all six tries. Tries commit independently
    /// in fixed order; atomicity across tries comes from the enclosing
    /// block commit barrier.
    pub fn commit(&mut self) -> Result<(), TrieError> {
        self.delegate.commit()?;
        self.dynasty.commit()?;
        self.next_dynasty.commit()?;
        self.candidate.commit()?;
        self.vote.commit()?;
        self.mint_cnt.commit()?;
        tracing::debug!("dpos context batch committed");
        Ok(())
    }

    /// Discard the open batch on all six tries.
    pub fn roll_back(&mut self) {
        self.delegate.roll_back();
        self.dynasty.roll_back();
        self.next_dynasty.roll_back();
        self.candidate.roll_back();
        self.vote.roll_back();
        self.mint_cnt.roll_back();
        tracing::debug!("dpos context batch rolled back");
    }

    pub fn dynasty(&self) -> &BatchTrie {
        &self.dynasty
    }

    pub fn next_dynasty(&self) -> &BatchTrie {
        &self.next_dynasty
    }

    pub fn delegate_trie(&self) -> &BatchTrie {
        &self.delegate
    }

    pub fn vote(&self) -> &BatchTrie {
        &self.vote
    }

    pub fn candidate(&self) -> &BatchTrie {
        &self.candidate
    }

    pub fn mint_cnt(&self) -> &BatchTrie {
        &self.mint_cnt
    }

    /// Register an address as an election candidate. Re-registering is a
    /// no-op.
    pub fn register_candidate(&mut self, candidate: &Address) -> Result<(), ConsensusError> {
        let bytes = candidate.as_bytes();
        self.candidate.put(bytes, bytes)?;
        Ok(())
    }

    /// Withdraw a candidate, cleaning up its delegations and the votes
    /// pointing at it.
    pub fn kick_candidate(&mut self, candidate: &Address) -> Result<(), ConsensusError> {
        election::kick_candidate_from(
            &mut self.candidate,
            &mut self.delegate,
            &mut self.vote,
            candidate,
        )
    }

    /// Point `delegator`'s vote at `delegatee`, replacing any previous
    /// delegation. The delegatee must be a registered candidate.
    pub fn delegate(
        &mut self,
        delegator: &Address,
        delegatee: &Address,
    ) -> Result<(), ConsensusError> {
        if !self.candidate.contains(delegatee.as_bytes()) {
            return Err(ConsensusError::DelegateToNonCandidate);
        }
        if let Some(previous) = self.vote.get(delegator.as_bytes()).map(|v| v.to_vec()) {
            let mut key = previous;
            key.extend_from_slice(delegator.as_bytes());
            self.delegate.del(&key)?;
        }
        let mut key = delegatee.as_bytes().to_vec();
        key.extend_from_slice(delegator.as_bytes());
        self.delegate.put(&key, delegator.as_bytes())?;
        self.vote.put(delegator.as_bytes(), delegatee.as_bytes())?;
        Ok(())
    }

    /// Withdraw `delegator`'s current vote and delegation.
    pub fn undelegate(&mut self, delegator: &Address) -> Result<(), ConsensusError> {
        let delegatee = self
            .vote
            .get(delegator.as_bytes())
            .map(|v| v.to_vec())
            .ok_or(ConsensusError::NotDelegated)?;
        let mut key = delegatee;
        key.extend_from_slice(delegator.as_bytes());
        self.delegate.del(&key)?;
        self.vote.del(delegator.as_bytes())?;
        Ok(())
    }

    /// Record one produced block for `proposer` in the dynasty covering
    /// `timestamp`.
    pub fn record_mint(
        &mut self,
        timestamp: i64,
        proposer: &Address,
    ) -> Result<(), TrieError> {
        let key = mint_key(timestamp / constants::DYNASTY_INTERVAL, proposer);
        let count = self
            .mint_cnt
            .get(&key)
            .and_then(decode_i64)
            .unwrap_or(0);
        self.mint_cnt.put(&key, &encode_i64(count + 1))
    }

    /// Number of blocks `proposer` produced in the dynasty covering
    /// `timestamp`.
    pub fn mint_count(&self, timestamp: i64, proposer: &Address) -> i64 {
        let key = mint_key(timestamp / constants::DYNASTY_INTERVAL, proposer);
        self.mint_cnt.get(&key).and_then(decode_i64).unwrap_or(0)
    }
}

pub(crate) fn mint_key(dynasty_id: i64, delegatee: &Address) -> Vec<u8> {
    let mut key = encode_i64(dynasty_id).to_vec();
    key.extend_from_slice(delegatee.as_bytes());
    key
}
