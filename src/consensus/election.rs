//! Vote tally, candidate ranking, kick-out and dynasty elections.
//!
//! Every step here is consensus-critical: tally sums are exact `u128`
//! arithmetic, ranking ties break on canonical address order, and the tail
//! seat of each dynasty is drawn with FNV-1a so that all nodes commit to
//! the same choice. Replacing any of these with an "equivalent" would fork
//! the chain.

use std::collections::HashMap;

use crate::address::Address;
use crate::consensus::context::mint_key;
use crate::consensus::dynasty::{
    traverse_dynasty, DynastyContext, GENESIS_DYNASTY_ROOT_KEY,
};
use crate::consensus::ConsensusError;
use crate::trie::{BatchTrie, TrieError};
use crate::{constants, decode_i64, encode_i64, Hash};

/// A candidate with its cumulative delegated stake, as ordered by
/// [`DynastyContext::choose_candidates`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedCandidate {
    pub address: Address,
    pub votes: u128,
}

impl DynastyContext {
    /// Sum each candidate's delegated stake.
    ///
    /// For every candidate, walks the delegate trie under the candidate's
    /// key prefix and adds each delegator's balance. A candidate without
    /// delegations scores zero but stays in the result.
    pub fn tally_votes(&self) -> Result<HashMap<Address, u128>, ConsensusError> {
        let mut votes = HashMap::new();
        if self.candidate.is_empty() {
            return Ok(votes);
        }
        for (_, value) in self.candidate.iter_prefix(&[]) {
            let delegatee = Address::from_bytes(value)?;
            let mut score: u128 = 0;
            for (_, delegator_bytes) in self.delegate.iter_prefix(delegatee.as_bytes()) {
                let delegator = Address::from_bytes(delegator_bytes)?;
                score = score.saturating_add(self.accounts.balance(&delegator));
            }
            votes.insert(delegatee, score);
        }
        Ok(votes)
    }

    /// Order candidates for the next election.
    ///
    /// Active bootstrap validators (genesis dynasty members still in the
    /// candidate set) are pulled out of the tally, zero-scored, sorted by
    /// address and placed ahead of everyone else. The rest sort by score
    /// descending with ascending address as the tie-break.
    pub fn choose_candidates(
        &self,
        mut votes: HashMap<Address, u128>,
    ) -> Result<Vec<RankedCandidate>, ConsensusError> {
        let mut bootstrap: Vec<RankedCandidate> = Vec::new();
        for validator in self.genesis_dynasty_members()? {
            if !self.candidate.contains(validator.as_bytes()) {
                continue;
            }
            votes.remove(&validator);
            bootstrap.push(RankedCandidate {
                address: validator,
                votes: 0,
            });
        }
        bootstrap.sort_by(|a, b| a.address.cmp(&b.address));

        let mut ranked: Vec<RankedCandidate> = votes
            .into_iter()
            .map(|(address, votes)| RankedCandidate { address, votes })
            .collect();
        ranked.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.address.cmp(&b.address)));

        bootstrap.extend(ranked);
        Ok(bootstrap)
    }

    /// Remove a candidate along with its delegations and the votes pointing
    /// at it. Kicking an address that is not a candidate is a no-op.
    pub fn kick_candidate(&mut self, candidate: &Address) -> Result<(), ConsensusError> {
        kick_candidate_from(
            &mut self.candidate,
            &mut self.delegate,
            &mut self.vote,
            candidate,
        )
    }

    /// Kick every validator of the current dynasty that failed to produce
    /// its share of blocks in dynasty `dynasty_id`. Active bootstrap
    /// validators are spared so the candidate set cannot collapse below
    /// `SAFE_SIZE` while the network bootstraps.
    pub fn kick_dynasty(&mut self, dynasty_id: i64) -> Result<(), ConsensusError> {
        tracing::info!(dynasty_id, "kicking out absent validators");
        let genesis_members = self.genesis_dynasty_members()?;
        let validators = traverse_dynasty(&self.dynasty)?;
        for validator in validators {
            let key = mint_key(dynasty_id, &validator);
            let survived = match self.mint_cnt.get(&key) {
                Some(bytes) => {
                    let count = decode_i64(bytes).unwrap_or(0);
                    count
                        >= constants::DYNASTY_INTERVAL
                            / constants::BLOCK_INTERVAL
                            / constants::DYNASTY_SIZE as i64
                            / 2
                }
                None => false,
            };
            if survived {
                continue;
            }
            if genesis_members.contains(&validator)
                && self.candidate.contains(validator.as_bytes())
            {
                tracing::warn!(
                    validator = %validator,
                    "active bootstrap validator spared from kick-out"
                );
            } else {
                self.kick_candidate(&validator)?;
            }
        }
        Ok(())
    }

    /// Advance the election state from dynasty `base_dynasty_id` to
    /// `next_dynasty_id`, one dynasty at a time.
    ///
    /// Each step kicks absent validators (never when electing off the
    /// genesis dynasty), tallies and ranks the candidates, seats the top
    /// `DYNASTY_SIZE - 1` directly and fills the last seat with an FNV-1a
    /// draw over the remaining candidates, then rotates
    /// `dynasty ← next_dynasty ← elected`.
    pub fn elect_next_dynasty_on_base_dynasty(
        &mut self,
        base_dynasty_id: i64,
        next_dynasty_id: i64,
        base_is_genesis: bool,
    ) -> Result<(), ConsensusError> {
        tracing::info!(
            from = base_dynasty_id,
            to = next_dynasty_id,
            "electing next dynasty"
        );
        let base = if base_is_genesis {
            next_dynasty_id - 1
        } else {
            base_dynasty_id
        };
        for i in base..next_dynasty_id {
            if !base_is_genesis {
                self.kick_dynasty(i)?;
            }
            let votes = self.tally_votes()?;
            let candidates = self.choose_candidates(votes)?;
            if candidates.len() < constants::SAFE_SIZE {
                return Err(ConsensusError::TooFewCandidates);
            }

            let mut elected = BatchTrie::new(None, self.storage.clone())?;
            let direct = constants::DYNASTY_SIZE - 1;
            for candidate in candidates.iter().take(direct) {
                tracing::debug!(
                    candidate = %candidate.address,
                    votes = candidate.votes,
                    "direct dynasty seat"
                );
                let delegatee = candidate.address.as_bytes();
                elected.put(delegatee, delegatee)?;
            }
            if candidates.len() > direct {
                let mut seed = encode_i64(next_dynasty_id).to_vec();
                seed.extend_from_slice(&self.accounts.root_hash());
                let draw = fnv1a32(&seed) as usize % (candidates.len() - direct);
                let tail = &candidates[draw + direct];
                tracing::debug!(candidate = %tail.address, "tail dynasty seat");
                let delegatee = tail.address.as_bytes();
                elected.put(delegatee, delegatee)?;
            }

            self.dynasty = std::mem::replace(&mut self.next_dynasty, elected);
        }
        Ok(())
    }

    /// Members of the genesis dynasty, read back through the root recorded
    /// at genesis seeding.
    fn genesis_dynasty_members(&self) -> Result<Vec<Address>, ConsensusError> {
        let root_bytes = self
            .storage
            .get(GENESIS_DYNASTY_ROOT_KEY)?
            .ok_or(ConsensusError::GenesisDynastyMissing)?;
        let root: Hash = root_bytes
            .as_slice()
            .try_into()
            .map_err(|_| TrieError::Corrupt("genesis dynasty root has wrong length".into()))?;
        let genesis_dynasty = BatchTrie::new(Some(&root), self.storage.clone())?;
        Ok(traverse_dynasty(&genesis_dynasty)?)
    }
}

/// Remove `candidate` from the candidate trie, every delegate entry under
/// its prefix, and every vote pointing at it. Shared by dynasty kick-out
/// and candidate withdrawal.
pub(crate) fn kick_candidate_from(
    candidate_trie: &mut BatchTrie,
    delegate_trie: &mut BatchTrie,
    vote_trie: &mut BatchTrie,
    candidate: &Address,
) -> Result<(), ConsensusError> {
    if candidate_trie.del(candidate.as_bytes())?.is_none() {
        return Ok(());
    }
    let delegators: Vec<Vec<u8>> = delegate_trie
        .iter_prefix(candidate.as_bytes())
        .map(|(_, delegator)| delegator.to_vec())
        .collect();
    for delegator in delegators {
        let mut key = candidate.as_bytes().to_vec();
        key.extend_from_slice(&delegator);
        delegate_trie.del(&key)?;
        // A delegation without a vote entry is state corruption; tolerate
        // it so block replay cannot diverge on it, but make it visible.
        let votes_for_candidate = match vote_trie.get(&delegator) {
            Some(votee) => votee == candidate.as_bytes(),
            None => {
                tracing::error!(
                    delegator = %hex::encode(&delegator),
                    "delegate entry without a matching vote entry"
                );
                false
            }
        };
        if votes_for_candidate {
            vote_trie.del(&delegator)?;
        }
    }
    tracing::info!(candidate = %candidate, "kicked out candidate");
    Ok(())
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit. The chain commits to this exact digest for the tail
/// seat draw; it is not a cryptographic hash and must not become one.
pub(crate) fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a32_reference_vectors() {
        // reference digests from the FNV specification
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn ranking_orders_by_score_then_address() {
        let a = Address::from_bytes(&[1; 20]).unwrap();
        let b = Address::from_bytes(&[2; 20]).unwrap();
        let c = Address::from_bytes(&[3; 20]).unwrap();
        let mut ranked = vec![
            RankedCandidate { address: c, votes: 5 },
            RankedCandidate { address: a, votes: 3 },
            RankedCandidate { address: b, votes: 5 },
        ];
        ranked.sort_by(|x, y| y.votes.cmp(&x.votes).then_with(|| x.address.cmp(&y.address)));
        let order: Vec<Address> = ranked.into_iter().map(|r| r.address).collect();
        assert_eq!(order, vec![b, c, a]);
    }
}
