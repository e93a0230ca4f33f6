//! Account state consumed by the consensus core.
//!
//! The tally weighs each delegator by its balance, and the election tail
//! seed folds in the account-state root, so the core needs a read view of
//! the account state. `AccountProvider` is that seam; the full account
//! machinery (nonces, execution, receipts) lives outside this crate.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::Hash;

/// Read-only view of account state.
pub trait AccountProvider: Send + Sync {
    /// Balance of an account. Unknown accounts hold zero — looking one up
    /// never fails and never mutates consensus state.
    fn balance(&self, address: &Address) -> u128;

    /// Root hash of the account state. Folded into the election tail seed,
    /// so it must be deterministic across nodes.
    fn root_hash(&self) -> Hash;
}

/// Map-backed account state for tests and replay tooling.
#[derive(Clone, Debug, Default)]
pub struct MemoryAccounts {
    balances: BTreeMap<Address, u128>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&mut self, address: Address, balance: u128) {
        self.balances.insert(address, balance);
    }
}

impl AccountProvider for MemoryAccounts {
    fn balance(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Deterministic digest over the sorted account set: count, then each
    /// address and little-endian balance.
    fn root_hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.balances.len() as u64).to_le_bytes());
        for (address, balance) in &self.balances {
            hasher.update(address.as_bytes());
            hasher.update(&balance.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_bytes(&[n; 20]).unwrap()
    }

    #[test]
    fn unknown_account_has_zero_balance() {
        let accounts = MemoryAccounts::new();
        assert_eq!(accounts.balance(&addr(1)), 0);
    }

    #[test]
    fn root_tracks_balances() {
        let mut accounts = MemoryAccounts::new();
        let empty_root = accounts.root_hash();
        accounts.set_balance(addr(1), 100);
        let one_root = accounts.root_hash();
        assert_ne!(empty_root, one_root);
        accounts.set_balance(addr(1), 100);
        assert_eq!(accounts.root_hash(), one_root);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let mut a = MemoryAccounts::new();
        a.set_balance(addr(1), 10);
        a.set_balance(addr(2), 20);
        let mut b = MemoryAccounts::new();
        b.set_balance(addr(2), 20);
        b.set_balance(addr(1), 10);
        assert_eq!(a.root_hash(), b.root_hash());
    }
}
