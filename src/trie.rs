//! Authenticated key-value map with batch scopes.
//!
//! `BatchTrie` is the building block of the consensus state: an ordered map
//! over raw byte keys with
//!
//! - a deterministic root hash committing to the full contents,
//! - lexicographic prefix iteration (the "trie-iteration order" the
//!   proposer schedule depends on),
//! - batch begin/commit/rollback so a block's mutations apply atomically
//!   from the caller's point of view, and
//! - content-addressed snapshot persistence, so any root ever exported can
//!   be rehydrated from storage.
//!
//! Writes outside a batch persist through immediately; writes inside a
//! batch accumulate in memory with an undo log and only hit storage at
//! commit. Cloning produces a logically independent map sharing the same
//! storage handle — mutations on the clone never show through.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::storage::{Storage, StorageError};
use crate::Hash;

/// Root hash of an empty trie. Kept at a fixed 32 bytes so digests over
/// concatenated roots have a stable preimage layout.
pub const EMPTY_ROOT: Hash = [0u8; 32];

const SNAPSHOT_PREFIX: &[u8] = b"trie:";

/// Errors from trie operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TrieError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("unknown trie root {0}")]
    UnknownRoot(String),
    #[error("corrupt trie snapshot: {0}")]
    Corrupt(String),
}

/// One undo record: the key touched and the value it held before.
type UndoEntry = (Vec<u8>, Option<Vec<u8>>);

/// An authenticated ordered map with batch scopes.
#[derive(Clone)]
pub struct BatchTrie {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Undo log of the open batch, `None` when no batch is open.
    undo: Option<Vec<UndoEntry>>,
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for BatchTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTrie")
            .field("entries", &self.entries)
            .field("undo", &self.undo)
            .finish()
    }
}

impl BatchTrie {
    /// Create a trie over the given storage. With `root == None` (or the
    /// empty root) the trie starts empty; otherwise the snapshot stored
    /// under that root is loaded.
    pub fn new(root: Option<&Hash>, storage: Arc<dyn Storage>) -> Result<Self, TrieError> {
        let entries = match root {
            None => BTreeMap::new(),
            Some(root) if *root == EMPTY_ROOT => BTreeMap::new(),
            Some(root) => {
                let bytes = storage
                    .get(&snapshot_key(root))?
                    .ok_or_else(|| TrieError::UnknownRoot(hex::encode(root)))?;
                let pairs: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(&bytes)
                    .map_err(|e| TrieError::Corrupt(e.to_string()))?;
                pairs.into_iter().collect()
            }
        };
        Ok(BatchTrie {
            entries,
            undo: None,
            storage,
        })
    }

    /// The root hash committing to the current contents, batched writes
    /// included.
    pub fn root_hash(&self) -> Hash {
        if self.entries.is_empty() {
            return EMPTY_ROOT;
        }
        let mut hasher = blake3::Hasher::new();
        for (key, value) in &self.entries {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key);
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        *hasher.finalize().as_bytes()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or replace a value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let prev = self.entries.insert(key.to_vec(), value.to_vec());
        match self.undo.as_mut() {
            Some(log) => log.push((key.to_vec(), prev)),
            None => self.persist()?,
        }
        Ok(())
    }

    /// Remove a key, returning its previous value if it was present.
    pub fn del(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let prev = self.entries.remove(key);
        if prev.is_some() {
            match self.undo.as_mut() {
                Some(log) => log.push((key.to_vec(), prev.clone())),
                None => self.persist()?,
            }
        }
        Ok(prev)
    }

    /// Iterate entries whose key starts with `prefix`, in lexicographic key
    /// order. An empty prefix iterates the whole trie.
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    /// Open a batch scope. Subsequent writes accumulate in memory until
    /// `commit` or `roll_back`. Opening a batch inside an open batch folds
    /// into the existing scope.
    pub fn begin_batch(&mut self) {
        self.undo.get_or_insert_with(Vec::new);
    }

    /// Commit the open batch: drop the undo log and persist a snapshot of
    /// the current contents under its root hash.
    pub fn commit(&mut self) -> Result<(), TrieError> {
        self.undo = None;
        self.persist()
    }

    /// Discard the open batch, restoring the contents from before
    /// `begin_batch`.
    pub fn roll_back(&mut self) {
        if let Some(log) = self.undo.take() {
            for (key, prev) in log.into_iter().rev() {
                match prev {
                    Some(value) => {
                        self.entries.insert(key, value);
                    }
                    None => {
                        self.entries.remove(&key);
                    }
                }
            }
        }
    }

    /// Write the current contents to storage under their root hash.
    /// Snapshots are content-addressed, so an already-present root is a
    /// no-op and historical roots stay rehydratable.
    fn persist(&self) -> Result<(), TrieError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let key = snapshot_key(&self.root_hash());
        if self.storage.get(&key)?.is_some() {
            return Ok(());
        }
        let pairs: Vec<(&Vec<u8>, &Vec<u8>)> = self.entries.iter().collect();
        let bytes = bincode::serialize(&pairs)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.put(&key, &bytes)?;
        Ok(())
    }
}

fn snapshot_key(root: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(SNAPSHOT_PREFIX.len() + root.len());
    key.extend_from_slice(SNAPSHOT_PREFIX);
    key.extend_from_slice(root);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn empty_trie() -> BatchTrie {
        BatchTrie::new(None, Arc::new(MemoryStorage::new())).unwrap()
    }

    #[test]
    fn put_get_del() {
        let mut trie = empty_trie();
        assert!(trie.is_empty());
        trie.put(b"alpha", b"1").unwrap();
        trie.put(b"beta", b"2").unwrap();
        assert_eq!(trie.get(b"alpha"), Some(&b"1"[..]));
        assert_eq!(trie.len(), 2);
        assert_eq!(trie.del(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(trie.del(b"alpha").unwrap(), None);
        assert_eq!(trie.get(b"alpha"), None);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let mut a = empty_trie();
        let mut b = empty_trie();
        a.put(b"x", b"1").unwrap();
        a.put(b"y", b"2").unwrap();
        b.put(b"y", b"2").unwrap();
        b.put(b"x", b"1").unwrap();
        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn root_changes_with_contents() {
        let mut trie = empty_trie();
        assert_eq!(trie.root_hash(), EMPTY_ROOT);
        trie.put(b"x", b"1").unwrap();
        let first = trie.root_hash();
        assert_ne!(first, EMPTY_ROOT);
        trie.put(b"x", b"2").unwrap();
        assert_ne!(trie.root_hash(), first);
        trie.put(b"x", b"1").unwrap();
        assert_eq!(trie.root_hash(), first);
    }

    #[test]
    fn prefix_iteration_is_ordered() {
        let mut trie = empty_trie();
        trie.put(b"ab", b"2").unwrap();
        trie.put(b"aa", b"1").unwrap();
        trie.put(b"b", b"3").unwrap();
        let keys: Vec<&[u8]> = trie.iter_prefix(b"a").map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"aa"[..], &b"ab"[..]]);
        assert_eq!(trie.iter_prefix(&[]).count(), 3);
        assert_eq!(trie.iter_prefix(b"zz").count(), 0);
    }

    #[test]
    fn batch_rollback_restores_prior_state() {
        let mut trie = empty_trie();
        trie.put(b"keep", b"1").unwrap();
        let before = trie.root_hash();
        trie.begin_batch();
        trie.put(b"keep", b"overwritten").unwrap();
        trie.put(b"new", b"2").unwrap();
        trie.del(b"keep").unwrap();
        trie.roll_back();
        assert_eq!(trie.root_hash(), before);
        assert_eq!(trie.get(b"keep"), Some(&b"1"[..]));
        assert_eq!(trie.get(b"new"), None);
    }

    #[test]
    fn batch_commit_keeps_writes() {
        let mut trie = empty_trie();
        trie.begin_batch();
        trie.put(b"k", b"v").unwrap();
        trie.commit().unwrap();
        assert_eq!(trie.get(b"k"), Some(&b"v"[..]));
        // rollback after commit must be a no-op
        trie.roll_back();
        assert_eq!(trie.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn committed_root_rehydrates() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut trie = BatchTrie::new(None, storage.clone()).unwrap();
        trie.begin_batch();
        trie.put(b"a", b"1").unwrap();
        trie.put(b"b", b"2").unwrap();
        trie.commit().unwrap();
        let root = trie.root_hash();

        let restored = BatchTrie::new(Some(&root), storage).unwrap();
        assert_eq!(restored.root_hash(), root);
        assert_eq!(restored.get(b"a"), Some(&b"1"[..]));
    }

    #[test]
    fn non_batch_writes_rehydrate_too() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let mut trie = BatchTrie::new(None, storage.clone()).unwrap();
        trie.put(b"a", b"1").unwrap();
        let root = trie.root_hash();
        let restored = BatchTrie::new(Some(&root), storage).unwrap();
        assert_eq!(restored.get(b"a"), Some(&b"1"[..]));
    }

    #[test]
    fn unknown_root_is_an_error() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let root = [7u8; 32];
        assert!(matches!(
            BatchTrie::new(Some(&root), storage),
            Err(TrieError::UnknownRoot(_))
        ));
    }

    #[test]
    fn clone_is_isolated() {
        let mut trie = empty_trie();
        trie.put(b"shared", b"1").unwrap();
        let original_root = trie.root_hash();

        let mut clone = trie.clone();
        clone.put(b"only-clone", b"2").unwrap();
        clone.del(b"shared").unwrap();

        assert_eq!(trie.root_hash(), original_root);
        assert_eq!(trie.get(b"shared"), Some(&b"1"[..]));
        assert_eq!(trie.get(b"only-clone"), None);
    }
}
