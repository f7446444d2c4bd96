//! `StateManager`: the single entry point every component writes
//! through, so "no component shortcuts by addressing slots directly"
//! (spec §5) is enforced at the type level. Backed by a sparse Merkle
//! tree the way the teacher's `StateManager` is, keyed by
//! `keccak256(address)` with each leaf the hash of that account's
//! `AccountInfo` (balance, nonce, code hash, and a rolling digest over
//! every storage slot the account has received).

use std::sync::{Arc, Mutex};

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use sparse_merkle_tree::traits::{StoreReadOps, StoreWriteOps};
use sparse_merkle_tree::{BranchKey, BranchNode, SparseMerkleTree, H256};
use thiserror::Error;

use crate::crypto::{hash_data, Hash};
use crate::storage::{AccountInfo, Storage};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("SMT error: {0}")]
    Smt(String),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

// --- SMT serialization mirrors, identical in shape to the teacher's -------

#[derive(Serialize, Deserialize)]
enum SerdeMergeValue {
    Value([u8; 32]),
    MergeWithZero {
        base_node: [u8; 32],
        zero_bits: [u8; 32],
        zero_count: u8,
    },
}

impl From<sparse_merkle_tree::merge::MergeValue> for SerdeMergeValue {
    fn from(v: sparse_merkle_tree::merge::MergeValue) -> Self {
        use sparse_merkle_tree::merge::MergeValue::*;
        match v {
            Value(h) => SerdeMergeValue::Value(h.into()),
            MergeWithZero {
                base_node,
                zero_bits,
                zero_count,
            } => SerdeMergeValue::MergeWithZero {
                base_node: base_node.into(),
                zero_bits: zero_bits.into(),
                zero_count,
            },
        }
    }
}

#[allow(clippy::from_over_into)]
impl Into<sparse_merkle_tree::merge::MergeValue> for SerdeMergeValue {
    fn into(self) -> sparse_merkle_tree::merge::MergeValue {
        use sparse_merkle_tree::merge::MergeValue::*;
        match self {
            SerdeMergeValue::Value(h) => Value(H256::from(h)),
            SerdeMergeValue::MergeWithZero {
                base_node,
                zero_bits,
                zero_count,
            } => MergeWithZero {
                base_node: H256::from(base_node),
                zero_bits: H256::from(zero_bits),
                zero_count,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SerdeBranchNode {
    left: SerdeMergeValue,
    right: SerdeMergeValue,
}

impl From<BranchNode> for SerdeBranchNode {
    fn from(n: BranchNode) -> Self {
        SerdeBranchNode {
            left: n.left.into(),
            right: n.right.into(),
        }
    }
}

#[allow(clippy::from_over_into)]
impl Into<BranchNode> for SerdeBranchNode {
    fn into(self) -> BranchNode {
        BranchNode {
            left: self.left.into(),
            right: self.right.into(),
        }
    }
}

#[derive(Clone)]
pub struct GtosSmtStore {
    storage: Arc<dyn Storage>,
}

impl GtosSmtStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl StoreReadOps<H256> for GtosSmtStore {
    fn get_branch(&self, branch_key: &BranchKey) -> Result<Option<BranchNode>, sparse_merkle_tree::error::Error> {
        let node_hash = Hash(branch_key.node_key.into());
        match self.storage.get_smt_branch(branch_key.height, &node_hash) {
            Ok(Some(bytes)) => {
                let serde_node: SerdeBranchNode = bincode::deserialize(&bytes)
                    .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))?;
                Ok(Some(serde_node.into()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(sparse_merkle_tree::error::Error::Store(e.to_string())),
        }
    }

    fn get_leaf(&self, leaf_key: &H256) -> Result<Option<H256>, sparse_merkle_tree::error::Error> {
        let hash = Hash((*leaf_key).into());
        match self.storage.get_smt_leaf(&hash) {
            Ok(Some(bytes)) => {
                let val: [u8; 32] = bincode::deserialize(&bytes)
                    .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))?;
                Ok(Some(H256::from(val)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(sparse_merkle_tree::error::Error::Store(e.to_string())),
        }
    }
}

impl StoreWriteOps<H256> for GtosSmtStore {
    fn insert_branch(
        &mut self,
        node_key: BranchKey,
        branch: BranchNode,
    ) -> Result<(), sparse_merkle_tree::error::Error> {
        let serde_node: SerdeBranchNode = branch.into();
        let bytes = bincode::serialize(&serde_node)
            .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))?;
        let hash = Hash(node_key.node_key.into());
        self.storage
            .save_smt_branch(node_key.height, &hash, &bytes)
            .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))
    }

    fn insert_leaf(&mut self, leaf_key: H256, leaf: H256) -> Result<(), sparse_merkle_tree::error::Error> {
        let leaf_bytes: [u8; 32] = leaf.into();
        let bytes = bincode::serialize(&leaf_bytes)
            .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))?;
        let hash = Hash(leaf_key.into());
        self.storage
            .save_smt_leaf(&hash, &bytes)
            .map_err(|e| sparse_merkle_tree::error::Error::Store(e.to_string()))
    }

    fn remove_branch(&mut self, _node_key: &BranchKey) -> Result<(), sparse_merkle_tree::error::Error> {
        Ok(())
    }

    fn remove_leaf(&mut self, _leaf_key: &H256) -> Result<(), sparse_merkle_tree::error::Error> {
        Ok(())
    }
}

pub type StateTree = SparseMerkleTree<sparse_merkle_tree::blake2b::Blake2bHasher, H256, GtosSmtStore>;

pub struct StateManager {
    tree: Arc<Mutex<StateTree>>,
    storage: Arc<dyn Storage>,
}

impl StateManager {
    pub fn new(storage: Arc<dyn Storage>, initial_root: Option<Hash>) -> Self {
        let store = GtosSmtStore::new(storage.clone());
        let root = initial_root.map(|h| H256::from(h.0)).unwrap_or(H256::zero());
        let tree = SparseMerkleTree::new(root, store);
        Self {
            tree: Arc::new(Mutex::new(tree)),
            storage,
        }
    }

    pub fn root(&self) -> Hash {
        let tree = self.tree.lock().unwrap();
        Hash((*tree.root()).into())
    }

    fn update_account_leaf(&self, address: Address, account_hash: Hash) -> Result<(), StateError> {
        let key = H256::from(keccak256(address).0);
        let value = H256::from(account_hash.0);
        let mut tree = self.tree.lock().unwrap();
        tree.update(key, value).map_err(|e| StateError::Smt(format!("{e:?}")))?;
        Ok(())
    }

    pub fn get_account(&self, address: Address) -> Result<AccountInfo, StateError> {
        Ok(self.storage.get_account(&address)?.unwrap_or_default())
    }

    fn commit_account(&self, address: Address, info: AccountInfo) -> Result<(), StateError> {
        self.storage.save_account(&address, &info)?;
        self.update_account_leaf(address, hash_data(&info))
    }

    pub fn get_balance(&self, address: Address) -> Result<U256, StateError> {
        Ok(self.get_account(address)?.balance)
    }

    pub fn credit(&self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut info = self.get_account(address)?;
        info.balance += amount;
        self.commit_account(address, info)
    }

    pub fn debit(&self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut info = self.get_account(address)?;
        info.balance -= amount;
        self.commit_account(address, info)
    }

    pub fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<(), StateError> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    pub fn get_nonce(&self, address: Address) -> Result<u64, StateError> {
        Ok(self.get_account(address)?.nonce)
    }

    pub fn bump_nonce(&self, address: Address) -> Result<(), StateError> {
        let mut info = self.get_account(address)?;
        info.nonce += 1;
        self.commit_account(address, info)
    }

    /// Forces the account's nonce to at least `min` without touching
    /// anything else, so "empty account" cleanup can't drop slot storage
    /// that belongs to an account with nonce 0 and zero balance (spec §5,
    /// the KV-router bucket case).
    pub fn ensure_nonce_at_least(&self, address: Address, min: u64) -> Result<(), StateError> {
        let mut info = self.get_account(address)?;
        if info.nonce < min {
            info.nonce = min;
            self.commit_account(address, info)?;
        }
        Ok(())
    }

    /// Read a 32-byte storage slot owned by `address`. Zero slot if never
    /// written.
    pub fn get_slot(&self, address: Address, slot: B256) -> Result<[u8; 32], StateError> {
        Ok(self.storage.get_storage(&address, &slot)?)
    }

    /// Write a 32-byte storage slot and fold it into the account's
    /// storage digest, which moves the account's SMT leaf (and therefore
    /// the global root) even though the raw slot table isn't itself part
    /// of the tree.
    pub fn set_slot(&self, address: Address, slot: B256, value: [u8; 32]) -> Result<(), StateError> {
        self.storage.save_storage(&address, &slot, value)?;
        let mut info = self.get_account(address)?;
        let mut buf = Vec::with_capacity(32 + 32 + 32);
        buf.extend_from_slice(&info.storage_digest.0);
        buf.extend_from_slice(slot.as_slice());
        buf.extend_from_slice(&value);
        info.storage_digest = Hash(keccak256(buf).0);
        self.commit_account(address, info)
    }

    pub fn get_code(&self, address: Address) -> Result<Option<Vec<u8>>, StateError> {
        let info = self.get_account(address)?;
        if let Some(code) = info.code {
            return Ok(Some(code));
        }
        if info.code_hash == Hash::default() {
            return Ok(None);
        }
        Ok(self.storage.get_code(&info.code_hash)?)
    }

    pub fn has_live_code(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_code(address)?.is_some())
    }

    pub fn set_code(&self, address: Address, code: &[u8]) -> Result<(), StateError> {
        let hash = Hash(keccak256(code).0);
        self.storage.save_code(&hash, code)?;
        let mut info = self.get_account(address)?;
        info.code_hash = hash;
        info.code = None;
        self.commit_account(address, info)
    }

    pub fn clear_code(&self, address: Address) -> Result<(), StateError> {
        let mut info = self.get_account(address)?;
        info.code_hash = Hash::default();
        info.code = None;
        self.commit_account(address, info)
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            storage: self.storage.clone(),
        }
    }
}
