//! The storage backend: per-account metadata and 32-byte storage slots,
//! plus the sparse-Merkle-tree branch/leaf tables `StateManager` uses for
//! root derivation. Mirrors the teacher's `Storage` trait shape (an
//! abstract backend behind `Arc<dyn Storage>`, a `MemStorage` for tests,
//! and a disk-backed implementation) but the disk format itself — like
//! the chain database backend generally — is an external collaborator;
//! this crate only needs *a* backend, not a tuned one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::Hash;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Per-account metadata: native-token balance, nonce, and an optional
/// code pointer. `storage_digest` is a rolling accumulator over every slot
/// write the account has received, folded into the account's SMT leaf so
/// slot mutations (KV puts, stake changes, ...) actually move the state
/// root instead of only balance/nonce changes moving it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: Hash,
    pub code: Option<Vec<u8>>,
    pub storage_digest: Hash,
}

pub trait Storage: Send + Sync {
    fn get_account(&self, address: &Address) -> Result<Option<AccountInfo>, StorageError>;
    fn save_account(&self, address: &Address, info: &AccountInfo) -> Result<(), StorageError>;

    fn get_storage(&self, address: &Address, slot: &B256) -> Result<[u8; 32], StorageError>;
    fn save_storage(
        &self,
        address: &Address,
        slot: &B256,
        value: [u8; 32],
    ) -> Result<(), StorageError>;

    fn get_code(&self, code_hash: &Hash) -> Result<Option<Vec<u8>>, StorageError>;
    fn save_code(&self, code_hash: &Hash, code: &[u8]) -> Result<(), StorageError>;

    fn get_smt_branch(&self, height: u8, key: &Hash) -> Result<Option<Vec<u8>>, StorageError>;
    fn save_smt_branch(&self, height: u8, key: &Hash, value: &[u8]) -> Result<(), StorageError>;
    fn get_smt_leaf(&self, key: &Hash) -> Result<Option<Vec<u8>>, StorageError>;
    fn save_smt_leaf(&self, key: &Hash, value: &[u8]) -> Result<(), StorageError>;
}

// -----------------------------------------------------------------------------
// In-memory storage, used throughout the test suite.
// -----------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemStorage {
    accounts: Arc<Mutex<HashMap<Address, AccountInfo>>>,
    slots: Arc<Mutex<HashMap<(Address, B256), [u8; 32]>>>,
    code: Arc<Mutex<HashMap<Hash, Vec<u8>>>>,
    smt_branches: Arc<Mutex<HashMap<(u8, Hash), Vec<u8>>>>,
    smt_leaves: Arc<Mutex<HashMap<Hash, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn get_account(&self, address: &Address) -> Result<Option<AccountInfo>, StorageError> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    fn save_account(&self, address: &Address, info: &AccountInfo) -> Result<(), StorageError> {
        self.accounts.lock().unwrap().insert(*address, info.clone());
        Ok(())
    }

    fn get_storage(&self, address: &Address, slot: &B256) -> Result<[u8; 32], StorageError> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .get(&(*address, *slot))
            .copied()
            .unwrap_or([0u8; 32]))
    }

    fn save_storage(
        &self,
        address: &Address,
        slot: &B256,
        value: [u8; 32],
    ) -> Result<(), StorageError> {
        self.slots.lock().unwrap().insert((*address, *slot), value);
        Ok(())
    }

    fn get_code(&self, code_hash: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.code.lock().unwrap().get(code_hash).cloned())
    }

    fn save_code(&self, code_hash: &Hash, code: &[u8]) -> Result<(), StorageError> {
        self.code.lock().unwrap().insert(*code_hash, code.to_vec());
        Ok(())
    }

    fn get_smt_branch(&self, height: u8, key: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.smt_branches.lock().unwrap().get(&(height, *key)).cloned())
    }

    fn save_smt_branch(&self, height: u8, key: &Hash, value: &[u8]) -> Result<(), StorageError> {
        self.smt_branches
            .lock()
            .unwrap()
            .insert((height, *key), value.to_vec());
        Ok(())
    }

    fn get_smt_leaf(&self, key: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.smt_leaves.lock().unwrap().get(key).cloned())
    }

    fn save_smt_leaf(&self, key: &Hash, value: &[u8]) -> Result<(), StorageError> {
        self.smt_leaves.lock().unwrap().insert(*key, value.to_vec());
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// redb-backed storage, for a durable single-node deployment.
// -----------------------------------------------------------------------------

const ACCOUNTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("accounts");
const SLOTS_TABLE: TableDefinition<&[u8], [u8; 32]> = TableDefinition::new("slots");
const CODE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("code");
const SMT_BRANCHES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("smt_branches");
const SMT_LEAVES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("smt_leaves");

pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Redb(e.to_string()))?;
        let write_txn = db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            write_txn
                .open_table(ACCOUNTS_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            write_txn
                .open_table(SLOTS_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            write_txn
                .open_table(CODE_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            write_txn
                .open_table(SMT_BRANCHES_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            write_txn
                .open_table(SMT_LEAVES_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(Self { db })
    }

    fn slot_key(address: &Address, slot: &B256) -> Vec<u8> {
        let mut buf = Vec::with_capacity(52);
        buf.extend_from_slice(address.as_slice());
        buf.extend_from_slice(slot.as_slice());
        buf
    }

    fn branch_key(height: u8, key: &Hash) -> Vec<u8> {
        let mut buf = Vec::with_capacity(33);
        buf.push(height);
        buf.extend_from_slice(&key.0);
        buf
    }
}

impl Storage for RedbStorage {
    fn get_account(&self, address: &Address) -> Result<Option<AccountInfo>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Redb(e.to_string()))?;
        let table = txn
            .open_table(ACCOUNTS_TABLE)
            .map_err(|e| StorageError::Redb(e.to_string()))?;
        match table
            .get(address.as_slice())
            .map_err(|e| StorageError::Redb(e.to_string()))?
        {
            Some(v) => Ok(Some(bincode::deserialize(v.value())?)),
            None => Ok(None),
        }
    }

    fn save_account(&self, address: &Address, info: &AccountInfo) -> Result<(), StorageError> {
        let bytes = bincode::serialize(info)?;
        let write_txn = self.db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ACCOUNTS_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            table
                .insert(address.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(())
    }

    fn get_storage(&self, address: &Address, slot: &B256) -> Result<[u8; 32], StorageError> {
        let key = Self::slot_key(address, slot);
        let txn = self.db.begin_read().map_err(|e| StorageError::Redb(e.to_string()))?;
        let table = txn
            .open_table(SLOTS_TABLE)
            .map_err(|e| StorageError::Redb(e.to_string()))?;
        match table.get(key.as_slice()).map_err(|e| StorageError::Redb(e.to_string()))? {
            Some(v) => Ok(v.value()),
            None => Ok([0u8; 32]),
        }
    }

    fn save_storage(
        &self,
        address: &Address,
        slot: &B256,
        value: [u8; 32],
    ) -> Result<(), StorageError> {
        let key = Self::slot_key(address, slot);
        let write_txn = self.db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(SLOTS_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            table
                .insert(key.as_slice(), value)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(())
    }

    fn get_code(&self, code_hash: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Redb(e.to_string()))?;
        let table = txn
            .open_table(CODE_TABLE)
            .map_err(|e| StorageError::Redb(e.to_string()))?;
        match table.get(code_hash.0.as_slice()).map_err(|e| StorageError::Redb(e.to_string()))? {
            Some(v) => Ok(Some(v.value().to_vec())),
            None => Ok(None),
        }
    }

    fn save_code(&self, code_hash: &Hash, code: &[u8]) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(CODE_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            table
                .insert(code_hash.0.as_slice(), code)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(())
    }

    fn get_smt_branch(&self, height: u8, key: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        let k = Self::branch_key(height, key);
        let txn = self.db.begin_read().map_err(|e| StorageError::Redb(e.to_string()))?;
        let table = txn
            .open_table(SMT_BRANCHES_TABLE)
            .map_err(|e| StorageError::Redb(e.to_string()))?;
        match table.get(k.as_slice()).map_err(|e| StorageError::Redb(e.to_string()))? {
            Some(v) => Ok(Some(v.value().to_vec())),
            None => Ok(None),
        }
    }

    fn save_smt_branch(&self, height: u8, key: &Hash, value: &[u8]) -> Result<(), StorageError> {
        let k = Self::branch_key(height, key);
        let write_txn = self.db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(SMT_BRANCHES_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            table
                .insert(k.as_slice(), value)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(())
    }

    fn get_smt_leaf(&self, key: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Redb(e.to_string()))?;
        let table = txn
            .open_table(SMT_LEAVES_TABLE)
            .map_err(|e| StorageError::Redb(e.to_string()))?;
        match table.get(key.0.as_slice()).map_err(|e| StorageError::Redb(e.to_string()))? {
            Some(v) => Ok(Some(v.value().to_vec())),
            None => Ok(None),
        }
    }

    fn save_smt_leaf(&self, key: &Hash, value: &[u8]) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(|e| StorageError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(SMT_LEAVES_TABLE)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
            table
                .insert(key.0.as_slice(), value)
                .map_err(|e| StorageError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StorageError::Redb(e.to_string()))?;
        Ok(())
    }
}
