//! Hashing primitives shared by the slot kernel, the agent registry, and
//! the vote-pool tally. Vote signatures are opaque byte blobs at this
//! layer (BLS aggregation is a consensus-layer concern out of scope here),
//! so this module has no signing/verification surface.

pub use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte digest. Thin newtype over the raw bytes so call sites read
/// `Hash` instead of `[u8; 32]` or `B256`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<alloy_primitives::B256> for Hash {
    fn from(v: alloy_primitives::B256) -> Self {
        Hash(v.0)
    }
}

impl From<Hash> for alloy_primitives::B256 {
    fn from(v: Hash) -> Self {
        alloy_primitives::B256::from(v.0)
    }
}

/// keccak256 over the bincode encoding of any serializable value. Used
/// where the exact wire layout doesn't matter (in-memory dedup, merkle
/// leaves over teacher-style receipts) as opposed to the slot kernel's
/// hand-specified concatenation, which never goes through bincode.
pub fn hash_data<T: Serialize>(value: &T) -> Hash {
    let bytes = bincode::serialize(value).expect("serialization of in-memory value cannot fail");
    Hash(keccak256(bytes).0)
}

/// sha-256, used only for the agent manifest hash per the external
/// interface contract (`manifest-hash (sha-256 over ...)`).
pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}
