use serde::{Deserialize, Serialize};

use crate::constants::{MULTIHASH_BLAKE3, MULTIHASH_BLAKE3_LEN};
use crate::error::IdentityError;

fn decode_key(s: &str) -> Result<[u8; 32], IdentityError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| IdentityError::InvalidId(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidId(format!("{s}: expected 32 bytes")))
}

// Peer identity = Ed25519 public key (32 bytes), base58 on display
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, IdentityError> {
        decode_key(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.to_base58().chars().take(8).collect()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

// Thread identity = the thread keypair's public key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub [u8; 32]);

impl ThreadId {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, IdentityError> {
        decode_key(s).map(Self)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Content address of a stored block: a base58btc-encoded BLAKE3 multihash.
///
/// The empty id stands for "no parent" and only ever appears in the parent
/// list of a genesis block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the content address of a serialized object.
    pub fn for_bytes(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut multihash = Vec::with_capacity(2 + MULTIHASH_BLAKE3_LEN as usize);
        multihash.push(MULTIHASH_BLAKE3);
        multihash.push(MULTIHASH_BLAKE3_LEN);
        multihash.extend_from_slice(digest.as_bytes());
        Self(bs58::encode(multihash).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_genesis(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Split a stored HEAD value (comma-joined block ids) into a parent list.
/// An empty HEAD yields no parents.
pub fn parents_from_head(head: &str) -> Vec<BlockId> {
    head.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(BlockId::from)
        .collect()
}
