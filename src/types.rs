/// Core Archive Entities
///
/// The data model shared by the mapper, the register store and the
/// auxiliary index: heights, 32-byte identifiers, registers, trie
/// payloads and the per-height BlockBatch that is the atomic unit of
/// indexing. Everything here is plain data; behavior lives in the
/// store and mapper modules.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Block position in the sealed chain. Heights are monotone and the
/// archive indexes a contiguous range [first, last].
pub type Height = u64;

/// 32-byte identifier for blocks, collections, transactions, results
/// and seals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(pub [u8; 32]);

impl Identifier {
    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Identifier(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Root hash of the execution-state trie after a block is applied.
/// Appears at exactly one height once indexing completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateCommitment(pub [u8; 32]);

impl StateCommitment {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Identifier::from_hex(s).map(|id| StateCommitment(id.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StateCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 32-byte derived address of a payload inside the execution-state
/// trie. Paths only exist at the trie/WAL layer; the register store
/// and the index are keyed by registers and identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriePath(pub [u8; 32]);

impl TriePath {
    /// Bit at position `i` (0 = most significant bit of byte 0).
    /// Drives the left/right descent of the trie.
    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        (self.0[i / 8] >> (7 - (i % 8))) & 1 == 1
    }
}

impl fmt::Display for TriePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Smallest addressable unit of execution state.
///
/// The owner may be empty ("global" registers form their own key
/// space). Neither owner nor key may contain the reserved separator
/// byte used by the register store key encoding; writes validate this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterId {
    pub owner: Vec<u8>,
    pub key: Vec<u8>,
}

impl RegisterId {
    pub fn new(owner: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            owner: owner.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", hex::encode(&self.owner), hex::encode(&self.key))
    }
}

/// Opaque register value. Zero length means "deleted" and is a valid
/// stored value, distinct from an absent register.
pub type RegisterValue = Vec<u8>;

/// A full (register, value) pair carried by one trie update entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub register: RegisterId,
    pub value: RegisterValue,
}

/// Ordered list of changes decoded from one trie-update record.
/// The same register may appear more than once; later wins.
pub type Delta = Vec<(TriePath, Payload)>;

/// One decoded trie-update record from the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieUpdate {
    pub root_before: StateCommitment,
    pub root_after: StateCommitment,
    pub paths: Vec<TriePath>,
    pub payloads: Vec<Payload>,
}

impl TrieUpdate {
    /// View the update as an ordered delta of (path, payload) pairs.
    pub fn delta(&self) -> Delta {
        self.paths
            .iter()
            .cloned()
            .zip(self.payloads.iter().cloned())
            .collect()
    }
}

/// Sealed block header as stored by the chain source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    pub block_id: Identifier,
    pub parent_id: Identifier,
    pub height: Height,
    pub timestamp: u64,
}

/// An event emitted during block execution. `kind` is the full type
/// string; the index buckets events by a 64-bit hash of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub transaction_id: Identifier,
    pub event_index: u32,
    pub kind: String,
    pub payload: Vec<u8>,
}

/// A collection groups the transactions of one guaranteed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Identifier,
    pub transaction_ids: Vec<Identifier>,
}

/// Guarantee that a collection was committed to by its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantee {
    pub collection_id: Identifier,
    pub reference_block_id: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Identifier,
    pub script: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
    pub reference_block_id: Identifier,
    pub gas_limit: u64,
    pub payer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: Identifier,
    pub block_id: Identifier,
    pub previous_result_id: Identifier,
}

/// Seal finalizing the execution result of a block, carrying the
/// state commitment the mapper matches trie roots against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub id: Identifier,
    pub block_id: Identifier,
    pub result_id: Identifier,
    pub final_state: StateCommitment,
}

/// The atomic unit of indexing: everything the archive persists for
/// one height. Assembled by the mapper when the trie root matches the
/// sealed commitment, then written through the writer as one
/// per-namespace transaction. Never mutated after commit.
#[derive(Debug, Clone)]
pub struct BlockBatch {
    pub height: Height,
    pub block_id: Identifier,
    pub commit: StateCommitment,
    pub header: Header,
    pub deltas: Vec<Delta>,
    pub events: Vec<Event>,
    pub collections: Vec<Collection>,
    pub guarantees: Vec<Guarantee>,
    pub transactions: Vec<Transaction>,
    pub results: Vec<ExecutionResult>,
    pub seals: Vec<Seal>,
}

impl BlockBatch {
    /// Flatten the deltas into per-register final values for this
    /// height. Later writes win, both across deltas and within one.
    pub fn register_entries(&self) -> Vec<(RegisterId, RegisterValue)> {
        let mut order: Vec<RegisterId> = Vec::new();
        let mut last: std::collections::HashMap<RegisterId, RegisterValue> =
            std::collections::HashMap::new();
        for delta in &self.deltas {
            for (_, payload) in delta {
                if !last.contains_key(&payload.register) {
                    order.push(payload.register.clone());
                }
                last.insert(payload.register.clone(), payload.value.clone());
            }
        }
        order
            .into_iter()
            .map(|reg| {
                let value = last.remove(&reg).unwrap_or_default();
                (reg, value)
            })
            .collect()
    }
}
