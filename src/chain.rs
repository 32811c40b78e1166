/// Chain Source
///
/// Supplies the sealed per-height chain data the mapper correlates
/// with trie updates: header, state commitment, events, collections,
/// guarantees, transactions, results and seals. The disk-backed
/// implementation reads the protocol-state database the execution
/// node maintains next to its WAL; the archive opens it read-only and
/// trusts its contents.
///
/// KEY FORMAT (protocol-state database, written by the node):
/// - root height:  tag 1, raw BE_u64 value
/// - per height:   tag + BE_u64(height), plain CBOR value
///
/// A missing header or commit at a height means the chain has no more
/// sealed blocks there, which surfaces as Finished; missing entity
/// lists are deliberately empty heights and decode to empty vectors.

use std::path::Path;
use rocksdb::{Options, DB};

use crate::error::ArchiveError;
use crate::types::{
    Collection, Event, ExecutionResult, Guarantee, Header, Height, Seal, StateCommitment,
    Transaction,
};

pub const TAG_ROOT_HEIGHT: u8 = 1;
pub const TAG_HEADER: u8 = 2;
pub const TAG_COMMIT: u8 = 3;
pub const TAG_EVENTS: u8 = 4;
pub const TAG_COLLECTIONS: u8 = 5;
pub const TAG_GUARANTEES: u8 = 6;
pub const TAG_TRANSACTIONS: u8 = 7;
pub const TAG_RESULTS: u8 = 8;
pub const TAG_SEALS: u8 = 9;

pub fn chain_key(tag: u8, height: Height) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(tag);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Per-height sealed chain data, as the mapper consumes it.
pub trait Chain: Send + Sync {
    /// The first sealed height this source covers (H_first).
    fn root_height(&self) -> Result<Height, ArchiveError>;

    fn header(&self, height: Height) -> Result<Header, ArchiveError>;
    fn commit(&self, height: Height) -> Result<StateCommitment, ArchiveError>;
    fn events(&self, height: Height) -> Result<Vec<Event>, ArchiveError>;
    fn collections(&self, height: Height) -> Result<Vec<Collection>, ArchiveError>;
    fn guarantees(&self, height: Height) -> Result<Vec<Guarantee>, ArchiveError>;
    fn transactions(&self, height: Height) -> Result<Vec<Transaction>, ArchiveError>;
    fn results(&self, height: Height) -> Result<Vec<ExecutionResult>, ArchiveError>;
    fn seals(&self, height: Height) -> Result<Vec<Seal>, ArchiveError>;
}

/// Chain source over the node's protocol-state database.
pub struct DiskChain {
    db: DB,
}

impl DiskChain {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path, false)?;
        Ok(Self { db })
    }

    /// A record every sealed height must carry. Absence means the
    /// chain is exhausted at this height.
    fn required<T: serde::de::DeserializeOwned>(
        &self,
        tag: u8,
        height: Height,
    ) -> Result<T, ArchiveError> {
        match self.db.get(chain_key(tag, height))? {
            Some(bytes) => Ok(serde_cbor::from_slice(&bytes)?),
            None => Err(ArchiveError::Finished),
        }
    }

    /// A record that may be deliberately empty at a sealed height.
    fn optional_list<T: serde::de::DeserializeOwned>(
        &self,
        tag: u8,
        height: Height,
    ) -> Result<Vec<T>, ArchiveError> {
        match self.db.get(chain_key(tag, height))? {
            Some(bytes) => Ok(serde_cbor::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

impl Chain for DiskChain {
    fn root_height(&self) -> Result<Height, ArchiveError> {
        match self.db.get([TAG_ROOT_HEIGHT])? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| ArchiveError::corrupt("bad root height value"))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Err(ArchiveError::corrupt("protocol state missing root height")),
        }
    }

    fn header(&self, height: Height) -> Result<Header, ArchiveError> {
        self.required(TAG_HEADER, height)
    }

    fn commit(&self, height: Height) -> Result<StateCommitment, ArchiveError> {
        self.required(TAG_COMMIT, height)
    }

    fn events(&self, height: Height) -> Result<Vec<Event>, ArchiveError> {
        self.optional_list(TAG_EVENTS, height)
    }

    fn collections(&self, height: Height) -> Result<Vec<Collection>, ArchiveError> {
        self.optional_list(TAG_COLLECTIONS, height)
    }

    fn guarantees(&self, height: Height) -> Result<Vec<Guarantee>, ArchiveError> {
        self.optional_list(TAG_GUARANTEES, height)
    }

    fn transactions(&self, height: Height) -> Result<Vec<Transaction>, ArchiveError> {
        self.optional_list(TAG_TRANSACTIONS, height)
    }

    fn results(&self, height: Height) -> Result<Vec<ExecutionResult>, ArchiveError> {
        self.optional_list(TAG_RESULTS, height)
    }

    fn seals(&self, height: Height) -> Result<Vec<Seal>, ArchiveError> {
        self.optional_list(TAG_SEALS, height)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identifier;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir) {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, dir.path()).unwrap();

        db.put([TAG_ROOT_HEIGHT], 5u64.to_be_bytes()).unwrap();

        let header = Header {
            chain_id: "archive-test".to_string(),
            block_id: Identifier([5; 32]),
            parent_id: Identifier([4; 32]),
            height: 5,
            timestamp: 1_700_000_000,
        };
        db.put(
            chain_key(TAG_HEADER, 5),
            serde_cbor::to_vec(&header).unwrap(),
        )
        .unwrap();
        db.put(
            chain_key(TAG_COMMIT, 5),
            serde_cbor::to_vec(&StateCommitment([9; 32])).unwrap(),
        )
        .unwrap();

        let events = vec![Event {
            transaction_id: Identifier([1; 32]),
            event_index: 0,
            kind: "A.Deposit".to_string(),
            payload: b"amount".to_vec(),
        }];
        db.put(
            chain_key(TAG_EVENTS, 5),
            serde_cbor::to_vec(&events).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_disk_chain_reads_sealed_height() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);

        let chain = DiskChain::open(dir.path()).unwrap();
        assert_eq!(chain.root_height().unwrap(), 5);

        let header = chain.header(5).unwrap();
        assert_eq!(header.height, 5);
        assert_eq!(chain.commit(5).unwrap(), StateCommitment([9; 32]));

        let events = chain.events(5).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "A.Deposit");
    }

    #[test]
    fn test_unsealed_height_is_finished() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);

        let chain = DiskChain::open(dir.path()).unwrap();
        assert!(matches!(chain.header(6), Err(ArchiveError::Finished)));
        assert!(matches!(chain.commit(6), Err(ArchiveError::Finished)));
    }

    #[test]
    fn test_missing_lists_are_deliberately_empty() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);

        let chain = DiskChain::open(dir.path()).unwrap();
        assert!(chain.collections(5).unwrap().is_empty());
        assert!(chain.seals(5).unwrap().is_empty());
    }
}
