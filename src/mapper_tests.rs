//! End-to-end mapper scenarios over real stores.
//!
//! These tests drive the full pipeline: a mock chain source and an
//! in-memory feeder on one side, real RocksDB-backed register store
//! and auxiliary index on the other. Commitments are produced by
//! applying the same trie the mapper uses, exactly like the upstream
//! execution node would.

use std::collections::VecDeque;
use std::sync::Arc;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::chain::mock::MockChain;
use crate::codec::Codec;
use crate::error::ArchiveError;
use crate::index_reader::IndexReader;
use crate::index_writer::{open_index, ArchiveWriter};
use crate::mapper::Mapper;
use crate::ops::{ReaderOps, WriterOps};
use crate::registers::RegisterStore;
use crate::trie::Trie;
use crate::types::{
    Collection, Delta, Event, ExecutionResult, Guarantee, Header, Height, Identifier, Payload,
    RegisterId, Seal, StateCommitment, Transaction, TriePath, TrieUpdate,
};
use crate::wal::Feeder;

/// Deterministic trie path for a register, as the upstream pathfinder
/// would derive it.
fn path_for(reg: &RegisterId) -> TriePath {
    let mut hasher = Sha256::new();
    hasher.update(&reg.owner);
    hasher.update([0u8]);
    hasher.update(&reg.key);
    TriePath(hasher.finalize().into())
}

fn reg(owner: &[u8], key: &[u8]) -> RegisterId {
    RegisterId::new(owner.to_vec(), key.to_vec())
}

fn event(index: u32, kind: &str, payload: &[u8]) -> Event {
    Event {
        transaction_id: Identifier([index as u8 + 1; 32]),
        event_index: index,
        kind: kind.to_string(),
        payload: payload.to_vec(),
    }
}

/// Per-height test input. Each inner `writes` vector becomes one WAL
/// trie update.
#[derive(Default, Clone)]
struct BlockData {
    writes: Vec<Vec<(RegisterId, Vec<u8>)>>,
    events: Vec<Event>,
    collections: Vec<Collection>,
    guarantees: Vec<Guarantee>,
    transactions: Vec<Transaction>,
    results: Vec<ExecutionResult>,
    seals: Vec<Seal>,
}

/// Build a sealed chain and its WAL update stream from block data,
/// threading one trie through all heights so every commitment is
/// genuine.
fn build_chain(root: Height, blocks: &[BlockData]) -> (MockChain, Vec<TrieUpdate>) {
    let mut chain = MockChain::new(root);
    let mut updates = Vec::new();
    let mut trie = Trie::empty();

    for (i, block) in blocks.iter().enumerate() {
        let height = root + i as u64;

        for group in &block.writes {
            let delta: Delta = group
                .iter()
                .map(|(register, value)| {
                    (
                        path_for(register),
                        Payload {
                            register: register.clone(),
                            value: value.clone(),
                        },
                    )
                })
                .collect();
            let before = trie.root();
            let next = trie.apply(&delta);
            updates.push(TrieUpdate {
                root_before: before,
                root_after: next.root(),
                paths: delta.iter().map(|(path, _)| *path).collect(),
                payloads: delta.iter().map(|(_, payload)| payload.clone()).collect(),
            });
            trie = next;
        }

        let header = Header {
            chain_id: "archive-test".to_string(),
            block_id: Identifier([i as u8 + 1; 32]),
            parent_id: Identifier([i as u8; 32]),
            height,
            timestamp: 1_700_000_000 + height,
        };
        chain.seal_block(header, trie.root());
        chain.events.insert(height, block.events.clone());
        chain.collections.insert(height, block.collections.clone());
        chain.guarantees.insert(height, block.guarantees.clone());
        chain.transactions.insert(height, block.transactions.clone());
        chain.results.insert(height, block.results.clone());
        chain.seals.insert(height, block.seals.clone());
    }

    (chain, updates)
}

struct VecFeeder {
    updates: VecDeque<TrieUpdate>,
}

impl VecFeeder {
    fn new(updates: &[TrieUpdate]) -> Self {
        Self {
            updates: updates.iter().cloned().collect(),
        }
    }
}

impl Feeder for VecFeeder {
    fn next_update(&mut self) -> Result<Option<TrieUpdate>, ArchiveError> {
        Ok(self.updates.pop_front())
    }
}

/// Real stores in temporary directories plus the shared codec.
struct Stores {
    registers: Arc<RegisterStore>,
    index_db: Arc<rocksdb::DB>,
    codec: Arc<Codec>,
    _payload_dir: TempDir,
    _index_dir: TempDir,
}

impl Stores {
    fn open() -> Self {
        let payload_dir = TempDir::new().unwrap();
        let index_dir = TempDir::new().unwrap();
        Self {
            registers: Arc::new(RegisterStore::open(payload_dir.path()).unwrap()),
            index_db: open_index(index_dir.path()).unwrap(),
            codec: Arc::new(Codec::plain()),
            _payload_dir: payload_dir,
            _index_dir: index_dir,
        }
    }

    fn writer(&self) -> ArchiveWriter {
        ArchiveWriter::new(
            Arc::clone(&self.registers),
            Arc::clone(&self.index_db),
            Arc::clone(&self.codec),
        )
    }

    fn reader(&self) -> IndexReader {
        IndexReader::new(
            Arc::clone(&self.index_db),
            Arc::clone(&self.codec),
            Arc::clone(&self.registers),
        )
    }
}

fn three_block_fixture() -> (MockChain, Vec<TrieUpdate>) {
    let balance = reg(b"alice", b"balance");
    let storage = reg(b"alice", b"storage");
    let global = reg(b"", b"epoch");

    let blocks = vec![
        BlockData {
            writes: vec![vec![
                (balance.clone(), b"100".to_vec()),
                (global.clone(), b"1".to_vec()),
            ]],
            transactions: vec![Transaction {
                id: Identifier([0xaa; 32]),
                script: b"transaction { execute {} }".to_vec(),
                arguments: vec![],
                reference_block_id: Identifier([1; 32]),
                gas_limit: 9999,
                payer: b"alice".to_vec(),
            }],
            collections: vec![Collection {
                id: Identifier([0xcc; 32]),
                transaction_ids: vec![Identifier([0xaa; 32])],
            }],
            guarantees: vec![Guarantee {
                collection_id: Identifier([0xcc; 32]),
                reference_block_id: Identifier([1; 32]),
            }],
            results: vec![ExecutionResult {
                id: Identifier([0x0e; 32]),
                block_id: Identifier([1; 32]),
                previous_result_id: Identifier([0x0d; 32]),
            }],
            ..Default::default()
        },
        BlockData {
            // Two updates in one height; the second overwrites the
            // first write of `storage`.
            writes: vec![
                vec![(storage.clone(), b"draft".to_vec())],
                vec![
                    (storage.clone(), b"final".to_vec()),
                    (balance.clone(), b"90".to_vec()),
                ],
            ],
            events: vec![
                event(0, "A.Deposit", b"e1"),
                event(1, "A.Withdrawal", b"e2"),
                event(2, "A.Deposit", b"e3"),
            ],
            seals: vec![Seal {
                id: Identifier([0x5e; 32]),
                block_id: Identifier([2; 32]),
                result_id: Identifier([0x0e; 32]),
                final_state: StateCommitment([0; 32]),
            }],
            ..Default::default()
        },
        BlockData {
            // Tombstone for balance.
            writes: vec![vec![(balance.clone(), Vec::new())]],
            ..Default::default()
        },
    ];

    build_chain(5, &blocks)
}

#[tokio::test]
async fn test_full_pipeline_indexes_all_heights() {
    let (chain, updates) = three_block_fixture();
    let stores = Stores::open();

    let mapper = Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    );
    mapper.run(CancellationToken::new()).await.unwrap();

    let reader = stores.reader();
    assert_eq!(reader.first().unwrap(), 5);
    assert_eq!(reader.last().unwrap(), 7);

    // Point-in-time register reads across the range.
    let balance = reg(b"alice", b"balance");
    assert_eq!(
        reader.values(5, &[balance.clone()]).unwrap(),
        vec![b"100".to_vec()]
    );
    assert_eq!(
        reader.values(6, &[balance.clone()]).unwrap(),
        vec![b"90".to_vec()]
    );
    // Tombstoned at 7: empty value, not an error.
    assert_eq!(reader.values(7, &[balance]).unwrap(), vec![Vec::new()]);

    // Same-height overwrite: last write wins.
    let storage = reg(b"alice", b"storage");
    assert_eq!(
        reader.values(6, &[storage.clone()]).unwrap(),
        vec![b"final".to_vec()]
    );
    // Not yet written at 5: resolves to empty bytes.
    assert_eq!(reader.values(5, &[storage]).unwrap(), vec![Vec::new()]);

    // Headers, commits and the reverse lookups.
    let header = reader.header(6).unwrap();
    assert_eq!(header.height, 6);
    let commit = reader.commit(6).unwrap();
    assert_eq!(reader.height_for_commit(&commit).unwrap(), 6);
    assert_eq!(reader.height_for_block(&header.block_id).unwrap(), 6);

    // Entities and per-height listings.
    let tx_id = Identifier([0xaa; 32]);
    assert_eq!(reader.height_for_transaction(&tx_id).unwrap(), 5);
    assert_eq!(reader.transaction(&tx_id).unwrap().gas_limit, 9999);
    assert_eq!(reader.transactions_by_height(5).unwrap(), vec![tx_id]);
    assert_eq!(
        reader.collections_by_height(5).unwrap(),
        vec![Identifier([0xcc; 32])]
    );
    assert_eq!(
        reader.seals_by_height(6).unwrap(),
        vec![Identifier([0x5e; 32])]
    );
    assert!(reader.transactions_by_height(6).unwrap().is_empty());
    assert_eq!(
        reader
            .guarantee(&Identifier([0xcc; 32]))
            .unwrap()
            .reference_block_id,
        Identifier([1; 32])
    );
    assert_eq!(
        reader.result(&Identifier([0x0e; 32])).unwrap().block_id,
        Identifier([1; 32])
    );
    assert_eq!(
        reader.seal(&Identifier([0x5e; 32])).unwrap().block_id,
        Identifier([2; 32])
    );
    assert_eq!(
        reader.collection(&Identifier([0xcc; 32])).unwrap().transaction_ids,
        vec![Identifier([0xaa; 32])]
    );
    // Never-indexed entity.
    assert!(matches!(
        reader.transaction(&Identifier([0x00; 32])),
        Err(ArchiveError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_event_buckets_filter_and_order() {
    let (chain, updates) = three_block_fixture();
    let stores = Stores::open();

    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    let reader = stores.reader();

    let deposits = reader.events(6, &["A.Deposit".to_string()]).unwrap();
    assert_eq!(deposits.len(), 2);
    assert_eq!(deposits[0].payload, b"e1");
    assert_eq!(deposits[1].payload, b"e3");
    assert!(deposits.iter().all(|e| e.kind == "A.Deposit"));

    let all = reader.events(6, &[]).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(
        all.iter().map(|e| e.payload.clone()).collect::<Vec<_>>(),
        vec![b"e1".to_vec(), b"e2".to_vec(), b"e3".to_vec()]
    );

    // Filtered result is a subset of the unfiltered one.
    let both = reader
        .events(6, &["A.Deposit".to_string(), "A.Withdrawal".to_string()])
        .unwrap();
    assert_eq!(both.len(), 3);

    // Unknown type: empty, not an error.
    assert!(reader.events(6, &["A.Missing".to_string()]).unwrap().is_empty());
}

#[tokio::test]
async fn test_heights_outside_range_are_unavailable() {
    let (chain, updates) = three_block_fixture();
    let stores = Stores::open();

    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    let reader = stores.reader();
    assert!(matches!(
        reader.header(8),
        Err(ArchiveError::Unavailable(_))
    ));
    assert!(matches!(
        reader.header(4),
        Err(ArchiveError::Unavailable(_))
    ));
    assert!(matches!(
        reader.events(8, &[]),
        Err(ArchiveError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_mismatched_first_record_halts_without_writes() {
    let (chain, mut updates) = three_block_fixture();
    // Corrupt the stream: the first record claims a different
    // starting root.
    updates[0].root_before = StateCommitment([0x99; 32]);

    let stores = Stores::open();
    let result = Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await;

    assert!(matches!(result, Err(ArchiveError::Mismatch(_))));

    // Nothing was indexed.
    let reader = stores.reader();
    assert!(matches!(reader.first(), Err(ArchiveError::NotFound(_))));
    assert!(matches!(reader.last(), Err(ArchiveError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_register_write_leaves_height_unobservable() {
    // Height 6 writes a register whose owner carries the reserved
    // separator byte; the payload write is rejected and the index
    // transaction for that height never starts.
    let poisoned = reg(b"bad/owner", b"key");
    let blocks = vec![
        BlockData {
            writes: vec![vec![(reg(b"alice", b"balance"), b"100".to_vec())]],
            ..Default::default()
        },
        BlockData {
            writes: vec![vec![(poisoned, b"boom".to_vec())]],
            ..Default::default()
        },
    ];
    let (chain, updates) = build_chain(5, &blocks);

    let stores = Stores::open();
    let result = Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await;

    assert!(matches!(result, Err(ArchiveError::InvalidArgument(_))));

    let reader = stores.reader();
    assert_eq!(reader.first().unwrap(), 5);
    assert_eq!(reader.last().unwrap(), 5);
    assert!(matches!(
        reader.header(6),
        Err(ArchiveError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_reindexing_a_height_is_idempotent() {
    let (chain, updates) = three_block_fixture();
    let stores = Stores::open();

    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    let reader = stores.reader();
    let header_before = reader.header(6).unwrap();
    let commit_before = reader.commit(6).unwrap();
    let events_before = reader.events(6, &[]).unwrap();

    // Rebuild the same batch for height 6 and write it again. The
    // fixture emits one update for height 5, two for height 6, one
    // for height 7.
    let (chain, updates) = three_block_fixture();
    let deltas_for_6: Vec<Delta> = updates[1..3].iter().map(|u| u.delta()).collect();
    let batch = crate::types::BlockBatch {
        height: 6,
        block_id: chain.headers[&6].block_id,
        commit: chain.commits[&6],
        header: chain.headers[&6].clone(),
        deltas: deltas_for_6,
        events: chain.events[&6].clone(),
        collections: vec![],
        guarantees: vec![],
        transactions: vec![],
        results: vec![],
        seals: chain.seals[&6].clone(),
    };
    stores.writer().index_batch(&batch).await.unwrap();

    assert_eq!(reader.header(6).unwrap(), header_before);
    assert_eq!(reader.commit(6).unwrap(), commit_before);
    assert_eq!(reader.events(6, &[]).unwrap(), events_before);
    assert_eq!(reader.last().unwrap(), 7);
}

#[tokio::test]
async fn test_commit_reused_at_other_height_is_mismatch() {
    let (chain, updates) = three_block_fixture();
    let stores = Stores::open();

    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    let (chain, _) = three_block_fixture();
    let batch = crate::types::BlockBatch {
        height: 9,
        block_id: Identifier([0x77; 32]),
        commit: chain.commits[&6],
        header: chain.headers[&6].clone(),
        deltas: vec![],
        events: vec![],
        collections: vec![],
        guarantees: vec![],
        transactions: vec![],
        results: vec![],
        seals: vec![],
    };
    let result = stores.writer().index_batch(&batch).await;
    assert!(matches!(result, Err(ArchiveError::Mismatch(_))));
}

#[tokio::test]
async fn test_restart_resumes_after_last_indexed_height() {
    let balance = reg(b"alice", b"balance");
    let blocks: Vec<BlockData> = (0u64..4)
        .map(|i| BlockData {
            writes: vec![vec![(balance.clone(), format!("v{}", i).into_bytes())]],
            ..Default::default()
        })
        .collect();

    // First run: only the first three heights are sealed.
    let (chain, updates) = build_chain(0, &blocks[..3]);
    let stores = Stores::open();
    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        None,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    let reader = stores.reader();
    assert_eq!(reader.last().unwrap(), 2);

    // Restart: the chain has sealed one more height, the WAL is
    // re-read from the start, and the mapper must pass through the
    // already-indexed range without disturbing it.
    let (chain, updates) = build_chain(0, &blocks);
    let resume_from = Some(reader.last().unwrap());
    Mapper::new(
        chain,
        VecFeeder::new(&updates),
        stores.writer(),
        Trie::empty(),
        resume_from,
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(reader.last().unwrap(), 3);
    assert_eq!(
        reader.values(2, &[balance.clone()]).unwrap(),
        vec![b"v2".to_vec()]
    );
    assert_eq!(reader.values(3, &[balance]).unwrap(), vec![b"v3".to_vec()]);
    assert_eq!(reader.first().unwrap(), 0);
}
