/// Atomic Auxiliary-Index Writer
///
/// Provides atomic per-height write transactions for the index
/// namespace. Every record of one height (boundary markers, block and
/// commit lookups, header, event buckets, entity records and
/// per-height listings) accumulates in a HeightBatch and commits as a
/// single synced RocksDB WriteBatch: either all records of the height
/// land, or none do. Readers can therefore never observe a
/// half-indexed height.
///
/// ArchiveWriter composes the register store and the index: register
/// payloads are written (and fsynced) first, then the index batch.
/// The index LAST marker is what makes a height visible, so a crash
/// between the two writes leaves the height unobservable and the
/// mapper rewrites it identically on restart.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use rocksdb::{Options, WriteBatch, WriteOptions, DB};

use crate::codec::Codec;
use crate::error::ArchiveError;
use crate::keys;
use crate::ops::WriterOps;
use crate::types::{
    BlockBatch, Collection, Event, ExecutionResult, Guarantee, Header, Height, Identifier, Seal,
    StateCommitment, Transaction,
};
use crate::registers::RegisterStore;

/// Open (or create) the auxiliary index database.
pub fn open_index(path: impl AsRef<Path>) -> Result<Arc<DB>, ArchiveError> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    let db = DB::open(&opts, path)?;
    Ok(Arc::new(db))
}

/// Read-only open for inspection tools.
pub fn open_index_read_only(path: impl AsRef<Path>) -> Result<Arc<DB>, ArchiveError> {
    let opts = Options::default();
    let db = DB::open_for_read_only(&opts, path, false)?;
    Ok(Arc::new(db))
}

/// One atomic index transaction covering a single height.
pub struct HeightBatch {
    db: Arc<DB>,
    codec: Arc<Codec>,
    height: Height,
    records: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HeightBatch {
    fn new(db: Arc<DB>, codec: Arc<Codec>, height: Height) -> Self {
        Self {
            db,
            codec,
            height,
            records: Vec::new(),
        }
    }

    fn put_raw(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.records.push((key, value));
    }

    fn put_encoded<T: serde::Serialize>(
        &mut self,
        key: Vec<u8>,
        value: &T,
    ) -> Result<(), ArchiveError> {
        let encoded = self.codec.encode(value)?;
        self.records.push((key, encoded));
        Ok(())
    }

    /// Set the first-indexed-height boundary marker.
    pub fn first(&mut self, height: Height) {
        self.put_raw(keys::marker(keys::FIRST), keys::encode_height(height));
    }

    /// Set the last-indexed-height boundary marker.
    pub fn last(&mut self, height: Height) {
        self.put_raw(keys::marker(keys::LAST), keys::encode_height(height));
    }

    /// Block id to height lookup.
    pub fn height(&mut self, block_id: &Identifier) {
        self.put_raw(
            keys::by_id(keys::BLOCK_TO_HEIGHT, block_id),
            keys::encode_height(self.height),
        );
    }

    /// Height to commit, and commit back to height.
    pub fn commitment(&mut self, commit: &StateCommitment) -> Result<(), ArchiveError> {
        self.put_encoded(keys::by_height(keys::HEIGHT_TO_COMMIT, self.height), commit)?;
        self.put_raw(keys::by_commit(commit), keys::encode_height(self.height));
        Ok(())
    }

    pub fn header(&mut self, header: &Header) -> Result<(), ArchiveError> {
        self.put_encoded(keys::by_height(keys::HEADER, self.height), header)
    }

    /// Events bucketed by the 64-bit hash of their type string. One
    /// bucket per type per height; emission order preserved inside a
    /// bucket.
    pub fn events(&mut self, events: &[Event]) -> Result<(), ArchiveError> {
        let mut kinds: Vec<&str> = Vec::new();
        for event in events {
            if !kinds.contains(&event.kind.as_str()) {
                kinds.push(&event.kind);
            }
        }
        for kind in kinds {
            let bucket: Vec<&Event> = events.iter().filter(|e| e.kind == kind).collect();
            self.put_encoded(
                keys::event_bucket(self.height, keys::hash_event_kind(kind)),
                &bucket,
            )?;
        }
        Ok(())
    }

    pub fn collections(&mut self, collections: &[Collection]) -> Result<(), ArchiveError> {
        for collection in collections {
            self.put_encoded(keys::by_id(keys::COLLECTION, &collection.id), collection)?;
        }
        let ids: Vec<Identifier> = collections.iter().map(|c| c.id).collect();
        self.put_encoded(
            keys::by_height(keys::COLLECTIONS_AT_HEIGHT, self.height),
            &ids,
        )
    }

    pub fn guarantees(&mut self, guarantees: &[Guarantee]) -> Result<(), ArchiveError> {
        for guarantee in guarantees {
            self.put_encoded(
                keys::by_id(keys::GUARANTEE, &guarantee.collection_id),
                guarantee,
            )?;
        }
        Ok(())
    }

    pub fn transactions(&mut self, transactions: &[Transaction]) -> Result<(), ArchiveError> {
        for tx in transactions {
            self.put_encoded(keys::by_id(keys::TRANSACTION, &tx.id), tx)?;
            self.put_raw(
                keys::by_id(keys::TRANSACTION_TO_HEIGHT, &tx.id),
                keys::encode_height(self.height),
            );
        }
        let ids: Vec<Identifier> = transactions.iter().map(|t| t.id).collect();
        self.put_encoded(
            keys::by_height(keys::TRANSACTIONS_AT_HEIGHT, self.height),
            &ids,
        )
    }

    pub fn results(&mut self, results: &[ExecutionResult]) -> Result<(), ArchiveError> {
        for result in results {
            self.put_encoded(keys::by_id(keys::RESULT, &result.id), result)?;
        }
        Ok(())
    }

    pub fn seals(&mut self, seals: &[Seal]) -> Result<(), ArchiveError> {
        for seal in seals {
            self.put_encoded(keys::by_id(keys::SEAL, &seal.id), seal)?;
        }
        let ids: Vec<Identifier> = seals.iter().map(|s| s.id).collect();
        self.put_encoded(keys::by_height(keys::SEALS_AT_HEIGHT, self.height), &ids)
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }

    /// Commit all accumulated records in one synced WriteBatch.
    pub async fn commit(self) -> Result<(), ArchiveError> {
        if self.records.is_empty() {
            return Ok(());
        }
        let db = self.db;
        let records = self.records;
        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for (key, value) in records {
                batch.put(key, value);
            }
            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(true);
            db.write_opt(batch, &write_opts).map_err(ArchiveError::from)
        })
        .await
        .map_err(|e| ArchiveError::Io(format!("index write task failed: {}", e)))?
    }
}

/// Combined writer for both persisted namespaces. One instance exists
/// per process; the mapper is its only caller.
pub struct ArchiveWriter {
    registers: Arc<RegisterStore>,
    index: Arc<DB>,
    codec: Arc<Codec>,
    first_written: AtomicBool,
}

impl ArchiveWriter {
    pub fn new(registers: Arc<RegisterStore>, index: Arc<DB>, codec: Arc<Codec>) -> Self {
        Self {
            registers,
            index,
            codec,
            first_written: AtomicBool::new(false),
        }
    }

    /// Start an atomic index transaction for one height.
    pub fn batch(&self, height: Height) -> HeightBatch {
        HeightBatch::new(Arc::clone(&self.index), Arc::clone(&self.codec), height)
    }

    /// Check that this commit was not already indexed at a different
    /// height. One commit maps to exactly one height.
    fn check_commit_unique(
        &self,
        commit: &StateCommitment,
        height: Height,
    ) -> Result<(), ArchiveError> {
        if let Some(bytes) = self.index.get(keys::by_commit(commit))? {
            if let Some(existing) = keys::decode_height(&bytes) {
                if existing != height {
                    return Err(ArchiveError::mismatch(format!(
                        "commit {} already indexed at height {}, refusing height {}",
                        commit, existing, height
                    )));
                }
            }
        }
        Ok(())
    }

    fn first_marker_missing(&self) -> Result<bool, ArchiveError> {
        if self.first_written.load(Ordering::Acquire) {
            return Ok(false);
        }
        let missing = self.index.get(keys::marker(keys::FIRST))?.is_none();
        if !missing {
            self.first_written.store(true, Ordering::Release);
        }
        Ok(missing)
    }
}

impl WriterOps for ArchiveWriter {
    /// Persist one BlockBatch: register payloads first, then every
    /// index record of the height in one atomic transaction.
    async fn index_batch(&self, batch: &BlockBatch) -> Result<(), ArchiveError> {
        self.check_commit_unique(&batch.commit, batch.height)?;

        self.registers
            .batch_put(batch.height, batch.register_entries())
            .await?;

        let mut tx = self.batch(batch.height);
        if self.first_marker_missing()? {
            tx.first(batch.height);
        }
        tx.last(batch.height);
        tx.height(&batch.block_id);
        tx.commitment(&batch.commit)?;
        tx.header(&batch.header)?;
        tx.events(&batch.events)?;
        tx.collections(&batch.collections)?;
        tx.guarantees(&batch.guarantees)?;
        tx.transactions(&batch.transactions)?;
        tx.results(&batch.results)?;
        tx.seals(&batch.seals)?;
        tx.commit().await?;

        self.first_written.store(true, Ordering::Release);
        Ok(())
    }
}
