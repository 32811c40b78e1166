/// Auxiliary-Index Reader
///
/// Serves the full reader contract over the index namespace and the
/// register store. Height-parameterized lookups are bounds-checked
/// against the FIRST/LAST markers and return Unavailable outside the
/// indexed range; id lookups return NotFound for entities that were
/// never indexed. Reads are snapshot-consistent point reads and never
/// log at error level.

use std::sync::Arc;
use rocksdb::{ReadOptions, DB};

use crate::cache::ReadCache;
use crate::codec::Codec;
use crate::error::ArchiveError;
use crate::keys;
use crate::ops::{PayloadOps, ReaderOps};
use crate::registers::RegisterStore;
use crate::types::{
    Collection, Event, ExecutionResult, Guarantee, Header, Height, Identifier, RegisterId,
    RegisterValue, Seal, StateCommitment, Transaction,
};

pub struct IndexReader {
    db: Arc<DB>,
    codec: Arc<Codec>,
    registers: Arc<RegisterStore>,
    cache: ReadCache,
}

impl IndexReader {
    pub fn new(db: Arc<DB>, codec: Arc<Codec>, registers: Arc<RegisterStore>) -> Self {
        Self::with_cache(db, codec, registers, ReadCache::new())
    }

    pub fn with_cache(
        db: Arc<DB>,
        codec: Arc<Codec>,
        registers: Arc<RegisterStore>,
        cache: ReadCache,
    ) -> Self {
        Self {
            db,
            codec,
            registers,
            cache,
        }
    }

    fn raw_height(&self, key: Vec<u8>, what: &str) -> Result<Height, ArchiveError> {
        match self.db.get(&key)? {
            Some(bytes) => keys::decode_height(&bytes)
                .ok_or_else(|| ArchiveError::corrupt(format!("bad height value for {}", what))),
            None => Err(ArchiveError::not_found(what.to_string())),
        }
    }

    fn decoded<T: serde::de::DeserializeOwned>(
        &self,
        key: Vec<u8>,
        what: &str,
    ) -> Result<T, ArchiveError> {
        match self.db.get(&key)? {
            Some(bytes) => self.codec.decode(&bytes),
            None => Err(ArchiveError::not_found(what.to_string())),
        }
    }

    /// Reject heights outside [first, last].
    fn check_bounds(&self, height: Height) -> Result<(), ArchiveError> {
        let first = self.first()?;
        let last = self.last()?;
        if height < first || height > last {
            return Err(ArchiveError::unavailable(format!(
                "height {} outside indexed range [{}, {}]",
                height, first, last
            )));
        }
        Ok(())
    }

    /// All event buckets at one height, in key order (kind hash).
    fn event_buckets(&self, height: Height) -> Result<Vec<Event>, ArchiveError> {
        let prefix = keys::event_prefix(height);
        let read_opts = ReadOptions::default();
        let mut iter = self.db.raw_iterator_opt(read_opts);
        iter.seek(&prefix);

        let mut events = Vec::new();
        while iter.valid() {
            match (iter.key(), iter.value()) {
                (Some(key), Some(value)) if key.starts_with(&prefix) => {
                    let bucket: Vec<Event> = self.codec.decode(value)?;
                    events.extend(bucket);
                }
                _ => break,
            }
            iter.next();
        }
        Ok(events)
    }

    fn event_bucket_for(&self, height: Height, kind: &str) -> Result<Vec<Event>, ArchiveError> {
        let kind_hash = keys::hash_event_kind(kind);
        if let Some(bucket) = self.cache.get_events(height, kind_hash) {
            return Ok(bucket);
        }
        let bucket: Vec<Event> = match self.db.get(keys::event_bucket(height, kind_hash))? {
            Some(bytes) => self.codec.decode(&bytes)?,
            None => Vec::new(),
        };
        self.cache.put_events(height, kind_hash, bucket.clone());
        Ok(bucket)
    }
}

impl ReaderOps for IndexReader {
    fn first(&self) -> Result<Height, ArchiveError> {
        self.raw_height(keys::marker(keys::FIRST), "first indexed height")
    }

    fn last(&self) -> Result<Height, ArchiveError> {
        self.raw_height(keys::marker(keys::LAST), "last indexed height")
    }

    fn header(&self, height: Height) -> Result<Header, ArchiveError> {
        self.check_bounds(height)?;
        if let Some(header) = self.cache.get_header(height) {
            return Ok(header);
        }
        let header: Header = self.decoded(
            keys::by_height(keys::HEADER, height),
            &format!("header at height {}", height),
        )?;
        self.cache.put_header(height, header.clone());
        Ok(header)
    }

    fn commit(&self, height: Height) -> Result<StateCommitment, ArchiveError> {
        self.check_bounds(height)?;
        self.decoded(
            keys::by_height(keys::HEIGHT_TO_COMMIT, height),
            &format!("commit at height {}", height),
        )
    }

    fn height_for_block(&self, id: &Identifier) -> Result<Height, ArchiveError> {
        self.raw_height(
            keys::by_id(keys::BLOCK_TO_HEIGHT, id),
            &format!("block {}", id),
        )
    }

    fn height_for_commit(&self, commit: &StateCommitment) -> Result<Height, ArchiveError> {
        self.raw_height(keys::by_commit(commit), &format!("commit {}", commit))
    }

    fn height_for_transaction(&self, id: &Identifier) -> Result<Height, ArchiveError> {
        self.raw_height(
            keys::by_id(keys::TRANSACTION_TO_HEIGHT, id),
            &format!("transaction {}", id),
        )
    }

    fn events(&self, height: Height, kinds: &[String]) -> Result<Vec<Event>, ArchiveError> {
        self.check_bounds(height)?;

        let mut events = if kinds.is_empty() {
            self.event_buckets(height)?
        } else {
            let mut events = Vec::new();
            for kind in kinds {
                // The bucket hash can collide; keep only exact type
                // matches.
                let bucket = self.event_bucket_for(height, kind)?;
                events.extend(bucket.into_iter().filter(|e| &e.kind == kind));
            }
            events
        };

        events.sort_by_key(|e| e.event_index);
        Ok(events)
    }

    fn values(
        &self,
        height: Height,
        regs: &[RegisterId],
    ) -> Result<Vec<RegisterValue>, ArchiveError> {
        self.check_bounds(height)?;
        let mut values = Vec::with_capacity(regs.len());
        for reg in regs {
            let value = self.registers.get_register(height, reg)?.unwrap_or_default();
            values.push(value);
        }
        Ok(values)
    }

    fn collection(&self, id: &Identifier) -> Result<Collection, ArchiveError> {
        self.decoded(
            keys::by_id(keys::COLLECTION, id),
            &format!("collection {}", id),
        )
    }

    fn guarantee(&self, id: &Identifier) -> Result<Guarantee, ArchiveError> {
        self.decoded(
            keys::by_id(keys::GUARANTEE, id),
            &format!("guarantee {}", id),
        )
    }

    fn transaction(&self, id: &Identifier) -> Result<Transaction, ArchiveError> {
        self.decoded(
            keys::by_id(keys::TRANSACTION, id),
            &format!("transaction {}", id),
        )
    }

    fn seal(&self, id: &Identifier) -> Result<Seal, ArchiveError> {
        self.decoded(keys::by_id(keys::SEAL, id), &format!("seal {}", id))
    }

    fn result(&self, id: &Identifier) -> Result<ExecutionResult, ArchiveError> {
        self.decoded(keys::by_id(keys::RESULT, id), &format!("result {}", id))
    }

    fn collections_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError> {
        self.check_bounds(height)?;
        self.decoded(
            keys::by_height(keys::COLLECTIONS_AT_HEIGHT, height),
            &format!("collections at height {}", height),
        )
    }

    fn transactions_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError> {
        self.check_bounds(height)?;
        self.decoded(
            keys::by_height(keys::TRANSACTIONS_AT_HEIGHT, height),
            &format!("transactions at height {}", height),
        )
    }

    fn seals_by_height(&self, height: Height) -> Result<Vec<Identifier>, ArchiveError> {
        self.check_bounds(height)?;
        self.decoded(
            keys::by_height(keys::SEALS_AT_HEIGHT, height),
            &format!("seals at height {}", height),
        )
    }
}

impl PayloadOps for RegisterStore {
    fn get_register(
        &self,
        height: Height,
        reg: &RegisterId,
    ) -> Result<Option<RegisterValue>, ArchiveError> {
        self.get(height, reg)
    }
}
