/// Versioned Register Store (MVCC)
///
/// An ordered RocksDB instance (`payload.db/`) holding every register
/// write ever indexed. A persisted key encodes the register and the
/// height of the write:
///
///     owner  SEP  key  SEP  BE_u64(height XOR u64::MAX)
///
/// The complemented big-endian height makes the most recent write for
/// a register sort FIRST inside its group, so "value of register R at
/// height <= H" is a single seek: encode the lookup key with H and
/// take the first key that still shares the register prefix.
///
/// The database is opened with a prefix extractor that splits keys at
/// len-8 (the MVCC suffix), so bloom filters and prefix iteration
/// group all versions of one register together.

use std::path::Path;
use std::sync::Arc;
use rocksdb::{
    BlockBasedOptions, Options, ReadOptions, SliceTransform, WriteBatch, WriteOptions, DB,
};

use crate::error::ArchiveError;
use crate::types::{Height, RegisterId, RegisterValue};

/// Reserved separator byte. Owner and key bytes must not contain it;
/// `batch_put` rejects entries that do.
pub const SEP: u8 = b'/';

/// Length of the trailing MVCC suffix: one complemented big-endian
/// height.
pub const MVCC_SUFFIX_LEN: usize = 8;

/// Encode a register lookup/storage key. The encoded form is exactly
/// MVCC_SUFFIX_LEN bytes longer than its split boundary.
pub fn encode_key(owner: &[u8], key: &[u8], height: Height) -> Vec<u8> {
    let mut out = Vec::with_capacity(owner.len() + key.len() + 2 + MVCC_SUFFIX_LEN);
    out.extend_from_slice(owner);
    out.push(SEP);
    out.extend_from_slice(key);
    out.push(SEP);
    out.extend_from_slice(&(height ^ u64::MAX).to_be_bytes());
    out
}

/// Decode a stored key back into (owner, key, height).
pub fn decode_key(encoded: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Height), ArchiveError> {
    if encoded.len() < MVCC_SUFFIX_LEN + 2 {
        return Err(ArchiveError::corrupt("register key too short"));
    }
    let split = encoded.len() - MVCC_SUFFIX_LEN;
    let (prefix, suffix) = encoded.split_at(split);
    if prefix.last() != Some(&SEP) {
        return Err(ArchiveError::corrupt("register key missing separator"));
    }
    let prefix = &prefix[..prefix.len() - 1];
    let sep_at = prefix
        .iter()
        .position(|&b| b == SEP)
        .ok_or_else(|| ArchiveError::corrupt("register key missing owner separator"))?;
    let owner = prefix[..sep_at].to_vec();
    let key = prefix[sep_at + 1..].to_vec();
    let height = u64::from_be_bytes(
        suffix
            .try_into()
            .map_err(|_| ArchiveError::corrupt("register key bad height suffix"))?,
    ) ^ u64::MAX;
    Ok((owner, key, height))
}

fn mvcc_prefix(key: &[u8]) -> &[u8] {
    &key[..key.len().saturating_sub(MVCC_SUFFIX_LEN)]
}

fn mvcc_in_domain(key: &[u8]) -> bool {
    key.len() > MVCC_SUFFIX_LEN
}

fn validate_register(reg: &RegisterId) -> Result<(), ArchiveError> {
    if reg.owner.contains(&SEP) || reg.key.contains(&SEP) {
        return Err(ArchiveError::invalid(format!(
            "register {} contains reserved separator byte",
            reg
        )));
    }
    Ok(())
}

pub struct RegisterStore {
    db: Arc<DB>,
}

impl RegisterStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let opts = Self::options(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Read-only open for inspection tools.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let opts = Self::options(false);
        let db = DB::open_for_read_only(&opts, path, false)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn options(create: bool) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(create);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Split at len-8: the register prefix drives bloom filters
        // and groups all versions of one register.
        opts.set_prefix_extractor(SliceTransform::create(
            "mvcc_split",
            mvcc_prefix,
            Some(mvcc_in_domain),
        ));
        opts.set_memtable_prefix_bloom_ratio(0.2);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        opts
    }

    /// Point-in-time read: the value written to `reg` at the greatest
    /// height <= `height`, or None when the register was never
    /// written in the indexed range. A zero-length value is a live
    /// tombstone, not None.
    pub fn get(
        &self,
        height: Height,
        reg: &RegisterId,
    ) -> Result<Option<RegisterValue>, ArchiveError> {
        let lookup = encode_key(&reg.owner, &reg.key, height);
        let prefix_len = lookup.len() - MVCC_SUFFIX_LEN;

        let mut read_opts = ReadOptions::default();
        read_opts.set_prefix_same_as_start(true);

        let mut iter = self.db.raw_iterator_opt(read_opts);
        iter.seek(&lookup);

        if !iter.valid() {
            return Ok(None);
        }
        match iter.key() {
            Some(found) if found.starts_with(&lookup[..prefix_len]) => {
                Ok(iter.value().map(|v| v.to_vec()))
            }
            _ => Ok(None),
        }
    }

    /// Atomically persist all register writes of one height. The
    /// batch is fsynced before this returns; partial writes are never
    /// visible. A batch must not carry two entries for the same
    /// register.
    pub async fn batch_put(
        &self,
        height: Height,
        entries: Vec<(RegisterId, RegisterValue)>,
    ) -> Result<(), ArchiveError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut seen = std::collections::HashSet::with_capacity(entries.len());
        for (reg, _) in &entries {
            validate_register(reg)?;
            if !seen.insert(reg.clone()) {
                return Err(ArchiveError::invalid(format!(
                    "duplicate register {} in batch at height {}",
                    reg, height
                )));
            }
        }

        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for (reg, value) in entries {
                batch.put(encode_key(&reg.owner, &reg.key, height), value);
            }
            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(true);
            db.write_opt(batch, &write_opts)
                .map_err(ArchiveError::from)
        })
        .await
        .map_err(|e| ArchiveError::Io(format!("register write task failed: {}", e)))?
    }

    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }
}
