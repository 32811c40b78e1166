/// Checkpoint Loading and Export
///
/// The execution node periodically captures the full leaf set of the
/// state trie in a checkpoint file so the archive can bootstrap
/// without replaying the entire WAL history. File layout:
///
///     "CHKP" + BE_u16(version) + root_hash(32) + BE_u64(leaf count)
///     then per leaf: BE_u32(len) + BE_u32(crc32) + path(32) + payload
///
/// where the payload encoding matches the WAL trie-update entries.
/// Loading rebuilds the trie and verifies the recorded root; a root
/// disagreement means the file does not describe the state it claims
/// and is fatal.
///
/// Export goes the other way: a consistent on-disk snapshot of both
/// store directories for backup, via the engine's checkpoint
/// facility.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use rocksdb::checkpoint::Checkpoint;
use rocksdb::DB;

use crate::error::ArchiveError;
use crate::trie::Trie;
use crate::types::{Payload, TriePath};
use crate::wal;

const MAGIC: &[u8; 4] = b"CHKP";
const VERSION: u16 = 1;

/// Largest accepted leaf frame. Values beyond this are corruption.
const MAX_LEAF_LEN: u32 = 64 * 1024 * 1024;

/// Rebuild the state trie from a checkpoint file. The returned trie's
/// root equals the root recorded in the file, or loading fails with
/// Mismatch.
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Trie, ArchiveError> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| ArchiveError::corrupt("checkpoint too short for magic"))?;
    if &magic != MAGIC {
        return Err(ArchiveError::corrupt("bad checkpoint magic"));
    }

    let version = reader
        .read_u16::<BigEndian>()
        .map_err(|_| ArchiveError::corrupt("checkpoint missing version"))?;
    if version != VERSION {
        return Err(ArchiveError::corrupt(format!(
            "unsupported checkpoint version {}",
            version
        )));
    }

    let mut expected_root = [0u8; 32];
    reader
        .read_exact(&mut expected_root)
        .map_err(|_| ArchiveError::corrupt("checkpoint missing root hash"))?;

    let count = reader
        .read_u64::<BigEndian>()
        .map_err(|_| ArchiveError::corrupt("checkpoint missing leaf count"))?;

    let mut leaves: Vec<(TriePath, Payload)> = Vec::with_capacity(count.min(1 << 20) as usize);
    for i in 0..count {
        let len = reader
            .read_u32::<BigEndian>()
            .map_err(|_| ArchiveError::corrupt(format!("truncated leaf {} length", i)))?;
        if len == 0 || len > MAX_LEAF_LEN {
            return Err(ArchiveError::corrupt(format!(
                "unreasonable leaf {} length {}",
                i, len
            )));
        }
        let expected_crc = reader
            .read_u32::<BigEndian>()
            .map_err(|_| ArchiveError::corrupt(format!("truncated leaf {} checksum", i)))?;

        let mut body = vec![0u8; len as usize];
        reader
            .read_exact(&mut body)
            .map_err(|_| ArchiveError::corrupt(format!("truncated leaf {} body", i)))?;
        if crc32fast::hash(&body) != expected_crc {
            return Err(ArchiveError::corrupt(format!("leaf {} checksum mismatch", i)));
        }

        let mut cursor = body.as_slice();
        let path = TriePath(wal::read_hash(&mut cursor)?);
        let payload = wal::decode_payload(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(ArchiveError::corrupt(format!("trailing bytes in leaf {}", i)));
        }
        leaves.push((path, payload));
    }

    let trie = Trie::empty().apply(&leaves);
    let root = trie.root();
    if root.0 != expected_root {
        return Err(ArchiveError::mismatch(format!(
            "checkpoint root {} does not match rebuilt trie root {}",
            hex::encode(expected_root),
            root
        )));
    }

    Ok(trie)
}

/// Write a checkpoint file for the given leaf set. The recorded root
/// is computed from the leaves, so a file written here always loads.
pub fn write_checkpoint(
    leaves: &[(TriePath, Payload)],
    path: impl AsRef<Path>,
) -> Result<(), ArchiveError> {
    let root = Trie::empty().apply(leaves).root();

    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_u16::<BigEndian>(VERSION)?;
    writer.write_all(root.as_bytes())?;
    writer.write_u64::<BigEndian>(leaves.len() as u64)?;

    for (trie_path, payload) in leaves {
        let mut body = Vec::with_capacity(32 + payload.value.len() + 32);
        body.extend_from_slice(&trie_path.0);
        wal::encode_payload(&mut body, payload);

        let mut frame_head = [0u8; 8];
        BigEndian::write_u32(&mut frame_head[..4], body.len() as u32);
        BigEndian::write_u32(&mut frame_head[4..], crc32fast::hash(&body));
        writer.write_all(&frame_head)?;
        writer.write_all(&body)?;
    }

    writer.flush()?;
    Ok(())
}

/// Snapshot open store databases into `target`, one subdirectory per
/// named store. RocksDB checkpoints are consistent hard-link copies,
/// so the result is a valid backup of both namespaces at one moment.
pub fn export_checkpoint(
    stores: &[(&DB, &str)],
    target: impl AsRef<Path>,
) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(target.as_ref())?;
    for (db, name) in stores {
        let checkpoint = Checkpoint::new(db)?;
        checkpoint.create_checkpoint(target.as_ref().join(name))?;
    }
    Ok(())
}
