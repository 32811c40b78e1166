/// Trie-Update Feeder - Segmented Write-Ahead Log
///
/// The execution node appends trie updates to numbered segment files
/// in a WAL directory. Each record is framed as
///
///     BE_u32(length) + BE_u32(crc32 of body) + body
///     body := tag(1 byte) + payload
///
/// with tag 1 = delete, 2 = trie update, 3 = checkpoint marker. Only
/// trie updates are surfaced; other tags are skipped silently. The
/// feeder is a finite, forward-only, non-restartable sequence: a CRC
/// mismatch, truncated frame or unknown tag terminates it with a
/// fatal error, and exhausting the last segment ends it cleanly.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::error::ArchiveError;
use crate::types::{Payload, RegisterId, StateCommitment, TriePath, TrieUpdate};

pub const TAG_DELETE: u8 = 1;
pub const TAG_UPDATE: u8 = 2;
pub const TAG_CHECKPOINT: u8 = 3;

/// Upper bound on a single framed record. Anything larger is treated
/// as corruption rather than an allocation request.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

/// Forward-only source of decoded trie updates.
pub trait Feeder: Send {
    /// The next trie update, or None when the log is exhausted.
    fn next_update(&mut self) -> Result<Option<TrieUpdate>, ArchiveError>;
}

/// Feeder over a directory of numbered WAL segments.
pub struct SegmentFeeder {
    segments: Vec<PathBuf>,
    next_segment: usize,
    current: Option<BufReader<File>>,
}

impl SegmentFeeder {
    /// Open a WAL directory. Segment files have purely numeric names
    /// and are consumed in ascending order; other directory entries
    /// are ignored.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let mut segments: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                segments.push(entry.path());
            }
        }
        segments.sort();

        Ok(Self {
            segments,
            next_segment: 0,
            current: None,
        })
    }

    /// Read the next framed body from the current segment, rolling
    /// into the next segment at EOF. None when all segments are done.
    fn next_body(&mut self) -> Result<Option<Vec<u8>>, ArchiveError> {
        loop {
            if self.current.is_none() {
                if self.next_segment >= self.segments.len() {
                    return Ok(None);
                }
                let file = File::open(&self.segments[self.next_segment])?;
                self.next_segment += 1;
                self.current = Some(BufReader::new(file));
            }
            let reader = self.current.as_mut().expect("segment reader just opened");

            let mut len_buf = [0u8; 4];
            match read_full(reader, &mut len_buf)? {
                0 => {
                    // Clean end of segment.
                    self.current = None;
                    continue;
                }
                4 => {}
                _ => return Err(ArchiveError::corrupt("truncated record length")),
            }

            let len = BigEndian::read_u32(&len_buf);
            if len == 0 || len > MAX_RECORD_LEN {
                return Err(ArchiveError::corrupt(format!(
                    "unreasonable record length {}",
                    len
                )));
            }

            let expected_crc = reader
                .read_u32::<BigEndian>()
                .map_err(|_| ArchiveError::corrupt("truncated record checksum"))?;

            let mut body = vec![0u8; len as usize];
            reader
                .read_exact(&mut body)
                .map_err(|_| ArchiveError::corrupt("truncated record body"))?;

            let actual_crc = crc32fast::hash(&body);
            if actual_crc != expected_crc {
                return Err(ArchiveError::corrupt(format!(
                    "record checksum mismatch: expected {:08x}, got {:08x}",
                    expected_crc, actual_crc
                )));
            }

            return Ok(Some(body));
        }
    }
}

impl Feeder for SegmentFeeder {
    fn next_update(&mut self) -> Result<Option<TrieUpdate>, ArchiveError> {
        loop {
            let body = match self.next_body()? {
                Some(body) => body,
                None => return Ok(None),
            };
            match body.first().copied() {
                Some(TAG_UPDATE) => return decode_update(&body[1..]).map(Some),
                Some(TAG_DELETE) | Some(TAG_CHECKPOINT) => continue,
                Some(tag) => {
                    return Err(ArchiveError::corrupt(format!("unknown record tag {}", tag)))
                }
                None => return Err(ArchiveError::corrupt("empty record body")),
            }
        }
    }
}

/// Fill `buf` from the reader, tolerating a clean EOF before the
/// first byte. Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, ArchiveError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Decode a trie-update payload (everything after the tag byte).
pub fn decode_update(data: &[u8]) -> Result<TrieUpdate, ArchiveError> {
    let mut cursor = data;

    let root_before = StateCommitment(read_hash(&mut cursor)?);
    let root_after = StateCommitment(read_hash(&mut cursor)?);
    let count = read_u32(&mut cursor)? as usize;

    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        paths.push(TriePath(read_hash(&mut cursor)?));
    }

    let mut payloads = Vec::with_capacity(count);
    for _ in 0..count {
        payloads.push(decode_payload(&mut cursor)?);
    }

    if !cursor.is_empty() {
        return Err(ArchiveError::corrupt("trailing bytes in trie update"));
    }

    Ok(TrieUpdate {
        root_before,
        root_after,
        paths,
        payloads,
    })
}

/// Decode one length-prefixed (owner, key, value) payload entry.
/// Shared with the checkpoint loader, which frames the same encoding.
pub(crate) fn decode_payload(cursor: &mut &[u8]) -> Result<Payload, ArchiveError> {
    let owner = read_bytes(cursor)?;
    let key = read_bytes(cursor)?;
    let value = read_bytes(cursor)?;
    Ok(Payload {
        register: RegisterId { owner, key },
        value,
    })
}

/// Encode one payload entry, the inverse of `decode_payload`.
pub(crate) fn encode_payload(out: &mut Vec<u8>, payload: &Payload) {
    write_bytes(out, &payload.register.owner);
    write_bytes(out, &payload.register.key);
    write_bytes(out, &payload.value);
}

pub(crate) fn read_hash(cursor: &mut &[u8]) -> Result<[u8; 32], ArchiveError> {
    if cursor.len() < 32 {
        return Err(ArchiveError::corrupt("truncated 32-byte hash"));
    }
    let (head, tail) = cursor.split_at(32);
    *cursor = tail;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(head);
    Ok(arr)
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, ArchiveError> {
    if cursor.len() < 4 {
        return Err(ArchiveError::corrupt("truncated length field"));
    }
    let (head, tail) = cursor.split_at(4);
    *cursor = tail;
    Ok(BigEndian::read_u32(head))
}

fn read_bytes(cursor: &mut &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let len = read_u32(cursor)? as usize;
    if cursor.len() < len {
        return Err(ArchiveError::corrupt("truncated byte field"));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head.to_vec())
}

/// Encode a trie-update body (tag byte included). The inverse of the
/// feeder's decoder; used by the checkpoint writer, fixtures and
/// tests.
pub fn encode_update(update: &TrieUpdate) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(TAG_UPDATE);
    body.extend_from_slice(update.root_before.as_bytes());
    body.extend_from_slice(update.root_after.as_bytes());
    body.extend_from_slice(&(update.paths.len() as u32).to_be_bytes());
    for path in &update.paths {
        body.extend_from_slice(&path.0);
    }
    for payload in &update.payloads {
        encode_payload(&mut body, payload);
    }
    body
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Frame a record body for appending to a segment.
pub fn frame_record(body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(body.len() + 8);
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&crc32fast::hash(body).to_be_bytes());
    framed.extend_from_slice(body);
    framed
}

/// Append framed records to a segment file, creating it if missing.
pub fn append_records(path: impl AsRef<Path>, bodies: &[Vec<u8>]) -> Result<(), ArchiveError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for body in bodies {
        file.write_all(&frame_record(body))?;
    }
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_update(seed: u8) -> TrieUpdate {
        let register = RegisterId::new(vec![seed], b"balance".to_vec());
        TrieUpdate {
            root_before: StateCommitment([seed; 32]),
            root_after: StateCommitment([seed + 1; 32]),
            paths: vec![TriePath([seed; 32])],
            payloads: vec![Payload {
                register,
                value: vec![seed; 3],
            }],
        }
    }

    #[test]
    fn test_update_encode_decode_round_trip() {
        let update = sample_update(7);
        let body = encode_update(&update);
        assert_eq!(body[0], TAG_UPDATE);
        let decoded = decode_update(&body[1..]).unwrap();
        assert_eq!(update, decoded);
    }

    #[test]
    fn test_reads_across_segments_in_order() {
        let dir = TempDir::new().unwrap();
        append_records(
            dir.path().join("00000000"),
            &[encode_update(&sample_update(1)), encode_update(&sample_update(3))],
        )
        .unwrap();
        append_records(
            dir.path().join("00000001"),
            &[encode_update(&sample_update(5))],
        )
        .unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert_eq!(feeder.next_update().unwrap().unwrap(), sample_update(1));
        assert_eq!(feeder.next_update().unwrap().unwrap(), sample_update(3));
        assert_eq!(feeder.next_update().unwrap().unwrap(), sample_update(5));
        assert!(feeder.next_update().unwrap().is_none());
        // Exhausted stays exhausted.
        assert!(feeder.next_update().unwrap().is_none());
    }

    #[test]
    fn test_skips_deletes_and_checkpoint_markers() {
        let dir = TempDir::new().unwrap();
        append_records(
            dir.path().join("00000000"),
            &[
                vec![TAG_DELETE, 0xde, 0xad],
                encode_update(&sample_update(2)),
                vec![TAG_CHECKPOINT],
            ],
        )
        .unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert_eq!(feeder.next_update().unwrap().unwrap(), sample_update(2));
        assert!(feeder.next_update().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_is_immediately_finished() {
        let dir = TempDir::new().unwrap();
        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert!(feeder.next_update().unwrap().is_none());
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut framed = frame_record(&encode_update(&sample_update(4)));
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        fs::write(dir.path().join("00000000"), &framed).unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert!(matches!(
            feeder.next_update(),
            Err(ArchiveError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_truncated_frame_is_fatal() {
        let dir = TempDir::new().unwrap();
        let framed = frame_record(&encode_update(&sample_update(4)));
        fs::write(dir.path().join("00000000"), &framed[..framed.len() - 5]).unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert!(matches!(
            feeder.next_update(),
            Err(ArchiveError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let dir = TempDir::new().unwrap();
        append_records(dir.path().join("00000000"), &[vec![99, 1, 2, 3]]).unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert!(matches!(
            feeder.next_update(),
            Err(ArchiveError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_non_numeric_entries_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("LOCK"), b"not a segment").unwrap();
        append_records(
            dir.path().join("00000000"),
            &[encode_update(&sample_update(9))],
        )
        .unwrap();

        let mut feeder = SegmentFeeder::open(dir.path()).unwrap();
        assert_eq!(feeder.next_update().unwrap().unwrap(), sample_update(9));
        assert!(feeder.next_update().unwrap().is_none());
    }
}
