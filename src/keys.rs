/// Auxiliary Index Key Helpers
///
/// Centralized builders for the one-byte prefix tags of the index
/// namespace. The tag assignments are stable; changing one requires a
/// migration of existing databases.
///
/// KEY FORMATS:
/// - boundary markers:   tag (1 byte)
/// - height-keyed:       tag + BE_u64(height)  (9 bytes)
/// - id-keyed:           tag + id (33 bytes)
/// - event buckets:      tag + BE_u64(height) + BE_u64(kind hash) (17 bytes)

use sha2::{Digest, Sha256};

use crate::types::{Height, Identifier, StateCommitment};

pub const FIRST: u8 = 1;
pub const LAST: u8 = 2;
pub const BLOCK_TO_HEIGHT: u8 = 3;
pub const HEIGHT_TO_COMMIT: u8 = 4;
pub const COMMIT_TO_HEIGHT: u8 = 5;
pub const HEADER: u8 = 6;
pub const EVENT_BUCKET: u8 = 7;
pub const COLLECTION: u8 = 8;
pub const TRANSACTION: u8 = 9;
pub const TRANSACTION_TO_HEIGHT: u8 = 10;
pub const COLLECTIONS_AT_HEIGHT: u8 = 11;
pub const TRANSACTIONS_AT_HEIGHT: u8 = 12;
pub const RESULT: u8 = 13;
pub const SEAL: u8 = 14;
pub const SEALS_AT_HEIGHT: u8 = 15;
pub const GUARANTEE: u8 = 16;

/// Key for a boundary marker (FIRST or LAST).
pub fn marker(tag: u8) -> Vec<u8> {
    vec![tag]
}

/// Key for a height-keyed record (HEADER, HEIGHT_TO_COMMIT, the
/// *_AT_HEIGHT listings).
pub fn by_height(tag: u8, height: Height) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(tag);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Key for an id-keyed record (BLOCK_TO_HEIGHT, COLLECTION,
/// TRANSACTION, RESULT, SEAL, GUARANTEE, TRANSACTION_TO_HEIGHT).
pub fn by_id(tag: u8, id: &Identifier) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(tag);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Key for the commit-to-height lookup.
pub fn by_commit(commit: &StateCommitment) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(COMMIT_TO_HEIGHT);
    key.extend_from_slice(commit.as_bytes());
    key
}

/// Key for one event bucket: all events of one type at one height.
pub fn event_bucket(height: Height, kind_hash: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(EVENT_BUCKET);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&kind_hash.to_be_bytes());
    key
}

/// Iteration prefix covering every event bucket at one height.
pub fn event_prefix(height: Height) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(EVENT_BUCKET);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// 64-bit bucket hash of an event type string: the first 8 bytes of
/// its SHA-256. Collisions are tolerated; the reader re-filters by
/// the exact type string after decoding a bucket.
pub fn hash_event_kind(kind: &str) -> u64 {
    let digest = Sha256::digest(kind.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest shorter than 8 bytes"))
}

/// Encode a raw height value (boundary markers, *_TO_HEIGHT records).
pub fn encode_height(height: Height) -> Vec<u8> {
    height.to_be_bytes().to_vec()
}

/// Decode a raw height value.
pub fn decode_height(bytes: &[u8]) -> Option<Height> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_height_layout() {
        let key = by_height(HEADER, 0x0102030405060708);
        assert_eq!(key.len(), 9);
        assert_eq!(key[0], HEADER);
        assert_eq!(&key[1..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_by_id_layout() {
        let id = Identifier([0xcd; 32]);
        let key = by_id(TRANSACTION, &id);
        assert_eq!(key.len(), 33);
        assert_eq!(key[0], TRANSACTION);
        assert_eq!(&key[1..], id.as_bytes());
    }

    #[test]
    fn test_event_bucket_under_prefix() {
        let key = event_bucket(55, hash_event_kind("A.Deposit"));
        let prefix = event_prefix(55);
        assert!(key.starts_with(&prefix));
        assert_eq!(key.len(), 17);
    }

    #[test]
    fn test_event_kind_hash_is_stable() {
        let a = hash_event_kind("A.Deposit");
        let b = hash_event_kind("A.Deposit");
        let c = hash_event_kind("A.Withdrawal");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_height_round_trip() {
        let bytes = encode_height(777);
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_height(&bytes), Some(777));
        assert_eq!(decode_height(&bytes[..7]), None);
    }

    #[test]
    fn test_tags_are_distinct() {
        let tags = [
            FIRST,
            LAST,
            BLOCK_TO_HEIGHT,
            HEIGHT_TO_COMMIT,
            COMMIT_TO_HEIGHT,
            HEADER,
            EVENT_BUCKET,
            COLLECTION,
            TRANSACTION,
            TRANSACTION_TO_HEIGHT,
            COLLECTIONS_AT_HEIGHT,
            TRANSACTIONS_AT_HEIGHT,
            RESULT,
            SEAL,
            SEALS_AT_HEIGHT,
            GUARANTEE,
        ];
        let unique: std::collections::HashSet<u8> = tags.iter().copied().collect();
        assert_eq!(unique.len(), tags.len());
    }
}
