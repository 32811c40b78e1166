/// In-Memory Execution-State Trie
///
/// A copy-on-write sparse Merkle trie over 32-byte paths. The mapper
/// owns exactly one trie at a time; `apply` returns a new trie that
/// shares every unchanged subtree with its predecessor, so holding a
/// few generations is cheap.
///
/// Hashing scheme: a leaf slot hashes as SHA-256(path || value), an
/// interim node as SHA-256(left || right), and empty subtrees use a
/// precomputed ladder anchored at 32 zero bytes. A subtree holding a
/// single payload is represented by one compact leaf node whose hash
/// folds the empty-sibling ladder along the path bits.

use std::sync::Arc;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::types::{Payload, StateCommitment, TriePath};

/// Tree depth in bits; one level per path bit.
const DEPTH: usize = 256;

/// EMPTY_HASHES[h] is the hash of an empty subtree of height h.
/// Index DEPTH is the root hash of an entirely empty trie.
static EMPTY_HASHES: Lazy<Vec<[u8; 32]>> = Lazy::new(|| {
    let mut hashes = Vec::with_capacity(DEPTH + 1);
    hashes.push([0u8; 32]);
    for h in 1..=DEPTH {
        let below = hashes[h - 1];
        hashes.push(combine(&below, &below));
    }
    hashes
});

fn combine(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn slot_hash(path: &TriePath, value: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(path.0);
    hasher.update(value);
    hasher.finalize().into()
}

/// Fold a leaf slot hash up to `depth`, taking empty siblings along
/// the path bits.
fn fold_to_depth(path: &TriePath, slot: [u8; 32], depth: usize) -> [u8; 32] {
    let mut current = slot;
    for i in (depth..DEPTH).rev() {
        let sibling = &EMPTY_HASHES[DEPTH - 1 - i];
        current = if path.bit(i) {
            combine(sibling, &current)
        } else {
            combine(&current, sibling)
        };
    }
    current
}

enum Node {
    Leaf {
        path: TriePath,
        slot: [u8; 32],
        hash: [u8; 32],
    },
    Branch {
        left: Option<Arc<Node>>,
        right: Option<Arc<Node>>,
        hash: [u8; 32],
    },
}

impl Node {
    fn hash(&self) -> [u8; 32] {
        match self {
            Node::Leaf { hash, .. } => *hash,
            Node::Branch { hash, .. } => *hash,
        }
    }

    fn leaf(depth: usize, path: TriePath, slot: [u8; 32]) -> Arc<Node> {
        let hash = fold_to_depth(&path, slot, depth);
        Arc::new(Node::Leaf { path, slot, hash })
    }

    fn branch(depth: usize, left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
        let child_height = DEPTH - 1 - depth;
        let left_hash = left
            .as_ref()
            .map(|n| n.hash())
            .unwrap_or(EMPTY_HASHES[child_height]);
        let right_hash = right
            .as_ref()
            .map(|n| n.hash())
            .unwrap_or(EMPTY_HASHES[child_height]);
        Arc::new(Node::Branch {
            left,
            right,
            hash: combine(&left_hash, &right_hash),
        })
    }
}

/// The trie itself. Cloning is cheap (one Arc); `apply` is the only
/// way to produce a modified generation.
#[derive(Clone)]
pub struct Trie {
    root: Option<Arc<Node>>,
}

impl Trie {
    pub fn empty() -> Self {
        Self { root: None }
    }

    /// Current root commitment.
    pub fn root(&self) -> StateCommitment {
        let hash = self
            .root
            .as_ref()
            .map(|n| n.hash())
            .unwrap_or(EMPTY_HASHES[DEPTH]);
        StateCommitment(hash)
    }

    /// Apply an ordered list of changes, producing the next trie
    /// generation. Later writes to the same path win. The receiver is
    /// untouched; unchanged subtrees are shared.
    pub fn apply(&self, changes: &[(TriePath, Payload)]) -> Trie {
        let mut root = self.root.clone();
        for (path, payload) in changes {
            let slot = slot_hash(path, &payload.value);
            root = Some(insert(root.as_ref(), 0, *path, slot));
        }
        Trie { root }
    }
}

fn insert(node: Option<&Arc<Node>>, depth: usize, path: TriePath, slot: [u8; 32]) -> Arc<Node> {
    match node.map(|n| n.as_ref()) {
        None => Node::leaf(depth, path, slot),
        Some(Node::Leaf {
            path: existing_path,
            slot: existing_slot,
            ..
        }) => {
            if existing_path.0 == path.0 {
                return Node::leaf(depth, path, slot);
            }
            split_leaves(depth, *existing_path, *existing_slot, path, slot)
        }
        Some(Node::Branch { left, right, .. }) => {
            if path.bit(depth) {
                let new_right = insert(right.as_ref(), depth + 1, path, slot);
                Node::branch(depth, left.clone(), Some(new_right))
            } else {
                let new_left = insert(left.as_ref(), depth + 1, path, slot);
                Node::branch(depth, Some(new_left), right.clone())
            }
        }
    }
}

/// Two distinct paths landing in the same subtree: branch at the
/// first diverging bit and hang a spine of single-child branches
/// above it.
fn split_leaves(
    depth: usize,
    old_path: TriePath,
    old_slot: [u8; 32],
    new_path: TriePath,
    new_slot: [u8; 32],
) -> Arc<Node> {
    let mut diverge = depth;
    while diverge < DEPTH && old_path.bit(diverge) == new_path.bit(diverge) {
        diverge += 1;
    }
    debug_assert!(diverge < DEPTH, "distinct paths must diverge");

    let old_leaf = Node::leaf(diverge + 1, old_path, old_slot);
    let new_leaf = Node::leaf(diverge + 1, new_path, new_slot);
    let mut node = if new_path.bit(diverge) {
        Node::branch(diverge, Some(old_leaf), Some(new_leaf))
    } else {
        Node::branch(diverge, Some(new_leaf), Some(old_leaf))
    };

    // Shared-prefix spine between `depth` and the diverging bit.
    for d in (depth..diverge).rev() {
        node = if new_path.bit(d) {
            Node::branch(d, None, Some(node))
        } else {
            Node::branch(d, Some(node), None)
        };
    }
    node
}
