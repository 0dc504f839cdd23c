//! SHA-256 helpers and the encrypted object's integrity tag.
//!
//! The tag binds the ciphertext to the data key and object id, so a reader
//! who reconstructs a wrong key (bad share, corrupted blob) finds out before
//! handing garbage to the caller.

use sha2::{Digest, Sha256};

const TAG_DOMAIN: &[u8] = b"inkwell-tag-v1";

/// Compute the SHA-256 hash of a byte slice.
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

/// Compute the SHA-256 hash and return it as a hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_hash(data))
}

/// `SHA-256("inkwell-tag-v1" || key || len(id) || id || ciphertext)`
pub fn integrity_tag(key: &[u8; 32], object_id: &[u8], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(TAG_DOMAIN);
    hasher.update(key);
    hasher.update((object_id.len() as u64).to_be_bytes());
    hasher.update(object_id);
    hasher.update(ciphertext);
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&hasher.finalize());
    tag
}

/// Check a tag without short-circuiting on the first differing byte.
pub fn verify_tag(key: &[u8; 32], object_id: &[u8], ciphertext: &[u8], tag: &[u8; 32]) -> bool {
    let expected = integrity_tag(key, object_id, ciphertext);
    expected
        .iter()
        .zip(tag.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
