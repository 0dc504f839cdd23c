//! AES-256-CTR data encryption for published content.
//!
//! Each encrypted object carries its own random 32-byte data key. The key
//! never travels in the clear: it is Shamir-split and wrapped for the key
//! servers (see [`crate::object::seal`]). The IV is bound to the object id so
//! a data key can never produce the same keystream for two objects.

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::RngCore;
use sha2::{Digest, Sha256};

const IV_DOMAIN: &[u8] = b"inkwell-iv-v1";

/// Generate a new random 32-byte data key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Derive the 16-byte IV for an object.
///
/// ```text
/// IV = SHA-256("inkwell-iv-v1" || key || object_id)[0..16]
/// ```
pub fn derive_iv(key: &[u8; 32], object_id: &[u8]) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(IV_DOMAIN);
    hasher.update(key);
    hasher.update(object_id);
    let hash = hasher.finalize();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&hash[..16]);
    iv
}

/// Encrypt plaintext bytes using AES-256-CTR.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], object_id: &[u8]) -> Vec<u8> {
    let iv = derive_iv(key, object_id);
    let mut buffer = plaintext.to_vec();
    let mut cipher = Ctr128BE::<Aes256>::new(key.into(), &iv.into());
    cipher.apply_keystream(&mut buffer);
    buffer
}

/// Decrypt ciphertext bytes using AES-256-CTR.
///
/// CTR is symmetric; this exists so call sites read in the right direction.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], object_id: &[u8]) -> Vec<u8> {
    encrypt(ciphertext, key, object_id)
}
