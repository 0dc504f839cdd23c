//! Encrypted object format.
//!
//! This is the byte string stored on the blob network. Its header embeds the
//! cryptographic object id the key servers evaluate the policy against, which
//! is unrelated to the blob network's own content-addressed fetch key.
//!
//! Layout (postcard):
//!
//! ```text
//! version | package_id | id | threshold | services[] | U (96 B) | ciphertext | tag (32 B)
//! services[i] = server_id | index | wrapped_share (32 B)
//! ```

use std::collections::HashMap;
use std::fmt;

use bls12_381::{G1Affine, G2Projective};
use group::Curve;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, ObjectError};
use crate::{encrypt, ibe, shares, verify};

/// Current format version.
pub const OBJECT_VERSION: u8 = 1;

/// Length of the random nonce appended to a collection id by [`ObjectId::for_collection`].
pub const ID_NONCE_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Object id
// ---------------------------------------------------------------------------

/// Cryptographic object id embedded in an encrypted object.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Vec<u8>);

impl ObjectId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// `collection_id_bytes || random nonce`, so policy checks can verify the
    /// object belongs to the collection by prefix.
    pub fn for_collection(collection_id: &str) -> Result<Self, ObjectError> {
        let mut bytes = decode_hex_id(collection_id)?;
        let mut nonce = [0u8; ID_NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);
        bytes.extend_from_slice(&nonce);
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, ObjectError> {
        decode_hex_id(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when the id starts with the bytes of the given hex collection id.
    pub fn belongs_to(&self, collection_id: &str) -> bool {
        decode_hex_id(collection_id)
            .map(|prefix| self.0.starts_with(&prefix))
            .unwrap_or(false)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn decode_hex_id(s: &str) -> Result<Vec<u8>, ObjectError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| ObjectError::InvalidId(format!("{s}: {e}")))?;
    if bytes.is_empty() {
        return Err(ObjectError::InvalidId("empty id".into()));
    }
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A key server's slot in the object header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerShareSlot {
    pub server_id: String,
    /// Shamir x-coordinate of the wrapped share.
    pub index: u8,
    pub wrapped_share: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub version: u8,
    pub package_id: String,
    pub id: ObjectId,
    pub threshold: u8,
    pub services: Vec<KeyServerShareSlot>,
    /// Compressed `U = r * G2`.
    pub encapsulation: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: [u8; 32],
}

impl EncryptedObject {
    /// Parse and structurally validate an object.
    pub fn parse(bytes: &[u8]) -> Result<Self, ObjectError> {
        let object: EncryptedObject =
            postcard::from_bytes(bytes).map_err(|e| ObjectError::Malformed(e.to_string()))?;
        if object.version != OBJECT_VERSION {
            return Err(ObjectError::UnsupportedVersion(object.version));
        }
        if object.threshold == 0 || object.threshold as usize > object.services.len() {
            return Err(ObjectError::InvalidThreshold {
                threshold: object.threshold,
                servers: object.services.len(),
            });
        }
        if object.id.as_bytes().is_empty() {
            return Err(ObjectError::InvalidId("empty id".into()));
        }
        Ok(object)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain owned data into a Vec cannot fail.
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// The identity key servers derive user keys for.
    pub fn identity(&self) -> Vec<u8> {
        ibe::identity(&self.package_id, self.id.as_bytes())
    }

    pub fn server_ids(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.server_id.as_str())
    }
}

/// A key server's public identity as seen by encryptors.
#[derive(Debug, Clone)]
pub struct ServicePublicKey {
    pub server_id: String,
    pub public_key: G2Projective,
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` for `threshold`-of-`servers.len()` key servers.
pub fn seal(
    package_id: &str,
    id: ObjectId,
    threshold: u8,
    servers: &[ServicePublicKey],
    plaintext: &[u8],
) -> Result<EncryptedObject, ObjectError> {
    if threshold == 0 || servers.len() > u8::MAX as usize || threshold as usize > servers.len() {
        return Err(ObjectError::InvalidThreshold {
            threshold,
            servers: servers.len(),
        });
    }

    let key = encrypt::generate_key();
    let ciphertext = encrypt::encrypt(plaintext, &key, id.as_bytes());
    let tag = verify::integrity_tag(&key, id.as_bytes(), &ciphertext);

    let key_shares = shares::split_key(&key, threshold, servers.len() as u8)
        .map_err(|e| ObjectError::Malformed(e.to_string()))?;

    let identity = ibe::identity(package_id, id.as_bytes());
    let r = ibe::random_nonce();
    let encapsulation = ibe::encapsulation(&r).to_affine().to_compressed().to_vec();

    let services = servers
        .iter()
        .zip(key_shares.iter())
        .map(|(server, share)| {
            let mask = ibe::wrap_mask(&server.public_key, &identity, &r, share.index);
            KeyServerShareSlot {
                server_id: server.server_id.clone(),
                index: share.index,
                wrapped_share: xor32(&share.data, &mask),
            }
        })
        .collect();

    Ok(EncryptedObject {
        version: OBJECT_VERSION,
        package_id: package_id.to_string(),
        id,
        threshold,
        services,
        encapsulation,
        ciphertext,
        tag,
    })
}

/// Decrypt an object given verified user keys, keyed by server id.
///
/// Uses the first `threshold` servers (in header order) that have a key.
pub fn open(
    object: &EncryptedObject,
    user_keys: &HashMap<String, G1Affine>,
) -> Result<Vec<u8>, CryptoError> {
    let threshold = object.threshold as usize;
    let usable: Vec<(&KeyServerShareSlot, &G1Affine)> = object
        .services
        .iter()
        .filter_map(|slot| user_keys.get(&slot.server_id).map(|key| (slot, key)))
        .take(threshold)
        .collect();
    if usable.len() < threshold {
        return Err(CryptoError::NotEnoughShares {
            required: threshold,
            provided: usable.len(),
        });
    }

    let u = ibe::deserialize_encapsulation(&object.encapsulation)
        .ok_or(CryptoError::InvalidEncapsulation)?;

    let recovered: Vec<shares::KeyShare> = usable
        .iter()
        .map(|(slot, user_key)| shares::KeyShare {
            index: slot.index,
            data: xor32(&slot.wrapped_share, &ibe::unwrap_mask(user_key, &u, slot.index)),
        })
        .collect();
    let key = shares::combine_key(&recovered, object.threshold)?;

    if !verify::verify_tag(&key, object.id.as_bytes(), &object.ciphertext, &object.tag) {
        return Err(CryptoError::IntegrityMismatch);
    }
    Ok(encrypt::decrypt(&object.ciphertext, &key, object.id.as_bytes()))
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}
