//! Boneh-Franklin identity-based key wrapping on BLS12-381.
//!
//! Every key server holds a master secret `s` and publishes `P = s * G2`.
//! An object identity (package id + object id) hashes to a point
//! `Q = H(identity)` in G1. After the policy check passes, a server releases
//! the user key `d = s * Q` for that identity.
//!
//! Share wrapping, for one object encrypted to several servers with a shared
//! nonce `r`:
//!
//! ```text
//! U      = r * G2                           (stored once in the object)
//! mask_i = KDF(e(r * Q, P_i), i)            (encryptor side)
//!        = KDF(e(d_i, U), i)                (reader side, given d_i)
//! ```
//!
//! since `e(r*Q, s*G2) = e(Q, G2)^(r*s) = e(s*Q, r*G2)`.
//! A user key is checked before use with `e(d, G2) == e(Q, P)`.

use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use ff::Field;
use group::Curve;
use sha2::{Digest, Sha256, Sha512};

const HASH_TO_G1_DOMAIN: &[u8] = b"inkwell-ibe-h2g1-v1";
const MASK_DOMAIN: &[u8] = b"inkwell-ibe-mask-v1";
const MASTER_SEED_DOMAIN: &[u8] = b"inkwell-ibe-master-v1";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A key server's master keypair.
#[derive(Clone, Debug)]
pub struct MasterKeyPair {
    /// Master secret `s`.
    pub sk: Scalar,
    /// Public key `s * G2`.
    pub pk: G2Projective,
}

// ---------------------------------------------------------------------------
// Key generation
// ---------------------------------------------------------------------------

fn random_nonzero_scalar() -> Scalar {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = Scalar::random(&mut rng);
        if candidate != Scalar::zero() {
            return candidate;
        }
    }
}

/// Generate a fresh master keypair.
pub fn keygen() -> MasterKeyPair {
    let sk = random_nonzero_scalar();
    let pk = G2Projective::generator() * sk;
    MasterKeyPair { sk, pk }
}

/// Derive a master keypair from a 32-byte seed.
pub fn keygen_from_seed(seed: &[u8; 32]) -> MasterKeyPair {
    let mut hasher = Sha512::new();
    hasher.update(seed);
    hasher.update(MASTER_SEED_DOMAIN);
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    let sk = Scalar::from_bytes_wide(&wide);
    let pk = G2Projective::generator() * sk;
    MasterKeyPair { sk, pk }
}

/// Draw the per-object encapsulation nonce.
pub fn random_nonce() -> Scalar {
    random_nonzero_scalar()
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// The byte string a key server derives a user key for.
///
/// Scoping by package keeps ids from different deployments apart.
pub fn identity(package_id: &str, object_id: &[u8]) -> Vec<u8> {
    let package = package_id.as_bytes();
    let mut out = Vec::with_capacity(2 + package.len() + object_id.len());
    out.extend_from_slice(&(package.len() as u16).to_be_bytes());
    out.extend_from_slice(package);
    out.extend_from_slice(object_id);
    out
}

/// Hash an identity onto the G1 prime-order subgroup.
///
/// Try-and-increment: hash to a candidate x-coordinate, decompress without
/// the subgroup check, clear the cofactor. Identities are public, so the
/// variable running time leaks nothing.
pub fn hash_to_g1(identity: &[u8]) -> G1Projective {
    let mut counter: u32 = 0;
    loop {
        let mut hasher = Sha512::new();
        hasher.update(HASH_TO_G1_DOMAIN);
        hasher.update(counter.to_be_bytes());
        hasher.update(identity);
        let digest = hasher.finalize();

        let mut candidate = [0u8; 48];
        candidate.copy_from_slice(&digest[..48]);
        // compression flag on, infinity flag off, sort flag from the hash
        candidate[0] = (candidate[0] & 0x3f) | 0x80;

        let point: Option<G1Affine> = G1Affine::from_compressed_unchecked(&candidate).into();
        if let Some(point) = point {
            let q = G1Projective::from(point).clear_cofactor();
            if !bool::from(q.is_identity()) {
                return q;
            }
        }
        counter = counter.wrapping_add(1);
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Extract the user key `d = s * H(identity)`.
pub fn extract(sk: &Scalar, identity: &[u8]) -> G1Affine {
    (hash_to_g1(identity) * sk).to_affine()
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Check `e(d, G2) == e(H(identity), P)`.
pub fn verify_user_key(pk: &G2Projective, identity: &[u8], user_key: &G1Affine) -> bool {
    let lhs = pairing(user_key, &G2Affine::generator());
    let rhs = pairing(&hash_to_g1(identity).to_affine(), &pk.to_affine());
    lhs == rhs
}

/// The shared encapsulation point `U = r * G2`.
pub fn encapsulation(r: &Scalar) -> G2Projective {
    G2Projective::generator() * r
}

/// Mask for share `index`, computed by the encryptor from the server's
/// public key.
pub fn wrap_mask(pk: &G2Projective, identity: &[u8], r: &Scalar, index: u8) -> [u8; 32] {
    let r_q = (hash_to_g1(identity) * r).to_affine();
    kdf_gt(&pairing(&r_q, &pk.to_affine()), index)
}

/// Mask for share `index`, recomputed by the reader from a user key.
pub fn unwrap_mask(user_key: &G1Affine, encapsulation: &G2Affine, index: u8) -> [u8; 32] {
    kdf_gt(&pairing(user_key, encapsulation), index)
}

/// Derive a 32-byte mask from a GT element.
///
/// The pairing crate exposes no byte encoding for GT; its `Debug` output is
/// the twelve canonical Fp coordinates as big-endian hex. Sealed objects
/// depend on that text, so `bls12_381` stays pinned to an exact version and
/// `test_gt_debug_layout` fails if the layout moves.
fn kdf_gt(gt_elem: &Gt, index: u8) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(MASK_DOMAIN);
    hasher.update([index]);
    hasher.update(format!("{:?}", gt_elem).as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Compressed 96-byte encoding of a server public key.
pub fn serialize_public_key(pk: &G2Projective) -> [u8; 96] {
    pk.to_affine().to_compressed()
}

pub fn deserialize_public_key(bytes: &[u8]) -> Option<G2Projective> {
    let arr: [u8; 96] = bytes.try_into().ok()?;
    let affine: Option<G2Affine> = G2Affine::from_compressed(&arr).into();
    Some(G2Projective::from(affine?))
}

/// Compressed 48-byte encoding of a user key.
pub fn serialize_user_key(key: &G1Affine) -> [u8; 48] {
    key.to_compressed()
}

pub fn deserialize_user_key(bytes: &[u8]) -> Option<G1Affine> {
    let arr: [u8; 48] = bytes.try_into().ok()?;
    G1Affine::from_compressed(&arr).into()
}

pub fn deserialize_encapsulation(bytes: &[u8]) -> Option<G2Affine> {
    let arr: [u8; 96] = bytes.try_into().ok()?;
    G2Affine::from_compressed(&arr).into()
}
