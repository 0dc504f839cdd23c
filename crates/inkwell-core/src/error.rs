//! Error types shared across the core modules.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Session credentials
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session credential is already signed")]
    AlreadySigned,
    #[error("session ttl must be between 1 and {max} minutes, got {got}")]
    InvalidTtl { got: u16, max: u16 },
    #[error("session credential is not signed")]
    Unsigned,
    #[error("session credential expired")]
    Expired,
    #[error("invalid session signature: {0}")]
    BadSignature(String),
    #[error("signer address {actual} does not match credential owner {expected}")]
    AddressMismatch { expected: String, actual: String },
    #[error("credential scope {actual} does not match {expected}")]
    ScopeMismatch { expected: String, actual: String },
    #[error("malformed session certificate: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Encrypted object format
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("malformed encrypted object: {0}")]
    Malformed(String),
    #[error("unsupported encrypted object version {0}")]
    UnsupportedVersion(u8),
    #[error("threshold {threshold} is invalid for {servers} key servers")]
    InvalidThreshold { threshold: u8, servers: usize },
    #[error("invalid key server public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid object id: {0}")]
    InvalidId(String),
}

// ---------------------------------------------------------------------------
// Share recovery and decryption
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("not enough key shares: required {required}, provided {provided}")]
    NotEnoughShares { required: usize, provided: usize },
    #[error("duplicate key share index {0}")]
    DuplicateShareIndex(u8),
    #[error("key split failed: {0}")]
    ShareSplit(String),
    #[error("key recovery failed: {0}")]
    ShareCombine(String),
    #[error("invalid encapsulation point")]
    InvalidEncapsulation,
    #[error("integrity tag mismatch")]
    IntegrityMismatch,
    #[error(transparent)]
    Object(#[from] ObjectError),
}
