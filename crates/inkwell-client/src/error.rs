//! Error types for the retrieval path.
//!
//! Fetch failures are per file and get logged and skipped by the
//! orchestrator. Everything else halts a batch and surfaces as a
//! [`BatchError`] carrying the message shown to the reader.

use inkwell_core::{CryptoError, ObjectError, SessionError};
use thiserror::Error;

const MSG_ALL_FETCHES_FAILED: &str = "cannot retrieve any files";
const MSG_NO_ACCESS: &str = "no access to decryption keys";
const MSG_TRY_AGAIN: &str = "unable to decrypt files, try again";

/// Every configured aggregator failed for one blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("blob {fetch_key} unavailable after {attempts} aggregator attempts")]
pub struct FetchFailure {
    pub fetch_key: String,
    pub attempts: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyAccessError {
    /// The policy check rejected the reader.
    #[error("no access to decryption keys")]
    NoAccess,
    /// Not enough key servers answered with valid keys.
    #[error("key servers unavailable: {reason}")]
    Unavailable { reason: String },
    /// Caller bug: bad batch size, unsigned or expired credential, proof
    /// not covering the ids. No request is sent.
    #[error("invalid key request: {0}")]
    InvalidRequest(String),
}

impl From<SessionError> for KeyAccessError {
    fn from(err: SessionError) -> Self {
        KeyAccessError::InvalidRequest(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error(transparent)]
    KeyAccess(#[from] KeyAccessError),
    #[error("malformed ciphertext: {0}")]
    Malformed(#[from] ObjectError),
    #[error("object belongs to package {actual}, session is scoped to {expected}")]
    ScopeMismatch { expected: String, actual: String },
    #[error("decryption failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Why a [`decrypt_all`](crate::orchestrator::Orchestrator::decrypt_all)
/// call stopped. `Display` is the reader-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("cannot retrieve any files")]
    AllFetchesFailed,
    #[error("{}", key_access_message(.0))]
    KeyAccess(KeyAccessError),
    #[error("unable to decrypt files, try again")]
    Decryption(DecryptionError),
}

fn key_access_message(err: &KeyAccessError) -> &'static str {
    match err {
        KeyAccessError::NoAccess => MSG_NO_ACCESS,
        KeyAccessError::Unavailable { .. } | KeyAccessError::InvalidRequest(_) => MSG_TRY_AGAIN,
    }
}

impl BatchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            BatchError::AllFetchesFailed => MSG_ALL_FETCHES_FAILED,
            BatchError::KeyAccess(e) => key_access_message(e),
            BatchError::Decryption(_) => MSG_TRY_AGAIN,
        }
    }

    /// Whether offering the reader a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            BatchError::AllFetchesFailed => true,
            BatchError::KeyAccess(KeyAccessError::Unavailable { .. }) => true,
            BatchError::KeyAccess(_) => false,
            BatchError::Decryption(_) => true,
        }
    }
}

impl From<KeyAccessError> for BatchError {
    fn from(err: KeyAccessError) -> Self {
        BatchError::KeyAccess(err)
    }
}

impl From<DecryptionError> for BatchError {
    fn from(err: DecryptionError) -> Self {
        match err {
            DecryptionError::KeyAccess(e) => BatchError::KeyAccess(e),
            other => BatchError::Decryption(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("key server {server_id}: invalid public key ({reason})")]
    InvalidPublicKey { server_id: String, reason: String },
    #[error("building http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_distinguish_no_access() {
        let denied = BatchError::from(KeyAccessError::NoAccess);
        let down = BatchError::from(KeyAccessError::Unavailable {
            reason: "timeout".into(),
        });
        assert_eq!(denied.to_string(), "no access to decryption keys");
        assert_eq!(down.to_string(), "unable to decrypt files, try again");
        assert_ne!(denied.user_message(), down.user_message());
        assert!(!denied.is_retryable());
        assert!(down.is_retryable());
    }

    #[test]
    fn test_decryption_error_routes_key_access() {
        let err = BatchError::from(DecryptionError::KeyAccess(KeyAccessError::Unavailable {
            reason: "1 of 2 shares".into(),
        }));
        assert!(matches!(err, BatchError::KeyAccess(_)));

        let err = BatchError::from(DecryptionError::Crypto(CryptoError::IntegrityMismatch));
        assert_eq!(err.user_message(), "unable to decrypt files, try again");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_session_errors_are_invalid_requests() {
        assert_eq!(
            KeyAccessError::from(SessionError::Unsigned),
            KeyAccessError::InvalidRequest("session credential is not signed".into())
        );
        assert!(!BatchError::from(KeyAccessError::from(SessionError::Expired)).is_retryable());
    }

    #[test]
    fn test_all_fetches_failed_message() {
        assert_eq!(
            BatchError::AllFetchesFailed.to_string(),
            "cannot retrieve any files"
        );
    }
}
