//! Wallet-signed session credentials.
//!
//! A credential authorizes key requests for one package (`scope_id`) on
//! behalf of one wallet address for a bounded number of minutes. The wallet
//! signs [`SessionCredential::canonical_message`] once; the signed credential
//! is then reused for every key request until it expires. Credentials live in
//! memory only.
//!
//! Addresses are `0x` followed by the hex SHA-256 of the wallet's Ed25519
//! public key.

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::verify::sha256_hash;

/// Longest TTL key servers accept.
pub const MAX_TTL_MINUTES: u16 = 30;

const MESSAGE_DOMAIN: &str = "inkwell session credential v1";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Derive the wallet address for an Ed25519 public key.
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(sha256_hash(public_key)))
}

/// A signature produced by the wallet over a canonical message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSignature {
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    owner_address: String,
    scope_id: String,
    issued_at: i64,
    ttl_minutes: u16,
    signature: Option<WalletSignature>,
}

impl SessionCredential {
    /// Create an unsigned credential issued now.
    pub fn create(
        owner_address: impl Into<String>,
        scope_id: impl Into<String>,
        ttl_minutes: u16,
    ) -> Result<Self, SessionError> {
        Self::create_at(owner_address, scope_id, ttl_minutes, now_ms())
    }

    /// Create an unsigned credential with an explicit issue time.
    pub fn create_at(
        owner_address: impl Into<String>,
        scope_id: impl Into<String>,
        ttl_minutes: u16,
        issued_at_ms: i64,
    ) -> Result<Self, SessionError> {
        if ttl_minutes == 0 || ttl_minutes > MAX_TTL_MINUTES {
            return Err(SessionError::InvalidTtl {
                got: ttl_minutes,
                max: MAX_TTL_MINUTES,
            });
        }
        Ok(Self {
            owner_address: owner_address.into(),
            scope_id: scope_id.into(),
            issued_at: issued_at_ms,
            ttl_minutes,
            signature: None,
        })
    }

    pub fn owner_address(&self) -> &str {
        &self.owner_address
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn ttl_minutes(&self) -> u16 {
        self.ttl_minutes
    }

    pub fn signature(&self) -> Option<&WalletSignature> {
        self.signature.as_ref()
    }

    pub fn expires_at(&self) -> i64 {
        self.issued_at
            .saturating_add(i64::from(self.ttl_minutes) * 60_000)
    }

    /// The bytes the wallet signs.
    pub fn canonical_message(&self) -> Vec<u8> {
        canonical_message(
            &self.owner_address,
            &self.scope_id,
            self.issued_at,
            self.ttl_minutes,
        )
    }

    /// Attach the wallet signature. Only the first call succeeds.
    pub fn attach_signature(&mut self, signature: WalletSignature) -> Result<(), SessionError> {
        if self.signature.is_some() {
            return Err(SessionError::AlreadySigned);
        }
        self.signature = Some(signature);
        Ok(())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at()
    }

    pub fn is_usable_for(&self, address: &str) -> bool {
        self.is_usable_for_at(address, now_ms())
    }

    pub fn is_usable_for_at(&self, address: &str, now_ms: i64) -> bool {
        !self.is_expired_at(now_ms) && self.signature.is_some() && self.owner_address == address
    }

    /// Wire form for key servers; `None` until signed.
    pub fn certificate(&self) -> Option<SessionCertificate> {
        let signature = self.signature.as_ref()?;
        Some(SessionCertificate {
            owner_address: self.owner_address.clone(),
            scope_id: self.scope_id.clone(),
            issued_at: self.issued_at,
            ttl_minutes: self.ttl_minutes,
            public_key: hex::encode(signature.public_key),
            signature: hex::encode(&signature.signature),
        })
    }
}

fn canonical_message(owner: &str, scope: &str, issued_at: i64, ttl_minutes: u16) -> Vec<u8> {
    let issued = DateTime::<Utc>::from_timestamp_millis(issued_at)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| issued_at.to_string());
    format!(
        "{MESSAGE_DOMAIN}\nowner: {owner}\nscope: {scope}\nissued: {issued}\nttl: {ttl_minutes} min"
    )
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Certificate (what key servers see)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCertificate {
    pub owner_address: String,
    pub scope_id: String,
    pub issued_at: i64,
    pub ttl_minutes: u16,
    /// Hex Ed25519 public key of the signing wallet.
    pub public_key: String,
    /// Hex Ed25519 signature over the canonical message.
    pub signature: String,
}

impl SessionCertificate {
    /// Full server-side check: TTL bounds, expiry, signer address, signature.
    pub fn verify(&self, now_ms: i64) -> Result<(), SessionError> {
        if self.ttl_minutes == 0 || self.ttl_minutes > MAX_TTL_MINUTES {
            return Err(SessionError::InvalidTtl {
                got: self.ttl_minutes,
                max: MAX_TTL_MINUTES,
            });
        }
        let expires_at = self
            .issued_at
            .checked_add(i64::from(self.ttl_minutes) * 60_000)
            .ok_or_else(|| SessionError::Malformed("issued_at out of range".into()))?;
        if now_ms > expires_at {
            return Err(SessionError::Expired);
        }

        let pk_bytes: [u8; 32] = hex::decode(&self.public_key)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| SessionError::Malformed("public key must be 32 hex bytes".into()))?;
        let signer = address_from_public_key(&pk_bytes);
        if signer != self.owner_address {
            return Err(SessionError::AddressMismatch {
                expected: self.owner_address.clone(),
                actual: signer,
            });
        }

        let key = VerifyingKey::from_bytes(&pk_bytes)
            .map_err(|e| SessionError::Malformed(e.to_string()))?;
        let sig_bytes = hex::decode(&self.signature)
            .map_err(|e| SessionError::Malformed(format!("signature: {e}")))?;
        let signature =
            Signature::from_slice(&sig_bytes).map_err(|e| SessionError::BadSignature(e.to_string()))?;

        let message = canonical_message(
            &self.owner_address,
            &self.scope_id,
            self.issued_at,
            self.ttl_minutes,
        );
        key.verify(&message, &signature)
            .map_err(|e| SessionError::BadSignature(e.to_string()))
    }
}
