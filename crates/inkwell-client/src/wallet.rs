//! Wallet capability and session reuse.
//!
//! The read path only ever needs a wallet to sign one message per session,
//! so [`Wallet`] exposes an address and message signing and nothing else.

use std::path::Path;

use anyhow::{Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use inkwell_core::session::address_from_public_key;
use inkwell_core::{SessionCredential, WalletSignature};
use tracing::{debug, info};

pub trait Wallet: Send + Sync {
    fn address(&self) -> String;
    fn sign_message(&self, message: &[u8]) -> Result<WalletSignature>;
}

/// Ed25519 key held in process memory.
pub struct LocalWallet {
    signing_key: SigningKey,
}

impl LocalWallet {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Read a 32-byte hex secret key from `path`.
    pub fn from_hex_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading wallet key {}", path.display()))?;
        let bytes = hex::decode(raw.trim()).context("wallet key is not hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("wallet key must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// Hex secret key, the format [`LocalWallet::from_hex_file`] reads.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Wallet for LocalWallet {
    fn address(&self) -> String {
        address_from_public_key(self.signing_key.verifying_key().as_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<WalletSignature> {
        let signature = self.signing_key.sign(message);
        Ok(WalletSignature {
            public_key: self.signing_key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

/// Holds the current session credential and re-signs only when it is no
/// longer usable for the connected wallet.
pub struct SessionManager {
    scope_id: String,
    ttl_minutes: u16,
    current: Option<SessionCredential>,
}

impl SessionManager {
    pub fn new(scope_id: impl Into<String>, ttl_minutes: u16) -> Self {
        Self {
            scope_id: scope_id.into(),
            ttl_minutes,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&SessionCredential> {
        self.current.as_ref()
    }

    /// A signed, unexpired credential for `wallet`'s address. Asks the
    /// wallet to sign only when the held one can't be reused.
    pub fn credential_for(&mut self, wallet: &dyn Wallet) -> Result<&SessionCredential> {
        let address = wallet.address();
        let reusable = self
            .current
            .as_ref()
            .is_some_and(|c| c.is_usable_for(&address));
        if reusable {
            debug!(%address, "reusing session credential");
            return self.current.as_ref().context("session credential vanished");
        }

        let mut credential = SessionCredential::create(&address, &self.scope_id, self.ttl_minutes)?;
        let signature = wallet
            .sign_message(&credential.canonical_message())
            .context("wallet refused to sign session credential")?;
        credential.attach_signature(signature)?;
        info!(
            %address,
            scope = %self.scope_id,
            ttl_minutes = self.ttl_minutes,
            "signed new session credential"
        );
        let held: &SessionCredential = self.current.insert(credential);
        Ok(held)
    }
}
