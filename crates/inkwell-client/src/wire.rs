//! Key-server wire format: JSON bodies exchanged over HTTP.
//!
//! Byte strings travel as hex. The policy proof travels as the postcard
//! encoding of its transaction kind.

use inkwell_core::object::ObjectId;
use inkwell_core::policy::TransactionKind;
use inkwell_core::{ObjectError, PolicyProof, SessionCertificate};
use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────────

/// `POST /v1/fetch_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchKeyRequest {
    /// Object ids, hex.
    pub ids: Vec<String>,
    /// Postcard-encoded [`TransactionKind`], hex.
    pub tx_kind: String,
    pub certificate: SessionCertificate,
}

impl FetchKeyRequest {
    pub fn new(ids: &[&ObjectId], proof: &PolicyProof, certificate: SessionCertificate) -> Self {
        Self {
            ids: ids.iter().map(|id| id.to_hex()).collect(),
            tx_kind: hex::encode(proof.build_kind_bytes()),
            certificate,
        }
    }

    pub fn object_ids(&self) -> Result<Vec<ObjectId>, ObjectError> {
        self.ids.iter().map(|id| ObjectId::from_hex(id)).collect()
    }

    pub fn transaction_kind(&self) -> Result<TransactionKind, String> {
        let bytes = hex::decode(&self.tx_kind).map_err(|e| format!("tx_kind hex: {e}"))?;
        TransactionKind::from_bytes(&bytes).map_err(|e| format!("tx_kind decode: {e}"))
    }
}

// ── Responses ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchKeyResponse {
    pub keys: Vec<DerivedKey>,
}

/// A user key for one object id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedKey {
    /// Object id, hex.
    pub id: String,
    /// Compressed G1 user key, hex (48 bytes).
    pub key: String,
}

/// `GET /v1/service`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub server_id: String,
    /// Compressed G2 master public key, hex (96 bytes).
    pub public_key: String,
}

/// Body of every non-2xx key-server response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NoAccess,
    InvalidCertificate,
    InvalidRequest,
    Internal,
}
