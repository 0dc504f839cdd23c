//! Key-server transports.
//!
//! [`KeyServer`] decouples the threshold client from how a server is
//! reached. [`HttpKeyServer`] talks to a remote server over JSON;
//! [`KeyService`] is the server itself, usable in-process or behind the
//! router in [`crate::server`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bls12_381::G2Projective;
use inkwell_core::ibe::{self, MasterKeyPair};
use inkwell_core::policy::TransactionKind;
use inkwell_core::session::now_ms;
use inkwell_core::{ObjectId, SessionCertificate, SessionError, KEY_BATCH_SIZE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::wire::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyServerError {
    #[error("access denied: {0}")]
    NoAccess(String),
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyServer: Send + Sync {
    async fn fetch_key(&self, request: &FetchKeyRequest)
        -> Result<FetchKeyResponse, KeyServerError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct HttpKeyServer {
    client: reqwest::Client,
    url: String,
}

impl HttpKeyServer {
    /// `timeout` bounds each request end to end.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn service_info(&self) -> Result<ServiceInfo, KeyServerError> {
        let resp = self
            .client
            .get(format!("{}/v1/service", self.url))
            .send()
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(KeyServerError::Unavailable(format!("http {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| KeyServerError::Unavailable(format!("bad service info: {e}")))
    }
}

#[async_trait]
impl KeyServer for HttpKeyServer {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError> {
        let resp = self
            .client
            .post(format!("{}/v1/fetch_key", self.url))
            .json(request)
            .send()
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| KeyServerError::Unavailable(format!("bad response body: {e}")));
        }

        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        Err(match status {
            StatusCode::FORBIDDEN => KeyServerError::NoAccess(message),
            StatusCode::UNAUTHORIZED => KeyServerError::InvalidCertificate(message),
            StatusCode::BAD_REQUEST => KeyServerError::InvalidRequest(message),
            _ => KeyServerError::Unavailable(format!("http {status}: {message}")),
        })
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Decides whether a policy transaction grants access to the requested ids.
///
/// On chain this is a dry run of the transaction; [`crate::registry::InMemoryPolicy`]
/// stands in for it off chain.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        kind: &TransactionKind,
        ids: &[ObjectId],
        certificate: &SessionCertificate,
    ) -> Result<(), KeyServerError>;
}

/// One key server: holds a master key and releases user keys to callers
/// whose certificate verifies and whose policy transaction passes.
pub struct KeyService {
    server_id: String,
    package_id: String,
    master: MasterKeyPair,
    policy: Arc<dyn PolicyEvaluator>,
}

impl KeyService {
    pub fn new(
        server_id: impl Into<String>,
        package_id: impl Into<String>,
        master: MasterKeyPair,
        policy: Arc<dyn PolicyEvaluator>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            package_id: package_id.into(),
            master,
            policy,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn public_key(&self) -> G2Projective {
        self.master.pk
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            server_id: self.server_id.clone(),
            public_key: hex::encode(ibe::serialize_public_key(&self.master.pk)),
        }
    }

    pub fn handle(&self, request: &FetchKeyRequest) -> Result<FetchKeyResponse, KeyServerError> {
        let certificate = &request.certificate;
        certificate
            .verify(now_ms())
            .map_err(|e| KeyServerError::InvalidCertificate(e.to_string()))?;
        if certificate.scope_id != self.package_id {
            let e = SessionError::ScopeMismatch {
                expected: self.package_id.clone(),
                actual: certificate.scope_id.clone(),
            };
            return Err(KeyServerError::InvalidCertificate(e.to_string()));
        }

        let ids = request
            .object_ids()
            .map_err(|e| KeyServerError::InvalidRequest(e.to_string()))?;
        if ids.is_empty() || ids.len() > KEY_BATCH_SIZE {
            return Err(KeyServerError::InvalidRequest(format!(
                "expected 1..={KEY_BATCH_SIZE} ids, got {}",
                ids.len()
            )));
        }
        let kind = request
            .transaction_kind()
            .map_err(KeyServerError::InvalidRequest)?;

        if let Err(e) = self.policy.evaluate(&kind, &ids, certificate) {
            warn!(
                server_id = %self.server_id,
                owner = %certificate.owner_address,
                error = %e,
                "policy check failed"
            );
            return Err(e);
        }

        let keys = ids
            .iter()
            .map(|id| {
                let identity = ibe::identity(&self.package_id, id.as_bytes());
                let user_key = ibe::extract(&self.master.sk, &identity);
                DerivedKey {
                    id: id.to_hex(),
                    key: hex::encode(ibe::serialize_user_key(&user_key)),
                }
            })
            .collect::<Vec<_>>();

        info!(
            server_id = %self.server_id,
            owner = %certificate.owner_address,
            count = keys.len(),
            "released user keys"
        );
        Ok(FetchKeyResponse { keys })
    }
}

#[async_trait]
impl KeyServer for KeyService {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError> {
        self.handle(request)
    }
}
