//! Threshold key client: collects user keys from a key-server quorum and
//! decrypts locally once enough are cached.
//!
//! Flow per batch:
//! 1. Skip ids that already have `threshold` verified keys cached
//! 2. Send one request (ids + policy transaction + certificate) to every server concurrently
//! 3. Verify each returned user key against that server's public key
//! 4. Cache the verified keys, keyed by (object id, server id)
//!
//! [`ThresholdKeyClient::decrypt`] never touches the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bls12_381::{G1Affine, G2Projective};
use futures::future::join_all;
use inkwell_core::{ibe, object, EncryptedObject, ObjectId, PolicyProof, SessionCredential};
use inkwell_core::{SessionError, KEY_BATCH_SIZE};
use tracing::{debug, info, warn};

use crate::error::{DecryptionError, KeyAccessError};
use crate::key_server::{KeyServer, KeyServerError};
use crate::wire::{FetchKeyRequest, FetchKeyResponse};

/// A key server the client may query.
#[derive(Clone)]
pub struct KeyServerHandle {
    pub id: String,
    pub public_key: G2Projective,
    pub transport: Arc<dyn KeyServer>,
}

/// Verified user keys per (scope, object id), then per server id.
type KeyCache = HashMap<(String, ObjectId), HashMap<String, G1Affine>>;

pub struct ThresholdKeyClient {
    servers: Vec<KeyServerHandle>,
    cache: Mutex<KeyCache>,
}

impl ThresholdKeyClient {
    pub fn new(servers: Vec<KeyServerHandle>) -> Self {
        Self {
            servers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn servers(&self) -> &[KeyServerHandle] {
        &self.servers
    }

    /// Number of distinct servers whose verified key for `id` under
    /// `scope_id` is cached.
    pub fn cached_share_count(&self, scope_id: &str, id: &ObjectId) -> usize {
        self.cache()
            .get(&(scope_id.to_string(), id.clone()))
            .map_or(0, HashMap::len)
    }

    fn cache(&self) -> MutexGuard<'_, KeyCache> {
        // Entries are only ever inserted whole, so a poisoned map is still consistent.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make sure every id in `ids` has keys from `threshold` servers cached.
    pub async fn fetch_key_shares(
        &self,
        ids: &[ObjectId],
        proof: &PolicyProof,
        credential: &SessionCredential,
        threshold: u8,
    ) -> Result<(), KeyAccessError> {
        if ids.is_empty() || ids.len() > KEY_BATCH_SIZE {
            return Err(KeyAccessError::InvalidRequest(format!(
                "expected 1..={KEY_BATCH_SIZE} ids, got {}",
                ids.len()
            )));
        }
        let threshold = threshold as usize;
        if threshold == 0 || threshold > self.servers.len() {
            return Err(KeyAccessError::InvalidRequest(format!(
                "threshold {threshold} with {} key servers",
                self.servers.len()
            )));
        }
        let certificate = credential
            .certificate()
            .ok_or(SessionError::Unsigned)?;
        if credential.is_expired() {
            return Err(SessionError::Expired.into());
        }

        let scope = credential.scope_id();
        let missing: Vec<&ObjectId> = ids
            .iter()
            .filter(|id| self.cached_share_count(scope, id) < threshold)
            .collect();
        if missing.is_empty() {
            debug!(count = ids.len(), "all key shares already cached");
            return Ok(());
        }
        if let Some(id) = missing.iter().find(|id| !proof.covers(id)) {
            return Err(KeyAccessError::InvalidRequest(format!(
                "policy proof has no call for id {id}"
            )));
        }

        let request = FetchKeyRequest::new(&missing, proof, certificate);
        let responses = join_all(self.servers.iter().map(|server| {
            let request = &request;
            async move { (server, server.transport.fetch_key(request).await) }
        }))
        .await;

        let mut no_access = 0usize;
        let mut failures = Vec::new();
        for (server, result) in responses {
            match result {
                Ok(resp) => {
                    let stored = self.store_verified(server, scope, &missing, resp);
                    debug!(server_id = %server.id, stored, "key server answered");
                }
                Err(KeyServerError::NoAccess(reason)) => {
                    warn!(server_id = %server.id, %reason, "key server denied access");
                    no_access += 1;
                    failures.push(format!("{}: no access", server.id));
                }
                Err(e) => {
                    warn!(server_id = %server.id, error = %e, "key server request failed");
                    failures.push(format!("{}: {e}", server.id));
                }
            }
        }

        let short = missing
            .iter()
            .filter(|id| self.cached_share_count(scope, id) < threshold)
            .count();
        if short == 0 {
            info!(count = missing.len(), threshold, "key shares collected");
            return Ok(());
        }
        if no_access > 0 {
            return Err(KeyAccessError::NoAccess);
        }
        Err(KeyAccessError::Unavailable {
            reason: format!(
                "{short} of {} ids below threshold {threshold} ({})",
                missing.len(),
                failures.join("; ")
            ),
        })
    }

    /// Verify and cache the keys in one server's response. Returns how many
    /// were stored.
    fn store_verified(
        &self,
        server: &KeyServerHandle,
        package_id: &str,
        requested: &[&ObjectId],
        resp: FetchKeyResponse,
    ) -> usize {
        let mut verified = Vec::with_capacity(resp.keys.len());
        for derived in resp.keys {
            let Ok(id) = ObjectId::from_hex(&derived.id) else {
                warn!(server_id = %server.id, id = %derived.id, "unparseable id in response");
                continue;
            };
            if !requested.contains(&&id) {
                warn!(server_id = %server.id, %id, "key for unrequested id");
                continue;
            }
            let key = hex::decode(&derived.key)
                .ok()
                .and_then(|bytes| ibe::deserialize_user_key(&bytes));
            let Some(key) = key else {
                warn!(server_id = %server.id, %id, "malformed user key");
                continue;
            };
            let identity = ibe::identity(package_id, id.as_bytes());
            if !ibe::verify_user_key(&server.public_key, &identity, &key) {
                warn!(server_id = %server.id, %id, "user key failed verification");
                continue;
            }
            verified.push((id, key));
        }

        let stored = verified.len();
        let mut cache = self.cache();
        for (id, key) in verified {
            cache
                .entry((package_id.to_string(), id))
                .or_default()
                .insert(server.id.clone(), key);
        }
        stored
    }

    /// Decrypt one encrypted object with cached keys.
    ///
    /// `proof` must be the proof the keys were fetched under.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        credential: &SessionCredential,
        proof: &PolicyProof,
    ) -> Result<Vec<u8>, DecryptionError> {
        let object = EncryptedObject::parse(ciphertext)?;
        if object.package_id != credential.scope_id() {
            return Err(DecryptionError::ScopeMismatch {
                expected: credential.scope_id().to_string(),
                actual: object.package_id,
            });
        }
        if !proof.covers(&object.id) {
            return Err(KeyAccessError::InvalidRequest(format!(
                "policy proof has no call for id {}",
                object.id
            ))
            .into());
        }

        let keys: HashMap<String, G1Affine> = {
            let cache = self.cache();
            let cached = cache.get(&(object.package_id.clone(), object.id.clone()));
            object
                .server_ids()
                .filter_map(|sid| {
                    cached
                        .and_then(|m| m.get(sid))
                        .map(|key| (sid.to_string(), *key))
                })
                .collect()
        };
        if keys.len() < object.threshold as usize {
            return Err(KeyAccessError::Unavailable {
                reason: format!(
                    "{} of {} key shares cached for {}",
                    keys.len(),
                    object.threshold,
                    object.id
                ),
            }
            .into());
        }

        let plaintext = object::open(&object, &keys)?;
        debug!(id = %object.id, bytes = plaintext.len(), "object decrypted");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_server::{KeyService, PolicyEvaluator};
    use ed25519_dalek::{Signer, SigningKey};
    use inkwell_core::object::ServicePublicKey;
    use inkwell_core::policy::{build_policy_proof, TransactionKind};
    use inkwell_core::session::{address_from_public_key, WalletSignature};
    use inkwell_core::{OwnerPolicy, SessionCertificate};

    const PKG: &str = "0xpkg";

    struct AllowAll;

    impl PolicyEvaluator for AllowAll {
        fn evaluate(
            &self,
            _: &TransactionKind,
            _: &[ObjectId],
            _: &SessionCertificate,
        ) -> Result<(), KeyServerError> {
            Ok(())
        }
    }

    fn services(n: u8) -> Vec<Arc<KeyService>> {
        (0..n)
            .map(|i| {
                Arc::new(KeyService::new(
                    format!("ks-{i}"),
                    PKG,
                    ibe::keygen_from_seed(&[i + 1; 32]),
                    Arc::new(AllowAll),
                ))
            })
            .collect()
    }

    fn handles(services: &[Arc<KeyService>]) -> Vec<KeyServerHandle> {
        services
            .iter()
            .map(|s| KeyServerHandle {
                id: s.server_id().to_string(),
                public_key: s.public_key(),
                transport: s.clone(),
            })
            .collect()
    }

    fn credential() -> SessionCredential {
        scoped_credential(PKG)
    }

    fn scoped_credential(scope: &str) -> SessionCredential {
        let sk = SigningKey::from_bytes(&[5; 32]);
        let address = address_from_public_key(sk.verifying_key().as_bytes());
        let mut cred = SessionCredential::create(&address, scope, 10).unwrap();
        let sig = sk.sign(&cred.canonical_message());
        cred.attach_signature(WalletSignature {
            public_key: sk.verifying_key().to_bytes(),
            signature: sig.to_bytes().to_vec(),
        })
        .unwrap();
        cred
    }

    fn proof(ids: &[ObjectId]) -> PolicyProof {
        build_policy_proof(
            &OwnerPolicy {
                package: PKG.into(),
                owner_cap_id: "0xcap".into(),
                collection_id: "0xc0".into(),
            },
            ids,
        )
    }

    fn seal(services: &[Arc<KeyService>], id: &ObjectId, body: &[u8]) -> Vec<u8> {
        seal_in(PKG, services, id, body)
    }

    fn seal_in(
        package: &str,
        services: &[Arc<KeyService>],
        id: &ObjectId,
        body: &[u8],
    ) -> Vec<u8> {
        let public: Vec<ServicePublicKey> = services
            .iter()
            .map(|s| ServicePublicKey {
                server_id: s.server_id().to_string(),
                public_key: s.public_key(),
            })
            .collect();
        object::seal(package, id.clone(), 2, &public, body).unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_fetch_then_decrypt() {
        let services = services(3);
        let client = ThresholdKeyClient::new(handles(&services));
        let id = ObjectId::new(vec![0xc0, 1]);
        let blob = seal(&services, &id, b"hello");
        let cred = credential();
        let proof = proof(&[id.clone()]);

        client
            .fetch_key_shares(&[id.clone()], &proof, &cred, 2)
            .await
            .unwrap();
        assert_eq!(client.cached_share_count(PKG, &id), 3);
        assert_eq!(client.decrypt(&blob, &cred, &proof).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_keys_are_not_shared_across_scopes() {
        let services = services(3);
        let client = ThresholdKeyClient::new(handles(&services));
        let id = ObjectId::new(vec![0xc0, 7]);
        client
            .fetch_key_shares(&[id.clone()], &proof(&[id.clone()]), &credential(), 2)
            .await
            .unwrap();
        assert_eq!(client.cached_share_count(PKG, &id), 3);
        assert_eq!(client.cached_share_count("0xother", &id), 0);

        // Same id sealed under another package: the cached keys must not be used.
        let blob = seal_in("0xother", &services, &id, b"elsewhere");
        let err = client
            .decrypt(&blob, &scoped_credential("0xother"), &proof(&[id]))
            .unwrap_err();
        assert!(matches!(
            err,
            DecryptionError::KeyAccess(KeyAccessError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_decrypt_without_keys_is_unavailable() {
        let services = services(2);
        let client = ThresholdKeyClient::new(handles(&services));
        let id = ObjectId::new(vec![1]);
        let blob = seal(&services, &id, b"x");
        let err = client
            .decrypt(&blob, &credential(), &proof(&[id]))
            .unwrap_err();
        assert!(matches!(
            err,
            DecryptionError::KeyAccess(KeyAccessError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsigned_credential_is_invalid_request() {
        let client = ThresholdKeyClient::new(handles(&services(2)));
        let unsigned = SessionCredential::create("0xabc", PKG, 10).unwrap();
        let id = ObjectId::new(vec![1]);
        let err = client
            .fetch_key_shares(&[id.clone()], &proof(&[id]), &unsigned, 2)
            .await
            .unwrap_err();
        assert_eq!(err, KeyAccessError::from(SessionError::Unsigned));
    }

    #[tokio::test]
    async fn test_batch_bounds() {
        let client = ThresholdKeyClient::new(handles(&services(2)));
        let cred = credential();
        let err = client
            .fetch_key_shares(&[], &proof(&[]), &cred, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyAccessError::InvalidRequest(_)));

        let ids: Vec<ObjectId> = (0..11u8).map(|i| ObjectId::new(vec![i])).collect();
        let err = client
            .fetch_key_shares(&ids, &proof(&ids), &cred, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyAccessError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_forged_keys_are_not_cached() {
        let honest = services(2);
        let mut handles = handles(&honest);
        // Second server's transport answers with keys from an unrelated master.
        handles[1].transport = Arc::new(KeyService::new(
            "ks-1",
            PKG,
            ibe::keygen_from_seed(&[0xee; 32]),
            Arc::new(AllowAll),
        ));
        let client = ThresholdKeyClient::new(handles);
        let id = ObjectId::new(vec![1]);

        let err = client
            .fetch_key_shares(&[id.clone()], &proof(&[id.clone()]), &credential(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyAccessError::Unavailable { .. }));
        assert_eq!(client.cached_share_count(PKG, &id), 1);
    }
}
