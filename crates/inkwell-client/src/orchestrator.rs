//! Batch decryption: fetch, collect keys, decrypt.
//!
//! Phases of [`Orchestrator::decrypt_all`]:
//! 1. Fetch every blob concurrently. Failed fetches are logged and skipped;
//!    only an all-failed fetch aborts.
//! 2. In groups of [`KEY_BATCH_SIZE`], build one policy proof per group and
//!    collect key shares. The first failure aborts the whole call.
//! 3. Decrypt sequentially in input order, writing each record's content.
//!    The first failure aborts; records already written keep their content.
//!
//! A call that gets through all three phases bumps the reload counter.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use inkwell_core::batch::plan_batches;
use inkwell_core::policy::build_policy_proof;
use inkwell_core::{
    EncryptedObject, ObjectId, OwnerPolicy, PolicyCall, PolicyProof, SessionCredential,
    SubscriberPolicy, KEY_BATCH_SIZE, KEY_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BatchError, DecryptionError};
use crate::fetch::AggregatorPool;
use crate::threshold::ThresholdKeyClient;

/// Where an encrypted file lives on the blob network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlobRef {
    pub content_id: String,
    /// Content-addressed blob key, unrelated to the object id inside.
    pub fetch_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDecryptionRecord {
    pub file_id: String,
    pub blob_ref: EncryptedBlobRef,
    /// Set once the file decrypts.
    #[serde(default)]
    pub content: Option<String>,
}

impl FileDecryptionRecord {
    pub fn new(file_id: impl Into<String>, blob_ref: EncryptedBlobRef) -> Self {
        Self {
            file_id: file_id.into(),
            blob_ref,
            content: None,
        }
    }
}

#[derive(Debug)]
pub struct DecryptionOutcome {
    pub files: Vec<FileDecryptionRecord>,
    pub error: Option<BatchError>,
    /// Reload counter after this call.
    pub reload: u64,
}

impl DecryptionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The reader's relationship to a collection, which picks the policy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Owner {
        owner_cap_id: String,
    },
    Subscriber {
        subscription_cap_id: String,
        payment_method_id: String,
    },
}

impl Role {
    pub fn policy(&self, package_id: &str, collection_id: &str) -> Box<dyn PolicyCall> {
        match self {
            Role::Owner { owner_cap_id } => Box::new(OwnerPolicy {
                package: package_id.to_string(),
                owner_cap_id: owner_cap_id.clone(),
                collection_id: collection_id.to_string(),
            }),
            Role::Subscriber {
                subscription_cap_id,
                payment_method_id,
            } => Box::new(SubscriberPolicy {
                package: package_id.to_string(),
                subscription_cap_id: subscription_cap_id.clone(),
                collection_id: collection_id.to_string(),
                payment_method_id: payment_method_id.clone(),
            }),
        }
    }
}

pub struct Orchestrator {
    pool: AggregatorPool,
    keys: ThresholdKeyClient,
    reload: AtomicU64,
}

/// A fetched blob and the index of the record it belongs to.
struct Downloaded {
    file_index: usize,
    bytes: Vec<u8>,
}

impl Orchestrator {
    pub fn new(pool: AggregatorPool, keys: ThresholdKeyClient) -> Self {
        Self {
            pool,
            keys,
            reload: AtomicU64::new(0),
        }
    }

    pub fn key_client(&self) -> &ThresholdKeyClient {
        &self.keys
    }

    pub fn reload_counter(&self) -> u64 {
        self.reload.load(Ordering::SeqCst)
    }

    pub async fn decrypt_all(
        &self,
        mut files: Vec<FileDecryptionRecord>,
        credential: &SessionCredential,
        policy: &dyn PolicyCall,
    ) -> DecryptionOutcome {
        // ── Phase 1: fetch ─────────────────────────────────────────────
        let fetch_keys: Vec<String> = files
            .iter()
            .map(|f| f.blob_ref.fetch_key.clone())
            .collect();
        let results = self.pool.fetch_all(&fetch_keys).await;

        let mut downloaded = Vec::with_capacity(files.len());
        for (file_index, result) in results.into_iter().enumerate() {
            match result {
                Ok(bytes) => downloaded.push(Downloaded { file_index, bytes }),
                Err(e) => warn!(file_id = %files[file_index].file_id, error = %e, "skipping file"),
            }
        }
        if downloaded.is_empty() {
            return self.abort(files, BatchError::AllFetchesFailed);
        }
        info!(
            fetched = downloaded.len(),
            requested = files.len(),
            "blobs fetched"
        );

        // ── Phase 2: key shares ────────────────────────────────────────
        let mut batches: Vec<(Range<usize>, PolicyProof)> = Vec::new();
        for range in plan_batches(downloaded.len(), KEY_BATCH_SIZE) {
            let mut ids: Vec<ObjectId> = Vec::with_capacity(range.len());
            for item in &downloaded[range.clone()] {
                match EncryptedObject::parse(&item.bytes) {
                    Ok(object) => ids.push(object.id),
                    Err(e) => {
                        warn!(file_id = %files[item.file_index].file_id, error = %e, "unparseable ciphertext");
                        return self.abort(files, DecryptionError::from(e).into());
                    }
                }
            }

            let proof = build_policy_proof(policy, &ids);
            debug!(batch = ?range, ids = ids.len(), "requesting key shares");
            if let Err(e) = self
                .keys
                .fetch_key_shares(&ids, &proof, credential, KEY_THRESHOLD)
                .await
            {
                return self.abort(files, e.into());
            }
            batches.push((range, proof));
        }

        // ── Phase 3: decrypt ───────────────────────────────────────────
        for (range, proof) in &batches {
            for item in &downloaded[range.clone()] {
                match self.keys.decrypt(&item.bytes, credential, proof) {
                    Ok(plaintext) => {
                        files[item.file_index].content =
                            Some(String::from_utf8_lossy(&plaintext).into_owned());
                    }
                    Err(e) => {
                        warn!(file_id = %files[item.file_index].file_id, error = %e, "decryption failed");
                        return self.abort(files, e.into());
                    }
                }
            }
        }

        let reload = self.reload.fetch_add(1, Ordering::SeqCst) + 1;
        info!(decrypted = downloaded.len(), reload, "batch decrypted");
        DecryptionOutcome {
            files,
            error: None,
            reload,
        }
    }

    fn abort(&self, files: Vec<FileDecryptionRecord>, error: BatchError) -> DecryptionOutcome {
        warn!(error = %error, retryable = error.is_retryable(), "batch decryption aborted");
        DecryptionOutcome {
            files,
            error: Some(error),
            reload: self.reload_counter(),
        }
    }
}
