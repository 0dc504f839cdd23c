//! Shared fixtures: localhost aggregator mirrors, a key-server quorum behind
//! the real router, and a reader wallet registered as owner and subscriber.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use inkwell_client::key_server::KeyServerError;
use inkwell_client::registry::{OwnerCap, PaymentMethod, Subscription};
use inkwell_client::wire::{FetchKeyRequest, FetchKeyResponse};
use inkwell_client::{
    CapabilityRegistry, HttpKeyServer, InMemoryPolicy, KeyServer, KeyServerHandle, KeyService,
    LocalWallet, SessionManager, Wallet,
};
use inkwell_core::object::{self, EncryptedObject, ServicePublicKey};
use inkwell_core::{ibe, ObjectId, OwnerPolicy, SessionCredential, SubscriberPolicy, KEY_THRESHOLD};

pub const PACKAGE: &str = "0x9a11e7";
pub const COLLECTION: &str = "0xc0ffee";
pub const OWNER_CAP: &str = "0x0c01";
pub const SUBSCRIPTION: &str = "0x5b01";
pub const PAYMENT_METHOD: &str = "0x9a01";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A localhost URL with nothing listening behind it.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ── Aggregator mirrors ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub enum MirrorMode {
    Serve,
    Fail,
    Hang,
}

#[derive(Clone)]
struct MirrorState {
    blobs: Arc<HashMap<String, Vec<u8>>>,
    hits: Arc<AtomicUsize>,
    mode: MirrorMode,
}

pub struct Mirror {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl Mirror {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn mirror(blobs: HashMap<String, Vec<u8>>, mode: MirrorMode) -> Mirror {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = MirrorState {
        blobs: Arc::new(blobs),
        hits: hits.clone(),
        mode,
    };
    let router = Router::new()
        .route("/v1/blobs/{key}", get(blob_handler))
        .with_state(state);
    Mirror {
        url: serve(router).await,
        hits,
    }
}

async fn blob_handler(
    State(state): State<MirrorState>,
    Path(key): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match state.mode {
        MirrorMode::Fail => Err(StatusCode::INTERNAL_SERVER_ERROR),
        MirrorMode::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        MirrorMode::Serve => state.blobs.get(&key).cloned().ok_or(StatusCode::NOT_FOUND),
    }
}

// ── Reader ─────────────────────────────────────────────────────────────

pub fn reader() -> LocalWallet {
    LocalWallet::from_seed([0x42; 32])
}

pub fn credential(wallet: &LocalWallet) -> SessionCredential {
    SessionManager::new(PACKAGE, 10)
        .credential_for(wallet)
        .unwrap()
        .clone()
}

/// Registry where `owner` holds the owner cap, an active subscription and a
/// payment method for [`COLLECTION`].
pub fn registry_for(owner: &str) -> CapabilityRegistry {
    CapabilityRegistry {
        owner_caps: vec![OwnerCap {
            id: OWNER_CAP.into(),
            owner: owner.into(),
            collection_id: COLLECTION.into(),
        }],
        subscriptions: vec![Subscription {
            id: SUBSCRIPTION.into(),
            owner: owner.into(),
            collection_id: COLLECTION.into(),
            expires_at: i64::MAX,
        }],
        payment_methods: vec![PaymentMethod {
            id: PAYMENT_METHOD.into(),
            owner: owner.into(),
        }],
    }
}

pub fn owner_policy() -> OwnerPolicy {
    OwnerPolicy {
        package: PACKAGE.into(),
        owner_cap_id: OWNER_CAP.into(),
        collection_id: COLLECTION.into(),
    }
}

pub fn subscriber_policy() -> SubscriberPolicy {
    SubscriberPolicy {
        package: PACKAGE.into(),
        subscription_cap_id: SUBSCRIPTION.into(),
        collection_id: COLLECTION.into(),
        payment_method_id: PAYMENT_METHOD.into(),
    }
}

pub fn new_id() -> ObjectId {
    ObjectId::for_collection(COLLECTION).unwrap()
}

// ── Key servers ────────────────────────────────────────────────────────

pub struct Quorum {
    pub services: Vec<Arc<KeyService>>,
    pub urls: Vec<String>,
}

/// `n` key servers behind the real router, all enforcing `registry`.
pub async fn start_quorum(n: u8, registry: CapabilityRegistry) -> Quorum {
    let mut services = Vec::new();
    let mut urls = Vec::new();
    for i in 0..n {
        let service = Arc::new(KeyService::new(
            format!("ks-{i}"),
            PACKAGE,
            ibe::keygen_from_seed(&[i + 1; 32]),
            Arc::new(InMemoryPolicy::new(PACKAGE, registry.clone())),
        ));
        let (addr, _) = inkwell_client::server::spawn("127.0.0.1:0".parse().unwrap(), service.clone())
            .await
            .unwrap();
        services.push(service);
        urls.push(format!("http://{addr}"));
    }
    Quorum { services, urls }
}

impl Quorum {
    pub fn public_keys(&self) -> Vec<ServicePublicKey> {
        self.services
            .iter()
            .map(|s| ServicePublicKey {
                server_id: s.server_id().to_string(),
                public_key: s.public_key(),
            })
            .collect()
    }

    pub fn http_handles(&self) -> Vec<KeyServerHandle> {
        self.services
            .iter()
            .zip(&self.urls)
            .map(|(service, url)| KeyServerHandle {
                id: service.server_id().to_string(),
                public_key: service.public_key(),
                transport: Arc::new(HttpKeyServer::new(url, Duration::from_secs(5)).unwrap()),
            })
            .collect()
    }

    /// In-process handles whose transports record every batch they receive.
    pub fn counting_handles(&self) -> (Vec<KeyServerHandle>, Vec<Arc<CountingKeyServer>>) {
        let counters: Vec<Arc<CountingKeyServer>> = self
            .services
            .iter()
            .map(|s| Arc::new(CountingKeyServer::new(s.clone())))
            .collect();
        let handles = self
            .services
            .iter()
            .zip(&counters)
            .map(|(service, counter)| KeyServerHandle {
                id: service.server_id().to_string(),
                public_key: service.public_key(),
                transport: counter.clone(),
            })
            .collect();
        (handles, counters)
    }

    pub fn seal_object(&self, id: &ObjectId, body: &str) -> EncryptedObject {
        object::seal(PACKAGE, id.clone(), KEY_THRESHOLD, &self.public_keys(), body.as_bytes())
            .unwrap()
    }

    pub fn seal(&self, id: &ObjectId, body: &str) -> Vec<u8> {
        self.seal_object(id, body).to_bytes()
    }
}

pub struct CountingKeyServer {
    inner: Arc<dyn KeyServer>,
    batches: Mutex<Vec<usize>>,
}

impl CountingKeyServer {
    pub fn new(inner: Arc<dyn KeyServer>) -> Self {
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Number of ids in each request received, in order.
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyServer for CountingKeyServer {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError> {
        self.batches.lock().unwrap().push(request.ids.len());
        self.inner.fetch_key(request).await
    }
}

/// Wallet that counts how often it is asked to sign.
pub struct CountingWallet {
    pub inner: LocalWallet,
    signs: AtomicUsize,
}

impl CountingWallet {
    pub fn new(inner: LocalWallet) -> Self {
        Self {
            inner,
            signs: AtomicUsize::new(0),
        }
    }

    pub fn signs(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }
}

impl Wallet for CountingWallet {
    fn address(&self) -> String {
        self.inner.address()
    }

    fn sign_message(&self, message: &[u8]) -> anyhow::Result<inkwell_core::WalletSignature> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_message(message)
    }
}
