//! Inkwell client: the networked half of threshold-encrypted content retrieval.
//!
//! - [`fetch`]: redundant blob download from aggregator mirrors
//! - [`threshold`]: key-share collection from a key-server quorum, local decryption
//! - [`orchestrator`]: all-or-nothing batch decryption of a file list
//! - [`wallet`]: the signing capability and session credential reuse
//! - [`key_server`], [`registry`], [`server`]: key-server transports, an
//!   off-chain policy and the HTTP router for running a key server
//! - [`config`]: JSON client configuration

pub mod config;
pub mod error;
pub mod fetch;
pub mod key_server;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod threshold;
pub mod wallet;
pub mod wire;

pub use config::{ClientConfig, KeyServerConfig};
pub use error::{BatchError, ConfigError, DecryptionError, FetchFailure, KeyAccessError};
pub use fetch::AggregatorPool;
pub use key_server::{HttpKeyServer, KeyServer, KeyServerError, KeyService, PolicyEvaluator};
pub use orchestrator::{
    DecryptionOutcome, EncryptedBlobRef, FileDecryptionRecord, Orchestrator, Role,
};
pub use registry::{CapabilityRegistry, InMemoryPolicy};
pub use threshold::{KeyServerHandle, ThresholdKeyClient};
pub use wallet::{LocalWallet, SessionManager, Wallet};
