//! Client configuration, loaded from a JSON file. Missing fields fall back to
//! the public aggregator list and the default timeouts and session TTL.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bls12_381::G2Projective;
use inkwell_core::ibe;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fetch::AggregatorPool;
use crate::key_server::HttpKeyServer;
use crate::threshold::{KeyServerHandle, ThresholdKeyClient};

/// Public testnet aggregators, tried in this order.
pub const DEFAULT_AGGREGATORS: &[&str] = &[
    "https://aggregator.walrus-testnet.walrus.space",
    "https://wal-aggregator-testnet.staketab.org",
    "https://walrus-testnet-aggregator.redundex.com",
    "https://walrus-testnet-aggregator.nodes.guru",
    "https://aggregator.walrus.banansen.dev",
    "https://walrus-testnet-aggregator.everstake.one",
    "https://walrus-testnet.blockscope.net",
    "https://walrus-testnet-aggregator.nodeinfra.com",
    "https://walrus-testnet-aggregator.stakin-nodes.com",
    "https://testnet-aggregator-walrus.kiliglab.io",
    "https://walrus-cache-testnet.overclock.run",
    "https://sui-walrus-testnet.bwarelabs.com/aggregator",
    "https://walrus-testnet-aggregator.chainbase.online",
    "https://walrus-testnet-aggregator.starduststaking.com",
    "https://walrus-testnet-aggregator-1.zkv.xyz",
    "https://walrus-testnet-aggregator.trusted-point.com",
    "https://walrus-testnet-aggregator.rubynodes.io",
    "https://walrus-testnet-aggregator.natsai.xyz",
    "https://walrus-tn.juicystake.io:9443",
    "https://walrus-agg-testnet.chainode.tech:9002",
    "https://walrus-testnet-aggregator.brightlystake.com",
    "https://aggregator.testnet.walrus.atalma.io",
];

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_TTL_MINUTES: u16 = 10;

/// One key server as seen by readers and encryptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerConfig {
    pub server_id: String,
    /// Base URL, e.g. `http://127.0.0.1:8700`.
    pub url: String,
    /// Compressed G2 master public key, hex (96 bytes).
    pub public_key: String,
}

impl KeyServerConfig {
    pub fn decode_public_key(&self) -> Result<G2Projective, ConfigError> {
        let bytes = hex::decode(&self.public_key).map_err(|e| ConfigError::InvalidPublicKey {
            server_id: self.server_id.clone(),
            reason: e.to_string(),
        })?;
        ibe::deserialize_public_key(&bytes).ok_or_else(|| ConfigError::InvalidPublicKey {
            server_id: self.server_id.clone(),
            reason: "not a compressed G2 point".into(),
        })
    }
}

/// Client configuration, loaded from a JSON file. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Content package the session credential is scoped to.
    pub package_id: String,
    pub aggregators: Vec<String>,
    pub fetch_timeout_secs: u64,
    pub key_servers: Vec<KeyServerConfig>,
    pub request_timeout_secs: u64,
    pub session_ttl_minutes: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            package_id: String::new(),
            aggregators: DEFAULT_AGGREGATORS.iter().map(|s| s.to_string()).collect(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            key_servers: Vec::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn aggregator_pool(&self) -> AggregatorPool {
        AggregatorPool::new(self.aggregators.clone(), self.fetch_timeout())
    }

    /// HTTP handles for every configured key server.
    pub fn key_server_handles(&self) -> Result<Vec<KeyServerHandle>, ConfigError> {
        self.key_servers
            .iter()
            .map(|ks| {
                let transport = HttpKeyServer::new(&ks.url, self.request_timeout())?;
                Ok(KeyServerHandle {
                    id: ks.server_id.clone(),
                    public_key: ks.decode_public_key()?,
                    transport: Arc::new(transport),
                })
            })
            .collect()
    }

    pub fn threshold_client(&self) -> Result<ThresholdKeyClient, ConfigError> {
        Ok(ThresholdKeyClient::new(self.key_server_handles()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_public_aggregators() {
        let config = ClientConfig::default();
        assert!(config.aggregators.len() >= 20);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{ "package_id": "0xpkg", "aggregators": ["http://127.0.0.1:9000"] }"#,
        )
        .unwrap();
        assert_eq!(config.package_id, "0xpkg");
        assert_eq!(config.aggregators, vec!["http://127.0.0.1:9000"]);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.session_ttl_minutes, DEFAULT_SESSION_TTL_MINUTES);
    }

    #[test]
    fn test_key_server_public_key_decoding() {
        let master = ibe::keygen_from_seed(&[3; 32]);
        let good = KeyServerConfig {
            server_id: "ks-0".into(),
            url: "http://127.0.0.1:1".into(),
            public_key: hex::encode(ibe::serialize_public_key(&master.pk)),
        };
        assert_eq!(good.decode_public_key().unwrap(), master.pk);

        let bad = KeyServerConfig {
            public_key: "00".repeat(96),
            ..good
        };
        assert!(matches!(
            bad.decode_public_key(),
            Err(ConfigError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ClientConfig::load("/nonexistent/inkwell.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
