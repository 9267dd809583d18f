//! Engine configuration.
//!
//! Everything has a default, so `EngineConfig::default()` talks to devnet.
//! Overrides come from JSON ([`EngineConfig::from_json`]) or the
//! environment ([`EngineConfig::from_env`]).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chain_sol::Pubkey;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::network::Commitment;

pub const ENV_CLUSTER: &str = "TOKEN_CLUSTER";
pub const ENV_RPC_URL: &str = "TOKEN_RPC_URL";

const EXPLORER_BASE: &str = "https://explorer.solana.com";

/// Network the engine talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
    Localnet,
}

impl Cluster {
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
        }
    }

    /// Value of the explorer's `cluster=` query parameter.
    pub fn explorer_param(&self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Localnet => "custom",
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Cluster::MainnetBeta)
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.explorer_param())
    }
}

impl FromStr for Cluster {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet" | "mainnet-beta" => Ok(Cluster::MainnetBeta),
            "localnet" | "localhost" | "custom" => Ok(Cluster::Localnet),
            other => Err(TokenError::validation(
                "cluster",
                format!("unknown cluster '{other}'"),
            )),
        }
    }
}

/// Bounds on confirmation polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            poll_interval_ms: 1_000,
            timeout_ms: 60_000,
        }
    }
}

impl ConfirmationPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cluster: Cluster,
    /// Overrides the cluster's public endpoint.
    pub rpc_url: Option<String>,
    pub commitment: Commitment,
    pub confirmation: ConfirmationPolicy,
    pub history_page_size: usize,
    /// Native balance below which callers should warn that fees may fail.
    pub min_fee_budget_lamports: u64,
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster: Cluster::default(),
            rpc_url: None,
            commitment: Commitment::Confirmed,
            confirmation: ConfirmationPolicy::default(),
            history_page_size: 20,
            min_fee_budget_lamports: 2_000_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn for_cluster(cluster: Cluster) -> Self {
        Self {
            cluster,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TokenError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TokenError::validation("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `TOKEN_CLUSTER` and `TOKEN_RPC_URL`.
    pub fn from_env() -> Result<Self, TokenError> {
        let mut config = Self::default();
        if let Ok(cluster) = std::env::var(ENV_CLUSTER) {
            config.cluster = cluster.parse()?;
        }
        if let Ok(url) = std::env::var(ENV_RPC_URL) {
            if !url.trim().is_empty() {
                config.rpc_url = Some(url);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if let Some(url) = &self.rpc_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(TokenError::validation(
                    "config",
                    format!("rpc_url must be http(s), got '{url}'"),
                ));
            }
        }
        if self.confirmation.max_attempts == 0 {
            return Err(TokenError::validation(
                "config",
                "confirmation.max_attempts must be > 0",
            ));
        }
        if self.history_page_size == 0 {
            return Err(TokenError::validation(
                "config",
                "history_page_size must be > 0",
            ));
        }
        Ok(())
    }

    pub fn rpc_endpoint(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.cluster.default_rpc_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn explorer_address_url(&self, address: &Pubkey) -> String {
        format!(
            "{EXPLORER_BASE}/address/{address}?cluster={}",
            self.cluster.explorer_param()
        )
    }

    pub fn explorer_tx_url(&self, signature: &str) -> String {
        format!(
            "{EXPLORER_BASE}/tx/{signature}?cluster={}",
            self.cluster.explorer_param()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_devnet() {
        let config = EngineConfig::default();
        assert_eq!(config.cluster, Cluster::Devnet);
        assert_eq!(config.rpc_endpoint(), "https://api.devnet.solana.com");
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.history_page_size, 20);
        assert_eq!(config.min_fee_budget_lamports, 2_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rpc_url_override_wins() {
        let config = EngineConfig {
            rpc_url: Some("http://localhost:9000".into()),
            ..EngineConfig::for_cluster(Cluster::Testnet)
        };
        assert_eq!(config.rpc_endpoint(), "http://localhost:9000");
    }

    #[test]
    fn cluster_parsing() {
        assert_eq!("devnet".parse::<Cluster>().unwrap(), Cluster::Devnet);
        assert_eq!("Mainnet-Beta".parse::<Cluster>().unwrap(), Cluster::MainnetBeta);
        assert_eq!("localhost".parse::<Cluster>().unwrap(), Cluster::Localnet);
        assert!("moonnet".parse::<Cluster>().is_err());
    }

    #[test]
    fn from_json_fills_defaults() {
        let config =
            EngineConfig::from_json(r#"{"cluster":"mainnet-beta","confirmation":{"max_attempts":5}}"#)
                .unwrap();
        assert_eq!(config.cluster, Cluster::MainnetBeta);
        assert_eq!(config.confirmation.max_attempts, 5);
        assert_eq!(config.confirmation.poll_interval_ms, 1_000);
        assert_eq!(config.history_page_size, 20);
    }

    #[test]
    fn from_json_rejects_invalid_values() {
        let err = EngineConfig::from_json(r#"{"history_page_size":0}"#).unwrap_err();
        assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "config"));

        assert!(EngineConfig::from_json(r#"{"rpc_url":"ftp://nope"}"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn explorer_urls() {
        let config = EngineConfig::default();
        let mint = Pubkey::new([0u8; 32]);
        assert_eq!(
            config.explorer_address_url(&mint),
            "https://explorer.solana.com/address/11111111111111111111111111111111?cluster=devnet"
        );
        assert_eq!(
            config.explorer_tx_url("5abc"),
            "https://explorer.solana.com/tx/5abc?cluster=devnet"
        );
    }
}
