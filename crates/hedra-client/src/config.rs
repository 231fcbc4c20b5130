//! Client configuration.
//!
//! [`ExecutionConfig`] drives the attempt loop, [`RequestOverrides`] lets a
//! single transaction or query replace parts of it, and [`ClientConfig`] is
//! the JSON document a [`Client`](crate::Client) can be built from.

use hedra_common::{AccountId, HedraError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// What the engine does when the node it is about to use is backing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhealthyNodePolicy {
    /// Wait for the selected node to leave its backoff window, then use it.
    /// The wait does not consume an attempt.
    #[default]
    WaitForNode,
    /// Move on to the next healthy candidate; only wait (for the candidate
    /// closest to recovery) when none is healthy.
    SkipUnhealthy,
}

/// Attempt loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Attempt counter ceiling
    ///
    /// The counter starts at 1 and execution fails once it reaches this value.
    /// Default: 10
    pub max_attempts: u32,
    /// Lower bound of every busy-status backoff
    ///
    /// Default: 250ms
    pub min_backoff: Duration,
    /// Upper bound of every busy-status backoff
    ///
    /// Default: 8s
    pub max_backoff: Duration,
    /// Base of the exponential busy-status backoff
    ///
    /// Attempt `n` waits `base_backoff * 2^(n-1)` before being clamped.
    /// Default: 250ms
    pub base_backoff: Duration,
    pub unhealthy_node_policy: UnhealthyNodePolicy,
    /// Per-call timeout handed to channels opened by the client
    ///
    /// Default: 10s
    pub request_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
            base_backoff: Duration::from_millis(250),
            unhealthy_node_policy: UnhealthyNodePolicy::WaitForNode,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ExecutionConfig {
    /// Delay before retrying after a busy status on `attempt` (1-based):
    /// `max(min_backoff, base_backoff * 2^(attempt-1))`, capped at
    /// `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let grown = self.base_backoff.saturating_mul(1u32 << exponent);
        grown.max(self.min_backoff).min(self.max_backoff)
    }
}

/// Per-request replacements for the client's [`ExecutionConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub max_attempts: Option<u32>,
    pub min_backoff: Option<Duration>,
    pub max_backoff: Option<Duration>,
}

impl RequestOverrides {
    pub fn apply(&self, mut config: ExecutionConfig) -> ExecutionConfig {
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(min_backoff) = self.min_backoff {
            config.min_backoff = min_backoff;
        }
        if let Some(max_backoff) = self.max_backoff {
            config.max_backoff = max_backoff;
        }
        config
    }
}

/// Operator credentials as they appear in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    pub account_id: String,
    /// Hex ed25519 private key, raw 32-byte seed or DER encoded.
    pub private_key: String,
}

/// Consensus network: a preset name or an `address -> account` map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NetworkConfig {
    Name(String),
    Addresses(HashMap<String, String>),
}

/// Mirror network: a preset name or a list of endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MirrorNetworkConfig {
    Name(String),
    Addresses(Vec<String>),
}

/// Client configuration document.
///
/// ```json
/// {
///   "operator": { "accountId": "0.0.2", "privateKey": "<hex>" },
///   "network": { "127.0.0.1:50211": "0.0.3" },
///   "mirrorNetwork": "testnet"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub operator: Option<OperatorConfig>,
    pub network: NetworkConfig,
    #[serde(default)]
    pub mirror_network: Option<MirrorNetworkConfig>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parses the account side of an `address -> account` network map.
    pub fn network_addresses(map: &HashMap<String, String>) -> Result<Vec<(String, AccountId)>> {
        map.iter()
            .map(|(address, account)| {
                let account = account.parse::<AccountId>().map_err(|_| {
                    HedraError::InvalidConfig(format!(
                        "invalid node account `{}` for `{}`",
                        account, address
                    ))
                })?;
                Ok((address.clone(), account))
            })
            .collect()
    }
}
