//! Configuration for the distributed query execution core
//!
//! Every tunable has a default, so the crate works with an empty config
//! document; a host process is expected to deserialize this from whatever
//! layered-config format it already uses (TOML, YAML, ...).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    /// TLS configuration for the QUIC transport used by both consumed RPCs.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Background node-discovery polling.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// The executor (C3).
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tls: TlsConfig::default(),
            discovery: DiscoveryConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// TLS configuration for cluster-facing QUIC connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default = "default_tls_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    pub ca_cert_path: Option<PathBuf>,

    /// Skip peer certificate verification. INSECURE, development only.
    #[serde(default)]
    pub skip_verify: bool,
}

fn default_tls_enabled() -> bool {
    true
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("./conf/tls/cert.pem")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("./conf/tls/key.pem")
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: default_tls_enabled(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            ca_cert_path: None,
            skip_verify: false,
        }
    }
}

/// Background discovery loop (C2's node-discovery integration).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Poll cadence against C1's `list-nodes`. Spec nominal value: 30s.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-call deadline for the discovery loop's own C1 calls and dials.
    #[serde(default = "default_discovery_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_discovery_deadline_secs() -> u64 {
    5
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            deadline_secs: default_discovery_deadline_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Query executor (C3) tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Used when a caller invokes `execute-search`/`execute-count` without
    /// an explicit deadline. Resolves the open question in the design notes
    /// ("a conservative upper bound, single-digit seconds").
    #[serde(default = "default_fallback_deadline_secs")]
    pub default_deadline_secs: u64,
}

fn default_fallback_deadline_secs() -> u64 {
    5
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_deadline_secs: default_fallback_deadline_secs(),
        }
    }
}

impl ExecutorConfig {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_secs(self.default_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_empty_document() {
        let cfg: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.discovery.poll_interval_secs, 30);
        assert_eq!(cfg.executor.default_deadline_secs, 5);
        assert!(cfg.tls.enabled);
    }
}
