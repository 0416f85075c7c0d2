use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::Protocol;

/// Electrum endpoint and client tuning.
///
/// The defaults point at Blockstream's public mainnet server over plain
/// TCP; production deployments should prefer `tls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrumConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Deadline for connect plus the `server.version` handshake.
    pub timeout_ms: u64,
    /// Extra connect attempts after the first failure.
    pub max_retry: u32,
    /// Pause between connect attempts.
    pub retry_period_ms: u64,
    /// Keep-alive ping interval while connected.
    pub ping_period_ms: u64,
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        Self {
            host: "electrum.blockstream.info".into(),
            port: 50001,
            protocol: Protocol::Tcp,
            timeout_ms: 15_000,
            max_retry: 2,
            retry_period_ms: 1_000,
            ping_period_ms: 120_000,
        }
    }
}

impl ElectrumConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }
}
