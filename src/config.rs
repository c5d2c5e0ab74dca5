//! Node configuration

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};

/// Behaviour a node was assigned at startup.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HonestyMode {
    Honest,
    Malicious,
}

impl Default for HonestyMode {
    fn default() -> Self {
        HonestyMode::Honest
    }
}

impl fmt::Display for HonestyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HonestyMode::Honest => f.write_str("honest"),
            HonestyMode::Malicious => f.write_str("malicious"),
        }
    }
}

impl FromStr for HonestyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "honest" | "1" => Ok(HonestyMode::Honest),
            "malicious" | "0" => Ok(HonestyMode::Malicious),
            other => Err(anyhow::anyhow!("unknown honesty mode {}", other)),
        }
    }
}

/// Constants of the validation protocol.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtocolParams {
    /// Validators asked to sign each entity
    #[serde(default = "default_signatures_threshold")]
    pub signatures_threshold: usize,
    /// Highest attempt index used while selecting validators
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    /// Transactions needed before a block is assembled
    #[serde(default = "default_tx_min")]
    pub tx_min: usize,
    #[serde(default = "default_validation_fee")]
    pub validation_fee: i64,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: i64,
    /// Length in bits of every name and hash
    #[serde(default = "default_name_bits")]
    pub name_bits: usize,
}

fn default_signatures_threshold() -> usize {
    5
}

fn default_alpha() -> usize {
    12
}

fn default_tx_min() -> usize {
    4
}

fn default_validation_fee() -> i64 {
    1
}

fn default_initial_balance() -> i64 {
    20
}

fn default_name_bits() -> usize {
    30
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            signatures_threshold: default_signatures_threshold(),
            alpha: default_alpha(),
            tx_min: default_tx_min(),
            validation_fee: default_validation_fee(),
            initial_balance: default_initial_balance(),
            name_bits: default_name_bits(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NodeConfig {
    /// Address other peers reach this node at
    pub address: String,
    /// Peer used to join the overlay; `None` founds a new one
    #[serde(default)]
    pub introducer: Option<String>,
    #[serde(default)]
    pub mode: HonestyMode,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Delegation budget carried by routed searches
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default)]
    pub protocol: ProtocolParams,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_max_hops() -> u32 {
    64
}

impl NodeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            introducer: None,
            mode: HonestyMode::default(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            max_hops: default_max_hops(),
            protocol: ProtocolParams::default(),
        }
    }

    pub fn with_introducer(mut self, introducer: impl Into<String>) -> Self {
        self.introducer = Some(introducer.into());
        self
    }

    pub fn with_mode(mut self, mode: HonestyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{ "address": "a", "mode": "malicious" }"#).unwrap();
        assert_eq!(config.mode, HonestyMode::Malicious);
        assert_eq!(config.introducer, None);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(config.protocol, ProtocolParams::default());
    }

    #[test]
    fn partial_protocol_section() {
        let config: NodeConfig =
            serde_json::from_str(r#"{ "address": "a", "protocol": { "tx_min": 2 } }"#).unwrap();
        assert_eq!(config.protocol.tx_min, 2);
        assert_eq!(config.protocol.signatures_threshold, 5);
        assert_eq!(config.protocol.name_bits, 30);
    }

    #[test]
    fn mode_parses_names_and_digits() {
        assert_eq!("1".parse::<HonestyMode>().unwrap(), HonestyMode::Honest);
        assert_eq!("Malicious".parse::<HonestyMode>().unwrap(), HonestyMode::Malicious);
        assert!("maybe".parse::<HonestyMode>().is_err());
    }
}
