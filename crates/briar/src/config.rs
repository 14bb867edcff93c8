//! Engine configuration and the transport registration list.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use briar_core::TransportId;
use briar_sync::SyncConfig;

use crate::error::Result;

/// Direction a transport can carry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A continuous bidirectional channel, e.g. a live socket.
    Duplex,
    /// One direction per connection, e.g. removable media.
    Simplex,
}

/// One entry in the transport registration list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    pub id: TransportId,
    pub kind: TransportKind,
    /// Longest time data can spend in transit, in milliseconds.
    pub max_latency_ms: u64,
}

impl TransportDescriptor {
    pub fn duplex(id: TransportId, max_latency_ms: u64) -> Self {
        Self {
            id,
            kind: TransportKind::Duplex,
            max_latency_ms,
        }
    }

    pub fn simplex(id: TransportId, max_latency_ms: u64) -> Self {
        Self {
            id,
            kind: TransportKind::Simplex,
            max_latency_ms,
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session tuning.
    pub sync: SyncConfig,
    /// Transports sessions may be started on.
    pub transports: Vec<TransportDescriptor>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing engine config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config = EngineConfig::from_json(
            r#"{
                "sync": { "max_batch_length": 1024 },
                "transports": [
                    { "id": "tcp", "kind": "duplex", "max_latency_ms": 30000 },
                    { "id": "file", "kind": "simplex", "max_latency_ms": 1209600000 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.sync.max_batch_length, 1024);
        assert_eq!(config.sync.verification_concurrency, 4);
        assert_eq!(
            config.transports,
            vec![
                TransportDescriptor::duplex(TransportId::new("tcp").unwrap(), 30_000),
                TransportDescriptor::simplex(TransportId::new("file").unwrap(), 1_209_600_000),
            ]
        );
    }

    #[test]
    fn test_empty_transport_id_is_rejected() {
        let result = EngineConfig::from_json(
            r#"{ "transports": [ { "id": "", "kind": "duplex", "max_latency_ms": 1 } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = EngineConfig::load("/nonexistent/briar.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/briar.json"));
    }
}
