//! Configuration types for Beacon
//!
//! Loaded from a TOML file by `beacond`; CLI arguments take precedence over
//! file values, and every field has a sensible default.

use crate::types::{NodeId, Service, ServiceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for a beacond process
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry behavior
    pub discovery: DiscoveryConfig,
    /// Backing store selection
    pub store: StoreConfig,
    /// HTTP server
    pub server: ServerConfig,
    /// Logging
    pub logging: LoggingConfig,
    /// Operator-declared services with no expiration
    #[serde(rename = "static_service")]
    pub static_services: Vec<StaticServiceConfig>,
}

/// Registry behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Environment tag attached to query responses
    pub environment: String,
    /// TTL applied to every dynamic announcement, in milliseconds
    pub max_age_ms: u64,
    /// Backing-store keyspace name
    pub keyspace: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            environment: "general".to_string(),
            max_age_ms: 30_000,
            keyspace: "discovery".to_string(),
        }
    }
}

/// Which column-family implementation backs the dynamic store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Durable single-node store on disk
    #[default]
    Redb,
    /// Volatile in-process store (development and tests)
    Memory,
}

/// Backing store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding the keyspace files (redb backend)
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redb,
            data_dir: PathBuf::from("/var/lib/beacond"),
        }
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4111".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One operator-declared service
///
/// `id` and `node_id` may be omitted; missing identifiers are generated at
/// load time and stay stable for the lifetime of the process.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticServiceConfig {
    pub id: Option<ServiceId>,
    pub node_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub service_type: String,
    pub pool: String,
    pub location: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl StaticServiceConfig {
    /// Materialize a service descriptor, generating any missing identifiers.
    #[must_use]
    pub fn to_service(&self) -> Service {
        Service {
            id: self.id.unwrap_or_default(),
            node_id: self.node_id.unwrap_or_default(),
            service_type: self.service_type.clone(),
            pool: self.pool.clone(),
            location: self.location.clone(),
            properties: self.properties.clone(),
        }
    }
}
