//! Core type definitions for Beacon
//!
//! This module defines the identifiers, service descriptors and
//! announcement payloads shared by the store and the HTTP layer.

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an announcing node
///
/// Generated by the announcer and stable across refreshes of the same
/// logical node. The registry never creates node identities, it only
/// reflects them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a new random node ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a declared service instance
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Generate a new random service ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A network-addressable service instance
///
/// `service_type` and `pool` are free-form tags used for query filtering;
/// `properties` carries endpoint URIs and arbitrary metadata. Properties use
/// an ordered map so equal descriptors hash equally regardless of insertion
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: ServiceId,
    pub node_id: NodeId,
    #[serde(rename = "type")]
    pub service_type: String,
    pub pool: String,
    pub location: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// One service declared inside a dynamic announcement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAnnouncement {
    pub id: ServiceId,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ServiceAnnouncement {
    /// Materialize a full descriptor using the announcing node's identity
    /// and the announcement-level location and pool.
    #[must_use]
    pub fn to_service(&self, node_id: NodeId, location: &str, pool: &str) -> Service {
        Service {
            id: self.id,
            node_id,
            service_type: self.service_type.clone(),
            pool: pool.to_string(),
            location: location.to_string(),
            properties: self.properties.clone(),
        }
    }
}

/// A node's transient declaration of the services it currently offers
///
/// Valid for the registry's configured TTL; nodes refresh by re-announcing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicAnnouncement {
    pub environment: String,
    pub location: String,
    pub pool: String,
    pub service_announcements: Vec<ServiceAnnouncement>,
}

impl DynamicAnnouncement {
    /// Materialize every declared service against the announcing node.
    #[must_use]
    pub fn to_services(&self, node_id: NodeId) -> Vec<Service> {
        self.service_announcements
            .iter()
            .map(|a| a.to_service(node_id, &self.location, &self.pool))
            .collect()
    }
}

/// Query response: the live service set tagged with the registry's
/// configured environment. The environment is a label, not a filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Services {
    pub environment: String,
    pub services: HashSet<Service>,
}

impl Services {
    #[must_use]
    pub fn new(environment: impl Into<String>, services: HashSet<Service>) -> Self {
        Self {
            environment: environment.into(),
            services,
        }
    }
}
