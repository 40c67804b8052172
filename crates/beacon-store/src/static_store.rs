//! Static announcements
//!
//! Operator-declared services with no expiration. The query layer unions
//! these with the dynamic set; the registry never writes them.

use beacon_common::config::StaticServiceConfig;
use beacon_common::Service;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Provider of operator-declared services.
pub trait StaticStore: Send + Sync {
    fn get_all(&self) -> HashSet<Service>;
    fn get(&self, service_type: &str) -> HashSet<Service>;
    fn get_in_pool(&self, service_type: &str, pool: &str) -> HashSet<Service>;
}

/// In-memory static store, seeded from configuration at startup.
#[derive(Default)]
pub struct MemoryStaticStore {
    services: RwLock<HashSet<Service>>,
}

impl MemoryStaticStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize the `[[static_service]]` entries of the config file.
    #[must_use]
    pub fn from_config(entries: &[StaticServiceConfig]) -> Self {
        let store = Self::new();
        {
            let mut services = store.services.write();
            for entry in entries {
                services.insert(entry.to_service());
            }
        }
        store
    }

    /// Add one service.
    pub fn put(&self, service: Service) {
        self.services.write().insert(service);
    }
}

impl StaticStore for MemoryStaticStore {
    fn get_all(&self) -> HashSet<Service> {
        self.services.read().clone()
    }

    fn get(&self, service_type: &str) -> HashSet<Service> {
        self.services
            .read()
            .iter()
            .filter(|service| service.service_type == service_type)
            .cloned()
            .collect()
    }

    fn get_in_pool(&self, service_type: &str, pool: &str) -> HashSet<Service> {
        self.services
            .read()
            .iter()
            .filter(|service| service.service_type == service_type && service.pool == pool)
            .cloned()
            .collect()
    }
}
