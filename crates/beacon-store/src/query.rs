//! Typed service queries
//!
//! Fuses the dynamic and static stores and tags every response with the
//! registry's configured environment.

use crate::dynamic::DynamicStore;
use crate::static_store::StaticStore;
use beacon_common::{Result, Services};
use std::sync::Arc;

/// Read-side composition of the two stores.
pub struct ServiceQuery {
    dynamic: Arc<DynamicStore>,
    statics: Arc<dyn StaticStore>,
    environment: String,
}

impl ServiceQuery {
    #[must_use]
    pub fn new(
        dynamic: Arc<DynamicStore>,
        statics: Arc<dyn StaticStore>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            dynamic,
            statics,
            environment: environment.into(),
        }
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Live services of one type, dynamic and static.
    pub async fn services(&self, service_type: &str) -> Result<Services> {
        let mut services = self.dynamic.get(service_type).await?;
        services.extend(self.statics.get(service_type));
        Ok(Services::new(self.environment.clone(), services))
    }

    /// Live services of one type within one pool, dynamic and static.
    pub async fn services_in_pool(&self, service_type: &str, pool: &str) -> Result<Services> {
        let mut services = self.dynamic.get_in_pool(service_type, pool).await?;
        services.extend(self.statics.get_in_pool(service_type, pool));
        Ok(Services::new(self.environment.clone(), services))
    }
}
