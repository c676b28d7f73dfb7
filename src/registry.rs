//! Driver factory table
//!
//! The hosting process instantiates chargers by name. Instead of a
//! process-wide registry mutated at load time, the host constructs a
//! [`DriverRegistry`], registers the factories it wants available, and passes
//! it wherever drivers are created.

use crate::bus::SharedBus;
use crate::charger::ChargerHandle;
use crate::config::ChargerConfig;
use crate::error::{ElektraError, Result};
use crate::logging::{StructuredLogger, get_logger};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by charger factories
pub type FactoryFuture = Pin<Box<dyn Future<Output = Result<ChargerHandle>> + Send>>;

/// Async factory producing a charger from the shared bus and its config
pub type ChargerFactory = Box<dyn Fn(SharedBus, ChargerConfig) -> FactoryFuture + Send + Sync>;

/// Explicit name-to-factory table owned by the hosting process
pub struct DriverRegistry {
    factories: HashMap<String, ChargerFactory>,
    logger: StructuredLogger,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            logger: get_logger("registry"),
        }
    }

    /// Create a registry with the built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add("warp2", |bus, config| {
            Box::pin(async move { ChargerHandle::attach(bus, &config).await })
        });
        // deprecated alias
        registry.add("warp-fw2", |bus, config| {
            Box::pin(async move { ChargerHandle::attach(bus, &config).await })
        });
        registry
    }

    /// Register a factory under a driver name, replacing any previous entry
    pub fn add<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(SharedBus, ChargerConfig) -> FactoryFuture + Send + Sync + 'static,
    {
        if self.factories.insert(name.to_string(), Box::new(factory)).is_some() {
            self.logger
                .warn(&format!("Replacing driver factory: {}", name));
        }
    }

    /// Registered driver names
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate a charger by driver name
    pub async fn create(
        &self,
        name: &str,
        bus: SharedBus,
        config: ChargerConfig,
    ) -> Result<ChargerHandle> {
        let factory = self.factories.get(name).ok_or_else(|| {
            ElektraError::validation("driver", &format!("unknown driver: {}", name))
        })?;

        self.logger
            .debug(&format!("Creating charger with driver {}", name));
        factory(bus, config).await
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults_registers_vendor_driver() {
        let registry = DriverRegistry::with_defaults();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["warp-fw2", "warp2"]);
    }

    #[test]
    fn test_empty_registry_has_no_names() {
        let registry = DriverRegistry::new();
        assert!(registry.names().is_empty());
    }
}
