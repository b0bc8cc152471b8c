//! Resource attribute registry: the sorted, deduplicated attribute set
//! describing this process, copied into every batch at creation.

use crate::config::Configuration;
use crate::event::AttributeValue;
use std::sync::Arc;

/// Capacity of the resource attribute set.
pub const RESOURCE_MAX_ATTRIBUTES: usize = 128;

/// Mutable registry of resource attributes.
///
/// The backing vector stays sorted by key: lookup is a binary search, and
/// insertion keeps order, giving deterministic output ordering on export.
/// Once the cap is reached, new distinct keys are rejected and counted;
/// overwriting an existing key always succeeds.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    attributes: Vec<(String, AttributeValue)>,
    dropped: u32,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from the host configuration.
    ///
    /// `service.name` is set first so it cannot be dropped by the cap, user
    /// attributes follow, and the SDK identity keys are asserted last so
    /// user-supplied attributes cannot shadow them.
    pub fn from_config(config: &Configuration) -> Self {
        let mut registry = Self::new();
        registry.load(config);
        registry
    }

    /// Replaces the registry contents from a (re)loaded configuration.
    pub fn load(&mut self, config: &Configuration) {
        self.attributes.clear();
        self.dropped = 0;

        self.set("service.name", config.service_name.as_str());

        for (key, value) in &config.resource_attributes {
            self.set(key.clone(), value.clone());
        }

        // Asserted last: these always win over user attributes.
        self.set("service.name", config.service_name.as_str());
        self.set("telemetry.sdk.name", crate::LIBRARY);
        self.set("telemetry.sdk.version", crate::VERSION);
    }

    /// Inserts or overwrites one attribute.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        match self.attributes.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(found) => self.attributes[found].1 = value.into(),
            Err(insert_at) if self.attributes.len() < RESOURCE_MAX_ATTRIBUTES => {
                self.attributes.insert(insert_at, (key, value.into()));
            }
            Err(_) => self.dropped += 1,
        }
    }

    /// Looks up an attribute by key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|found| &self.attributes[found].1)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Count of distinct keys rejected by the cap.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// An immutable copy for embedding into a new batch. Later `set` calls
    /// do not affect snapshots already taken.
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            attributes: Arc::from(self.attributes.as_slice()),
            dropped: self.dropped,
        }
    }
}

/// Immutable resource attribute set attached to a batch.
///
/// Cloning is cheap (shared slice), and the contents never change after the
/// snapshot is taken, so batches remain exportable across configuration
/// reloads.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    attributes: Arc<[(String, AttributeValue)]>,
    dropped: u32,
}

impl ResourceSnapshot {
    /// Attributes sorted by key.
    pub fn attributes(&self) -> &[(String, AttributeValue)] {
        &self.attributes
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
