#![allow(dead_code)]

//! Shared test fixtures: an in-memory bus with retained values,
//! publish recording, and publish-failure injection.

use async_trait::async_trait;
use elektra::bus::{BusClient, Subscription, SubscriptionFeed};
use elektra::config::ChargerConfig;
use elektra::error::{ElektraError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const TOPIC: &str = "warp";
pub const EM_TOPIC: &str = "em";

/// In-memory BusClient double
pub struct MemoryBus {
    feeds: Mutex<HashMap<String, SubscriptionFeed>>,
    published: Mutex<Vec<(String, String)>>,
    fail_publish: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            feeds: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
        })
    }

    fn feed_for(&self, topic: &str) -> SubscriptionFeed {
        self.feeds
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .clone()
    }

    /// Simulate a retained payload on a topic, as the device would publish it
    pub fn retain(&self, topic: &str, payload: &str) {
        self.feed_for(topic).push(payload);
    }

    /// Mark the charger as alive on its keepalive topic
    pub fn alive(&self) {
        self.retain(&format!("{}/evse/low_level_state", TOPIC), "{}");
    }

    /// All payloads published through the adapter, in order
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    /// Most recent payload published to a topic, if any
    pub fn last_published(&self, topic: &str) -> Option<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
    }

    /// Make subsequent publishes fail with a bus error
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ElektraError::bus("publish rejected"));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        Ok(self.feed_for(topic).subscribe(topic))
    }
}

/// Charger config pointed at the test bus, with a short window so
/// failure-path tests stay fast
pub fn charger_config() -> ChargerConfig {
    ChargerConfig {
        topic: TOPIC.to_string(),
        energy_manager: None,
        timeout_ms: 1000,
    }
}

/// Charger config with an energy manager root configured
pub fn charger_config_with_em() -> ChargerConfig {
    ChargerConfig {
        energy_manager: Some(EM_TOPIC.to_string()),
        ..charger_config()
    }
}
