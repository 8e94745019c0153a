//! Device signals and integration / signal-provider payloads.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;

/// Named device signals (OS version, screen lock, disk encryption, ...).
pub type DeviceSignalSnapshot = Map<String, Value>;

/// Collects device signals on behalf of the engine.
#[async_trait]
pub trait SignalCollector: Send + Sync {
    /// Collect the signals named by the challenge. An empty list asks for the default set.
    async fn collect(&self, names: &[String]) -> Result<DeviceSignalSnapshot>;
}

/// Resolves integration and signal-provider payloads by name.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    async fn collect(&self, name: &str) -> std::result::Result<Value, String>;
}

/// Either the payload a provider produced or why it could not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderOutcome {
    Value(Value),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ProviderOutcome,
}

impl ProviderResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ProviderOutcome::Error(_))
    }
}

/// Resolve every name independently; one failing provider never blocks the rest.
pub async fn collect_providers(
    registry: &dyn ProviderRegistry,
    names: &[String],
) -> Vec<ProviderResult> {
    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let outcome = match registry.collect(name).await {
            Ok(value) => ProviderOutcome::Value(value),
            Err(error) => {
                warn!(provider = %name, error = %error, "Provider collection failed");
                ProviderOutcome::Error(error)
            }
        };
        results.push(ProviderResult {
            name: name.clone(),
            outcome,
        });
    }
    results
}

/// Signal collector serving a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticSignalCollector {
    signals: DeviceSignalSnapshot,
}

impl StaticSignalCollector {
    pub fn new(signals: DeviceSignalSnapshot) -> Self {
        Self { signals }
    }

    pub fn with_signal(mut self, name: impl Into<String>, value: Value) -> Self {
        self.signals.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl SignalCollector for StaticSignalCollector {
    async fn collect(&self, names: &[String]) -> Result<DeviceSignalSnapshot> {
        if names.is_empty() {
            return Ok(self.signals.clone());
        }
        Ok(self
            .signals
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}

/// Provider registry with canned results.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    providers: HashMap<String, std::result::Result<Value, String>>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.providers.insert(name.into(), Ok(value));
        self
    }

    pub fn with_error(mut self, name: impl Into<String>, error: impl Into<String>) -> Self {
        self.providers.insert(name.into(), Err(error.into()));
        self
    }
}

#[async_trait]
impl ProviderRegistry for StaticProviderRegistry {
    async fn collect(&self, name: &str) -> std::result::Result<Value, String> {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(format!("provider '{name}' is not registered")))
    }
}
