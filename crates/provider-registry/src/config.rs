use std::collections::HashMap;
use std::time::Duration;

use market_data_provider::Operation;

/// Per-provider rate and breaker tuning, plus the registry-wide retry
/// policy. Constructed by the CLI's config loader and handed to
/// `ProviderRegistry::new`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub preference: HashMap<Operation, Vec<String>>,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub retry_attempts: u32,
    pub base_backoff: Duration,
    pub max_jitter_pct: f64,
    pub acquire_deadline: Duration,
}

impl RegistryConfig {
    pub fn preference_for(&self, op: Operation) -> &[String] {
        self.preference.get(&op).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            preference: HashMap::new(),
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            retry_attempts: 2,
            base_backoff: Duration::from_millis(250),
            max_jitter_pct: 0.5,
            acquire_deadline: Duration::from_secs(10),
        }
    }
}
