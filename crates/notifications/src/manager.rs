use std::time::Duration;

use pmcc_core::ScanResults;
use provider_registry::CircuitBreaker;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::channel::{ChannelError, PrimaryChannel, SecondaryChannel};
use crate::format::{format_primary, format_secondary};

/// Resolves the two source notes in spec §9 disagreeing on fallback
/// semantics: `PrimaryOnly` never touches secondary, `Both` always sends
/// both regardless of primary's outcome, `PrimaryWithFallback` (the
/// default) only reaches for secondary when primary failed or its breaker
/// is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    PrimaryOnly,
    Both,
    PrimaryWithFallback,
}

impl Default for NotificationMode {
    fn default() -> Self {
        NotificationMode::PrimaryWithFallback
    }
}

#[derive(Debug, Clone)]
pub struct NotificationManagerConfig {
    pub mode: NotificationMode,
    pub fallback_delay: Duration,
    pub top_n_primary: usize,
    pub channel_failure_threshold: u32,
    pub channel_cooldown: Duration,
    pub retry_attempts: u32,
    pub retry_base_backoff: Duration,
}

impl Default for NotificationManagerConfig {
    fn default() -> Self {
        Self {
            mode: NotificationMode::default(),
            fallback_delay: Duration::from_secs(0),
            top_n_primary: 10,
            channel_failure_threshold: 5,
            channel_cooldown: Duration::from_secs(60),
            retry_attempts: 3,
            retry_base_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel_id: String,
    pub delivered: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationOutcome {
    pub primary: Option<ChannelOutcome>,
    pub secondary: Option<ChannelOutcome>,
    pub success: bool,
}

/// C9: delivers `ScanResults` over the configured channels with per-channel
/// circuit breakers and a one-step fallback policy. Each channel's breaker
/// uses the same state machine as the provider registry's (C1), just keyed
/// independently per notification channel rather than per data provider.
pub struct NotificationManager {
    primary: Option<Box<dyn PrimaryChannel>>,
    secondary: Option<Box<dyn SecondaryChannel>>,
    primary_breaker: Mutex<CircuitBreaker>,
    secondary_breaker: Mutex<CircuitBreaker>,
    config: NotificationManagerConfig,
}

impl NotificationManager {
    pub fn new(
        primary: Option<Box<dyn PrimaryChannel>>,
        secondary: Option<Box<dyn SecondaryChannel>>,
        config: NotificationManagerConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            primary_breaker: Mutex::new(CircuitBreaker::new(config.channel_failure_threshold, config.channel_cooldown)),
            secondary_breaker: Mutex::new(CircuitBreaker::new(config.channel_failure_threshold, config.channel_cooldown)),
            config,
        }
    }

    /// Delivers `results`. Returns `success = true` when at least one
    /// enabled channel acknowledged delivery, or when no channel is
    /// enabled at all (notifications disabled is not a scan failure).
    pub async fn notify(&self, results: &ScanResults) -> NotificationOutcome {
        if self.primary.is_none() && self.secondary.is_none() {
            return NotificationOutcome {
                primary: None,
                secondary: None,
                success: true,
            };
        }

        let mut outcome = NotificationOutcome::default();

        let primary_result = if let Some(channel) = &self.primary {
            let body = format_primary(results, self.config.top_n_primary);
            Some(self.send_primary(channel.as_ref(), &body).await)
        } else {
            None
        };
        let primary_delivered = primary_result.as_ref().map(|r| r.delivered).unwrap_or(false);
        outcome.primary = primary_result;

        let should_send_secondary = match self.config.mode {
            NotificationMode::PrimaryOnly => false,
            NotificationMode::Both => self.secondary.is_some(),
            NotificationMode::PrimaryWithFallback => self.secondary.is_some() && !primary_delivered,
        };

        if should_send_secondary {
            if self.config.mode == NotificationMode::PrimaryWithFallback && !self.config.fallback_delay.is_zero() {
                tokio::time::sleep(self.config.fallback_delay).await;
            }
            if let Some(channel) = &self.secondary {
                let payload = format_secondary(results);
                outcome.secondary = Some(self.send_secondary(channel.as_ref(), &payload).await);
            }
        }

        outcome.success = outcome.primary.as_ref().map(|r| r.delivered).unwrap_or(false)
            || outcome.secondary.as_ref().map(|r| r.delivered).unwrap_or(false);
        outcome
    }

    async fn send_primary(&self, channel: &dyn PrimaryChannel, body: &str) -> ChannelOutcome {
        {
            let mut breaker = self.primary_breaker.lock().await;
            if !breaker.allow_request() {
                return ChannelOutcome {
                    channel_id: channel.channel_id().to_string(),
                    delivered: false,
                    attempts: 0,
                    error: Some("circuit open".to_string()),
                };
            }
        }

        let mut last_error = None;
        for attempt in 0..self.config.retry_attempts {
            match channel.send_once(body).await {
                Ok(()) => {
                    self.primary_breaker.lock().await.record_success();
                    return ChannelOutcome {
                        channel_id: channel.channel_id().to_string(),
                        delivered: true,
                        attempts: attempt + 1,
                        error: None,
                    };
                }
                Err(e) => {
                    self.primary_breaker.lock().await.record_failure();
                    let retryable = e.is_retryable();
                    last_error = Some(e.message().to_string());
                    if !retryable || attempt + 1 >= self.config.retry_attempts {
                        break;
                    }
                    self.backoff(attempt).await;
                }
            }
        }

        ChannelOutcome {
            channel_id: channel.channel_id().to_string(),
            delivered: false,
            attempts: self.config.retry_attempts,
            error: last_error,
        }
    }

    async fn send_secondary(&self, channel: &dyn SecondaryChannel, payload: &crate::format::SecondaryPayload) -> ChannelOutcome {
        {
            let mut breaker = self.secondary_breaker.lock().await;
            if !breaker.allow_request() {
                return ChannelOutcome {
                    channel_id: channel.channel_id().to_string(),
                    delivered: false,
                    attempts: 0,
                    error: Some("circuit open".to_string()),
                };
            }
        }

        let mut last_error = None;
        for attempt in 0..self.config.retry_attempts {
            match channel.send_once(payload).await {
                Ok(()) => {
                    self.secondary_breaker.lock().await.record_success();
                    return ChannelOutcome {
                        channel_id: channel.channel_id().to_string(),
                        delivered: true,
                        attempts: attempt + 1,
                        error: None,
                    };
                }
                Err(e) => {
                    self.secondary_breaker.lock().await.record_failure();
                    let retryable = e.is_retryable();
                    last_error = Some(e.message().to_string());
                    if !retryable || attempt + 1 >= self.config.retry_attempts {
                        break;
                    }
                    self.backoff(attempt).await;
                }
            }
        }

        ChannelOutcome {
            channel_id: channel.channel_id().to_string(),
            delivered: false,
            attempts: self.config.retry_attempts,
            error: last_error,
        }
    }

    async fn backoff(&self, attempt: u32) {
        let wait = self.config.retry_base_backoff * 2u32.pow(attempt);
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyPrimary {
        failures_before_success: u32,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PrimaryChannel for FlakyPrimary {
        fn channel_id(&self) -> &str {
            "flaky"
        }

        async fn send_once(&self, _body: &str) -> Result<(), ChannelError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(ChannelError::Transient("temporary".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysAuthFails;

    #[async_trait]
    impl PrimaryChannel for AlwaysAuthFails {
        fn channel_id(&self) -> &str {
            "auth-fail"
        }

        async fn send_once(&self, _body: &str) -> Result<(), ChannelError> {
            Err(ChannelError::NonRetryable("auth failed".to_string()))
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_and_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let manager = NotificationManager::new(
            Some(Box::new(FlakyPrimary { failures_before_success: 2, attempts: Arc::clone(&attempts) })),
            None,
            NotificationManagerConfig { retry_base_backoff: Duration::from_millis(1), ..Default::default() },
        );
        let results = ScanResults::new(serde_json::Value::Null);
        let outcome = manager.notify(&results).await;
        assert!(outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_on_nonretryable_primary_failure() {
        struct RecordingSecondary(Arc<AtomicU32>);
        #[async_trait]
        impl SecondaryChannel for RecordingSecondary {
            fn channel_id(&self) -> &str {
                "secondary"
            }
            async fn send_once(&self, _payload: &crate::format::SecondaryPayload) -> Result<(), ChannelError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let calls = Arc::new(AtomicU32::new(0));
        let manager = NotificationManager::new(
            Some(Box::new(AlwaysAuthFails)),
            Some(Box::new(RecordingSecondary(Arc::clone(&calls)))),
            NotificationManagerConfig {
                mode: NotificationMode::PrimaryWithFallback,
                fallback_delay: Duration::from_millis(0),
                retry_base_backoff: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let results = ScanResults::new(serde_json::Value::Null);
        let outcome = manager.notify(&results).await;
        assert!(outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn primary_only_mode_never_sends_secondary() {
        struct CountingSecondary(Arc<AtomicU32>);
        #[async_trait]
        impl SecondaryChannel for CountingSecondary {
            fn channel_id(&self) -> &str {
                "secondary"
            }
            async fn send_once(&self, _payload: &crate::format::SecondaryPayload) -> Result<(), ChannelError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let calls = Arc::new(AtomicU32::new(0));
        let manager = NotificationManager::new(
            Some(Box::new(AlwaysAuthFails)),
            Some(Box::new(CountingSecondary(Arc::clone(&calls)))),
            NotificationManagerConfig { mode: NotificationMode::PrimaryOnly, ..Default::default() },
        );
        let results = ScanResults::new(serde_json::Value::Null);
        let outcome = manager.notify(&results).await;
        assert!(!outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
