use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use pmcc_core::ProviderError;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

/// Per-provider admission control: a refilling token bucket for throughput,
/// a semaphore capping in-flight requests, and a second bucket for the
/// provider's daily credit allowance that resets at the configured
/// timezone's market open each day.
pub struct TokenBucketLimiter {
    inner: Mutex<BucketState>,
    in_flight: Arc<Semaphore>,
    refill_rate_per_sec: f64,
    capacity: f64,
    daily_capacity: Option<u64>,
    daily_reset_tz: Tz,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    daily_remaining: Option<u64>,
    daily_reset_at: Option<chrono::DateTime<Utc>>,
}

impl TokenBucketLimiter {
    pub fn new(
        refill_rate_per_sec: f64,
        capacity: f64,
        max_in_flight: usize,
        daily_capacity: Option<u64>,
        daily_reset_tz: Tz,
    ) -> Self {
        Self {
            inner: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                daily_remaining: daily_capacity,
                daily_reset_at: None,
            }),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            refill_rate_per_sec,
            capacity,
            daily_capacity,
            daily_reset_tz,
        }
    }

    /// Reserve `cost` tokens before `deadline` elapses, and one in-flight
    /// slot for the duration of the call. Returns `RateLimited` if the
    /// deadline passes before tokens are available, or `DailyLimitExceeded`
    /// if the provider's daily allowance is exhausted.
    pub async fn acquire(
        &self,
        provider_id: &str,
        cost: u64,
        deadline: Duration,
    ) -> Result<TokenBucketPermit, ProviderError> {
        let started = Instant::now();

        loop {
            {
                let mut state = self.inner.lock().await;
                self.refill(&mut state);
                self.maybe_reset_daily(&mut state);

                if let Some(remaining) = state.daily_remaining {
                    if remaining < cost {
                        return Err(ProviderError::DailyLimitExceeded {
                            provider_id: provider_id.to_string(),
                        });
                    }
                }

                if state.tokens >= cost as f64 {
                    state.tokens -= cost as f64;
                    if let Some(remaining) = state.daily_remaining.as_mut() {
                        *remaining = remaining.saturating_sub(cost);
                    }
                    break;
                }
            }

            if started.elapsed() >= deadline {
                return Err(ProviderError::RateLimited {
                    provider_id: provider_id.to_string(),
                    retry_after_secs: None,
                });
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let permit = self.in_flight.clone().acquire_owned().await.map_err(|_| {
            ProviderError::RateLimited {
                provider_id: provider_id.to_string(),
                retry_after_secs: None,
            }
        })?;

        Ok(TokenBucketPermit { _permit: permit })
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    fn maybe_reset_daily(&self, state: &mut BucketState) {
        let Some(daily_capacity) = self.daily_capacity else {
            return;
        };
        let now = Utc::now();
        let today_open = market_open_today(now, self.daily_reset_tz);

        let needs_reset = match state.daily_reset_at {
            None => true,
            Some(last_reset) => now >= today_open && last_reset < today_open,
        };

        if needs_reset {
            state.daily_remaining = Some(daily_capacity);
            state.daily_reset_at = Some(today_open);
        }
    }
}

/// 9:30am local time in the given timezone, for "today" in UTC terms.
fn market_open_today(now: chrono::DateTime<Utc>, tz: Tz) -> chrono::DateTime<Utc> {
    let local_date = now.with_timezone(&tz).date_naive();
    let local_open = local_date.and_hms_opt(9, 30, 0).unwrap();
    tz.from_local_datetime(&local_open)
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&local_open))
        .with_timezone(&Utc)
}

pub struct TokenBucketPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
