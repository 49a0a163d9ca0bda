//! Sliding-window admission control for outbound provider calls.
//!
//! The limiter remembers when each admitted call happened and refuses to let
//! more than `max_requests` of them land inside any trailing `window`. Callers
//! that arrive while the window is full are parked on a tokio timer until the
//! oldest admission ages out.
//!
//! Waiting callers are not queued: each one recomputes its wait after waking
//! up, so ordering between contenders is best effort.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::lock;

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admissions inside any trailing window.
    pub max_requests: usize,
    /// Length of the trailing window in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub window: Duration,
    /// Extra slack added to every computed wait, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub buffer: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            buffer: Duration::from_millis(100),
        }
    }
}

impl RateLimitConfig {
    pub fn with_max_requests(mut self, max: usize) -> Self {
        self.max_requests = max;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }
}

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    /// Admission instants, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
    total_admitted: AtomicU64,
    total_waited: AtomicU64,
}

impl SlidingWindowLimiter {
    /// A `max_requests` of zero is treated as one; a limiter that admits
    /// nothing would park every caller forever.
    pub fn new(mut config: RateLimitConfig) -> Self {
        config.max_requests = config.max_requests.max(1);
        Self {
            config,
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_requests)),
            total_admitted: AtomicU64::new(0),
            total_waited: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Drop admissions that fell out of the window `(now - window, now]`.
    fn purge(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait until the call fits in the window, then record it.
    ///
    /// Never fails; the only effect of a saturated window is delay.
    pub async fn admit(&self) {
        let mut waited = false;

        loop {
            let wait = {
                let mut timestamps = lock(&self.timestamps);
                let now = Instant::now();
                self.purge(&mut timestamps, now);

                if timestamps.len() < self.config.max_requests {
                    timestamps.push_back(now);
                    self.total_admitted.fetch_add(1, Ordering::Relaxed);
                    if waited {
                        self.total_waited.fetch_add(1, Ordering::Relaxed);
                    }
                    return;
                }

                // Window is full, so there is an oldest entry.
                let oldest = timestamps.front().copied().unwrap_or(now);
                self.config
                    .window
                    .saturating_sub(now.duration_since(oldest))
                    + self.config.buffer
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.config.max_requests,
                "rate limit window full, waiting"
            );
            waited = true;
            sleep(wait).await;
        }
    }

    /// Record an admission only if the window has room right now.
    pub fn try_admit(&self) -> bool {
        let mut timestamps = lock(&self.timestamps);
        let now = Instant::now();
        self.purge(&mut timestamps, now);

        if timestamps.len() < self.config.max_requests {
            timestamps.push_back(now);
            self.total_admitted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of admissions inside the current window.
    pub fn count(&self) -> usize {
        let mut timestamps = lock(&self.timestamps);
        self.purge(&mut timestamps, Instant::now());
        timestamps.len()
    }

    /// Get current statistics.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            current_count: self.count(),
            total_admitted: self.total_admitted.load(Ordering::Relaxed),
            total_waited: self.total_waited.load(Ordering::Relaxed),
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Statistics for the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    pub current_count: usize,
    pub total_admitted: u64,
    pub total_waited: u64,
}

impl RateLimitStats {
    /// Fraction of admissions that had to wait (0.0 to 1.0).
    pub fn wait_rate(&self) -> f64 {
        if self.total_admitted == 0 {
            0.0
        } else {
            self.total_waited as f64 / self.total_admitted as f64
        }
    }
}
