//! Retry governor with exponential backoff.
//!
//! A [`Breaker`] is the single authority pipelines consult before retrying a
//! failed operation. Each call to [`Breaker::wait`] counts a retry, sleeps for
//! the current interval, and grows the interval by the configured scale.
//! Once the retry ceiling is exceeded, `wait` returns false and the caller
//! gives up.
//!
//! Sleeps are interruptible: [`Breaker::stop`] wakes every waiter
//! immediately, which is how pipelines shut down promptly while backing off.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use daqline::breaker::{Breaker, Config};
//!
//! let breaker = Breaker::new(
//!     Config::new("example")
//!         .with_base_interval(Duration::from_millis(1))
//!         .with_max_retries(2),
//! );
//! breaker.start();
//! assert!(breaker.wait("device busy"));
//! assert!(breaker.wait("device busy"));
//! assert!(!breaker.wait("device busy"));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::duration_serde;
use crate::error::{ConfigError, Result};

/// Sentinel for [`Config::max_retries`] meaning the breaker never gives up.
pub const RETRY_INFINITELY: u32 = u32::MAX;

/// Breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name used in log output.
    pub name: String,

    /// Interval before the first retry.
    #[serde(with = "duration_serde")]
    pub base_interval: Duration,

    /// Number of retries allowed before [`Breaker::wait`] gives up.
    pub max_retries: u32,

    /// Factor applied to the interval after every retry.
    pub scale: f64,

    /// Upper bound on the interval.
    #[serde(with = "duration_serde")]
    pub max_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "breaker".to_string(),
            base_interval: Duration::from_secs(1),
            max_retries: 50,
            scale: 1.1,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Creates a configuration with default backoff settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the interval before the first retry.
    #[must_use]
    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    /// Sets the retry ceiling. Use [`RETRY_INFINITELY`] to never give up.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the interval growth factor.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the interval upper bound.
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Returns a copy with `suffix` appended to the name, for breakers
    /// derived from a parent configuration.
    #[must_use]
    pub fn child(&self, suffix: &str) -> Self {
        Self {
            name: format!("{}.{suffix}", self.name),
            ..self.clone()
        }
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBreaker`] if the scale is below 1 or not
    /// finite, or if the maximum interval is shorter than the base interval.
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale < 1.0 {
            return Err(ConfigError::InvalidBreaker {
                reason: format!("scale must be a finite value >= 1.0, got {}", self.scale),
            }
            .into());
        }

        if self.max_interval < self.base_interval {
            return Err(ConfigError::InvalidBreaker {
                reason: format!(
                    "max interval ({:?}) must be >= base interval ({:?})",
                    self.max_interval, self.base_interval
                ),
            }
            .into());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    retries: u32,
    interval: Duration,
}

/// Governs retries with exponential backoff and interruptible sleeps.
///
/// A breaker is shared between a pipeline's controller and its worker thread
/// (usually behind an `Arc`). Cloning yields an independent breaker with the
/// same configuration, counters, and running flag, but fresh
/// synchronization primitives.
#[derive(Debug)]
pub struct Breaker {
    config: Config,
    state: Mutex<State>,
    cond: Condvar,
    running: AtomicBool,
}

impl Breaker {
    /// Creates a stopped breaker.
    pub fn new(config: Config) -> Self {
        let state = State {
            retries: 0,
            interval: config.base_interval,
        };
        Self {
            config,
            state: Mutex::new(state),
            cond: Condvar::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the breaker's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Marks the breaker as running so [`Breaker::wait`] will sleep.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Marks the breaker as stopped and wakes every waiter.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Waiters re-check the flag under the lock, so taking it here
        // guarantees none of them misses the notification.
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    /// Returns true if the breaker is running.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Counts a retry and sleeps for the current interval.
    ///
    /// Returns true if the caller should retry. Returns false if the breaker
    /// is not running, if the retry ceiling has been exceeded (the breaker is
    /// reset in that case), or if [`Breaker::stop`] was called during the
    /// sleep.
    pub fn wait(&self, message: &str) -> bool {
        if !self.running() {
            tracing::error!(
                breaker = %self.config.name,
                "breaker not started, refusing to retry: {message}"
            );
            return false;
        }

        let mut state = self.state.lock();
        state.retries = state.retries.saturating_add(1);
        if self.config.max_retries != RETRY_INFINITELY && state.retries > self.config.max_retries {
            tracing::error!(
                breaker = %self.config.name,
                max_retries = self.config.max_retries,
                "exceeded maximum retries, giving up: {message}"
            );
            *state = self.initial_state();
            return false;
        }

        let interval = state.interval;
        tracing::warn!(
            breaker = %self.config.name,
            retry = state.retries,
            max_retries = self.config.max_retries,
            interval = ?interval,
            "retrying: {message}"
        );

        let deadline = Instant::now() + interval;
        while self.running() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        state.interval = self.next_interval(interval);
        self.running()
    }

    /// Sleeps for `duration` without counting a retry. Returns early if the
    /// breaker is stopped; the return value is whether it is still running.
    pub fn wait_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        while self.running() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        self.running()
    }

    /// Restores the base interval and zeroes the retry count.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.retries > 0 {
            tracing::info!(
                breaker = %self.config.name,
                retries = state.retries,
                "recovered"
            );
        }
        *state = self.initial_state();
    }

    /// Returns the number of retries since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.state.lock().retries
    }

    /// Returns the interval the next retry will sleep for.
    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    fn initial_state(&self) -> State {
        State {
            retries: 0,
            interval: self.config.base_interval,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.config.scale)
            .unwrap_or(self.config.max_interval)
            .min(self.config.max_interval)
    }
}

impl Clone for Breaker {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Mutex::new(*self.state.lock()),
            cond: Condvar::new(),
            running: AtomicBool::new(self.running()),
        }
    }
}
