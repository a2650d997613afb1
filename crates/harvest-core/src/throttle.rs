//! Request pacing for polite fetching.
//!
//! A [`RateLimiter`] spaces consecutive outbound requests, either by a fixed
//! minimum interval or by a random "no-hammer" delay. [`ThrottledFetcher`]
//! wraps any [`Fetcher`] with one shared limiter, so that listing, detail
//! and status-page requests all go through the same pacing state.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use harvest_core::throttle::{PacingMode, ThrottledFetcher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! # use harvest_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, harvest_core::error::AppError> { todo!() }
//! # }
//! let inner = MyFetcher;
//! let fetcher = ThrottledFetcher::new(inner, PacingMode::fixed(Duration::from_secs(1)));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Lower bound of the no-hammer delay.
pub const POLITE_MIN: Duration = Duration::from_secs(1);
/// Upper bound of the no-hammer delay.
pub const POLITE_MAX: Duration = Duration::from_secs(10);

/// How the limiter decides how long to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    /// Sleep for whatever is left of `interval` since the previous call.
    Fixed { interval: Duration },

    /// Sleep a uniform random duration in `[min, max]` on every call,
    /// regardless of how long ago the previous call was.
    Jittered { min: Duration, max: Duration },
}

impl PacingMode {
    pub fn fixed(interval: Duration) -> Self {
        PacingMode::Fixed { interval }
    }

    /// Random 1–10 second delay before every request.
    pub fn polite() -> Self {
        PacingMode::Jittered {
            min: POLITE_MIN,
            max: POLITE_MAX,
        }
    }

    /// Delay required before a call made `elapsed` after the previous one.
    ///
    /// `elapsed` is `None` for the very first call.
    fn delay(&self, elapsed: Option<Duration>) -> Duration {
        match *self {
            PacingMode::Fixed { interval } => match elapsed {
                Some(elapsed) => interval.saturating_sub(elapsed),
                None => Duration::ZERO,
            },
            PacingMode::Jittered { min, max } => random_between(min, max),
        }
    }
}

impl Default for PacingMode {
    /// One second between requests.
    fn default() -> Self {
        PacingMode::fixed(Duration::from_secs(1))
    }
}

/// Sequential request pacer.
///
/// Holds a single "last call" timestamp. Not synchronized; share it through
/// [`ThrottledFetcher`] when more than one caller needs it.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    mode: PacingMode,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(mode: PacingMode) -> Self {
        Self {
            mode,
            last_call: None,
        }
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    /// How long a call made now would sleep.
    pub fn next_delay(&self) -> Duration {
        self.mode.delay(self.last_call.map(|t| t.elapsed()))
    }

    /// Sleep as the pacing mode requires, then record the call time.
    ///
    /// Returns the duration slept.
    pub async fn wait(&mut self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!(sleep_ms = %delay.as_millis(), "Rate limiting");
            tokio::time::sleep(delay).await;
        }
        self.last_call = Some(Instant::now());
        delay
    }
}

/// A [`Fetcher`] wrapper that paces every request through one [`RateLimiter`].
///
/// The limiter lock is held across the sleep and released before the
/// request itself, so requests start strictly one pacing step apart.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    /// Wrap an existing fetcher with pacing.
    pub fn new(inner: F, mode: PacingMode) -> Self {
        Self {
            inner,
            limiter: Arc::new(Mutex::new(RateLimiter::new(mode))),
        }
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.limiter.lock().await.wait().await;
        self.inner.fetch(url).await
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
