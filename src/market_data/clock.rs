//! Time capabilities injected into the proxy cache.
//!
//! Production code uses [`SystemClock`] and [`TokioSleeper`]. `ManualClock` and
//! `RecordingSleeper` let tests drive TTL expiry and backoff without real waits;
//! they are compiled for this crate's tests and, for downstream tests, behind
//! the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(any(test, feature = "test-util"))]
/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[cfg(any(test, feature = "test-util"))]
/// Returns immediately, remembering each requested delay and pushing the
/// paired [`ManualClock`] forward by the same amount.
#[derive(Debug)]
pub struct RecordingSleeper {
    clock: Arc<ManualClock>,
    slept: Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingSleeper {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self { clock, slept: Mutex::new(Vec::new()) }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        self.clock.advance(duration);
        tokio::task::yield_now().await;
    }
}
