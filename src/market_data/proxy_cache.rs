// TTL response cache in front of a MarketSource, with bounded retry/backoff

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::market_data::adapters::{MarketSource, UpstreamError};
use crate::market_data::clock::{Clock, Sleeper};
use crate::market_data::types::{CacheKey, CacheStatus, CoinRecord, EdgeFreshness, MarketPage};

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please wait a moment and try again.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    // Still rate limited after every attempt
    #[error("{}", RATE_LIMIT_MESSAGE)]
    RateLimitExceeded,
    // Forwarded unchanged from upstream, no retry
    #[error("{message}")]
    UpstreamFailure { status: u16, message: String },
    // Network/parse failure that outlived its retries
    #[error("{0}")]
    TransportFailure(String),
}

impl ProxyError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::RateLimitExceeded => "rate_limited",
            ProxyError::UpstreamFailure { .. } => "upstream_error",
            ProxyError::TransportFailure(_) => "transport_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub dedupe_in_flight: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            dedupe_in_flight: true,
        }
    }
}

impl CachePolicy {
    // 500ms, 1000ms, 2000ms, ...
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    // 500ms, 1000ms, 1500ms, ...
    pub fn transport_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

// Replaced wholesale on refresh, never mutated
#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: Instant,
    payload: Arc<[CoinRecord]>,
}

pub struct ProxyCache {
    source: Arc<dyn MarketSource>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    policy: CachePolicy,
    entries: RwLock<AHashMap<CacheKey, CacheEntry>>,
    in_flight: Mutex<AHashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProxyCache {
    pub fn new(
        source: Arc<dyn MarketSource>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            source,
            clock,
            sleeper,
            policy,
            entries: RwLock::new(AHashMap::new()),
            in_flight: Mutex::new(AHashMap::new()),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Number of keys ever stored. Entries are never evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Age of the stored entry for `key`, fresh or not.
    pub fn peek(&self, key: CacheKey) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(&key)
            .map(|entry| now.saturating_duration_since(entry.inserted_at))
    }

    /// Serve `(page, per_page)` from cache or upstream.
    ///
    /// The miss path runs on its own task: dropping the returned future (a
    /// client hanging up) does not cancel a retry loop already under way, and
    /// a successful fetch is still stored.
    #[instrument(skip(self), fields(key = tracing::field::Empty))]
    pub async fn get_markets(
        self: &Arc<Self>,
        page: NonZeroU32,
        per_page: NonZeroU32,
    ) -> Result<MarketPage, ProxyError> {
        let key = CacheKey::new(page, per_page);
        tracing::Span::current().record("key", tracing::field::display(key));

        if let Some(page) = self.lookup_fresh(key) {
            return Ok(page);
        }

        let cache = Arc::clone(self);
        let task = tokio::spawn(
            async move { cache.resolve_miss(key).await }.instrument(tracing::Span::current()),
        );
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "market fetch task failed");
                Err(self.fail(ProxyError::TransportFailure(e.to_string())))
            }
        }
    }

    async fn resolve_miss(&self, key: CacheKey) -> Result<MarketPage, ProxyError> {
        if !self.policy.dedupe_in_flight {
            return self.fetch_and_store(key).await;
        }

        // One upstream sequence per key; later arrivals wait and re-check
        let gate = self.gate_for(key);
        let _guard = gate.lock().await;
        if let Some(page) = self.lookup_fresh(key) {
            return Ok(page);
        }
        self.fetch_and_store(key).await
    }

    fn lookup_fresh(&self, key: CacheKey) -> Option<MarketPage> {
        let now = self.clock.now();
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        if now.saturating_duration_since(entry.inserted_at) >= self.policy.ttl {
            debug!("cached entry stale");
            return None;
        }
        metrics::counter!("coinboard_cache_hits_total").increment(1);
        debug!(rows = entry.payload.len(), "cache hit");
        Some(MarketPage {
            coins: Arc::clone(&entry.payload),
            cache: CacheStatus::Hit,
            freshness: None,
        })
    }

    fn gate_for(&self, key: CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.in_flight.lock();
        Arc::clone(gates.entry(key).or_default())
    }

    async fn fetch_and_store(&self, key: CacheKey) -> Result<MarketPage, ProxyError> {
        metrics::counter!("coinboard_cache_misses_total").increment(1);
        let mut attempt = 0u32;
        loop {
            match self.source.fetch_page(key.page, key.per_page).await {
                Ok(coins) => {
                    let payload: Arc<[CoinRecord]> = coins.into();
                    let entry = CacheEntry {
                        inserted_at: self.clock.now(),
                        payload: Arc::clone(&payload),
                    };
                    self.entries.write().insert(key, entry);
                    info!(rows = payload.len(), attempts = attempt + 1, "cache refreshed");
                    return Ok(MarketPage {
                        coins: payload,
                        cache: CacheStatus::Miss,
                        freshness: Some(EdgeFreshness::default()),
                    });
                }
                Err(UpstreamError::RateLimited) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        warn!(attempts = attempt, "rate limit retries exhausted");
                        return Err(self.fail(ProxyError::RateLimitExceeded));
                    }
                    let delay = self.policy.rate_limit_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                    self.sleeper.sleep(delay).await;
                }
                Err(UpstreamError::Status { status, message }) => {
                    return Err(self.fail(ProxyError::UpstreamFailure { status, message }));
                }
                Err(UpstreamError::Transport(reason)) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        warn!(attempts = attempt, error = %reason, "transport retries exhausted");
                        return Err(self.fail(ProxyError::TransportFailure(reason)));
                    }
                    let delay = self.policy.transport_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %reason, "transport failure, retrying");
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    fn fail(&self, err: ProxyError) -> ProxyError {
        metrics::counter!("coinboard_proxy_errors_total", "kind" => err.code()).increment(1);
        err
    }
}
