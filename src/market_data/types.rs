use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of `/coins/markets`, forwarded verbatim.
///
/// The proxy never looks inside; the accessors exist for the CLI table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinRecord(Map<String, Value>);

impl CoinRecord {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }

    pub fn current_price(&self) -> Option<f64> {
        self.0.get("current_price").and_then(Value::as_f64)
    }

    pub fn market_cap_rank(&self) -> Option<u64> {
        self.0.get("market_cap_rank").and_then(Value::as_u64)
    }
}

// Lookup key for the response cache: both halves matter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: NonZeroU32,
    pub per_page: NonZeroU32,
}

impl CacheKey {
    pub fn new(page: NonZeroU32, per_page: NonZeroU32) -> Self {
        Self { page, per_page }
    }

    /// Returns `None` when either value is zero.
    pub fn from_raw(page: u32, per_page: u32) -> Option<Self> {
        Some(Self::new(NonZeroU32::new(page)?, NonZeroU32::new(per_page)?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "markets:{}:{}", self.page, self.per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

// Advisory directive for an edge cache in front of us. Never enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFreshness {
    pub s_maxage: Duration,
    pub stale_while_revalidate: Duration,
}

impl Default for EdgeFreshness {
    fn default() -> Self {
        Self {
            s_maxage: Duration::from_secs(60),
            stale_while_revalidate: Duration::from_secs(30),
        }
    }
}

impl EdgeFreshness {
    pub fn header_value(&self) -> String {
        format!(
            "s-maxage={}, stale-while-revalidate={}",
            self.s_maxage.as_secs(),
            self.stale_while_revalidate.as_secs()
        )
    }
}

/// Result of a successful `get_markets` call.
#[derive(Debug, Clone)]
pub struct MarketPage {
    pub coins: Arc<[CoinRecord]>,
    pub cache: CacheStatus,
    /// Set on misses only.
    pub freshness: Option<EdgeFreshness>,
}
