// Market data module entrypoint
pub mod adapters;     // upstream fetchers (e.g. CoinGecko)
pub mod clock;        // injectable time + sleep
pub mod proxy_cache;  // TTL cache with retry/backoff in front of an adapter
pub mod types;        // records, keys, page results

pub use adapters::{MarketSource, UpstreamError};
pub use proxy_cache::{CachePolicy, ProxyCache, ProxyError};
pub use types::{CacheKey, CacheStatus, CoinRecord, EdgeFreshness, MarketPage};

#[cfg(test)]
pub(crate) mod testing;
