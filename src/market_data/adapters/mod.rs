// Shared trait + error for upstream market data sources

use std::num::NonZeroU32;

use crate::market_data::types::CoinRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    // HTTP 429. Caller decides whether to back off.
    #[error("upstream rate limit hit")]
    RateLimited,
    // Any other non-success status; never retried.
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },
    // Network error, timeout, unreadable or mis-shaped body.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// One page of the market listing, classified into exactly three failure kinds.
///
/// Implementations perform a single request and hold no state of their own;
/// retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_page(
        &self,
        page: NonZeroU32,
        per_page: NonZeroU32,
    ) -> Result<Vec<CoinRecord>, UpstreamError>;
}

pub mod coingecko;
