// Scripted MarketSource shared by unit tests

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use super::adapters::{MarketSource, UpstreamError};
use super::types::CoinRecord;

pub(crate) fn coins(ids: &[&str]) -> Vec<CoinRecord> {
    ids.iter()
        .map(|id| {
            serde_json::from_value(json!({"id": id, "symbol": id, "name": id, "current_price": 1.0}))
                .unwrap()
        })
        .collect()
}

// Replays scripted outcomes in order, then keeps succeeding
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<CoinRecord>, UpstreamError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(u32, u32)>>,
    latency: Duration,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Result<Vec<CoinRecord>, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(u32, u32)> {
        self.seen.lock().clone()
    }
}

#[async_trait::async_trait]
impl MarketSource for ScriptedSource {
    async fn fetch_page(
        &self,
        page: NonZeroU32,
        per_page: NonZeroU32,
    ) -> Result<Vec<CoinRecord>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((page.get(), per_page.get()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(coins(&["bitcoin"])))
    }
}
