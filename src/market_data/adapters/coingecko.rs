// CoinGecko `/coins/markets` adapter

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use super::{MarketSource, UpstreamError};
use crate::market_data::types::CoinRecord;

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String, // e.g. "https://api.coingecko.com/api/v3"
}

impl CoinGeckoClient {
    /// `timeout` of `None` leaves reqwest's transport defaults in place.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("coinboard/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }

    async fn request(
        &self,
        page: NonZeroU32,
        per_page: NonZeroU32,
    ) -> Result<Vec<CoinRecord>, UpstreamError> {
        let response = self
            .http
            .get(self.markets_url())
            .query(&query_for(page, per_page))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        serde_json::from_slice::<Vec<CoinRecord>>(&body)
            .map_err(|e| UpstreamError::Transport(format!("unexpected response body: {}", e)))
    }
}

fn query_for(page: NonZeroU32, per_page: NonZeroU32) -> [(&'static str, String); 5] {
    [
        ("vs_currency", "usd".to_string()),
        ("order", "market_cap_desc".to_string()),
        ("per_page", per_page.to_string()),
        ("page", page.to_string()),
        ("sparkline", "false".to_string()),
    ]
}

fn classify_status(status: StatusCode) -> Option<UpstreamError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(UpstreamError::RateLimited);
    }
    if !status.is_success() {
        return Some(UpstreamError::Status {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("CoinGecko error").to_string(),
        });
    }
    None
}

#[async_trait::async_trait]
impl MarketSource for CoinGeckoClient {
    #[instrument(skip(self), fields(upstream = %self.base_url))]
    async fn fetch_page(
        &self,
        page: NonZeroU32,
        per_page: NonZeroU32,
    ) -> Result<Vec<CoinRecord>, UpstreamError> {
        let start = Instant::now();
        let result = self.request(page, per_page).await;

        metrics::histogram!("coinboard_upstream_latency_seconds")
            .record(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(coins) => {
                debug!(rows = coins.len(), "upstream page fetched");
                "ok"
            }
            Err(UpstreamError::RateLimited) => {
                warn!("upstream rate limited");
                "rate_limited"
            }
            Err(UpstreamError::Status { status, .. }) => {
                warn!(status, "upstream error status");
                "status"
            }
            Err(UpstreamError::Transport(e)) => {
                warn!(error = %e, "upstream transport failure");
                "transport"
            }
        };
        metrics::counter!("coinboard_upstream_requests_total", "outcome" => outcome).increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    // Serve a fixed status + body on /coins/markets, recording every query string seen
    async fn fake_upstream(
        status: u16,
        body: &'static str,
    ) -> (String, Arc<parking_lot::Mutex<Vec<HashMap<String, String>>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_handler = Arc::clone(&seen);
        let app = Router::new().route(
            "/coins/markets",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let seen = Arc::clone(&seen_handler);
                async move {
                    seen.lock().push(q);
                    (
                        AxumStatus::from_u16(status).unwrap(),
                        [("content-type", "application/json")],
                        body,
                    )
                        .into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn test_success_returns_rows_and_sends_fixed_query() {
        let (url, seen) =
            fake_upstream(200, r#"[{"id":"bitcoin","symbol":"btc"},{"id":"ethereum"}]"#).await;
        let client = CoinGeckoClient::new(&url, None).unwrap();

        let coins = client.fetch_page(nz(3), nz(25)).await.unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id(), Some("bitcoin"));

        let queries = seen.lock();
        assert_eq!(queries.len(), 1);
        let q = &queries[0];
        assert_eq!(q["vs_currency"], "usd");
        assert_eq!(q["order"], "market_cap_desc");
        assert_eq!(q["sparkline"], "false");
        assert_eq!(q["page"], "3");
        assert_eq!(q["per_page"], "25");
    }

    #[tokio::test]
    async fn test_429_is_rate_limited() {
        let (url, _) = fake_upstream(429, r#"{"status":{"error_code":429}}"#).await;
        let client = CoinGeckoClient::new(&url, None).unwrap();
        assert_eq!(
            client.fetch_page(nz(1), nz(50)).await,
            Err(UpstreamError::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_other_error_status_carries_status_and_reason() {
        let (url, _) = fake_upstream(503, "down").await;
        let client = CoinGeckoClient::new(&url, None).unwrap();
        assert_eq!(
            client.fetch_page(nz(1), nz(50)).await,
            Err(UpstreamError::Status {
                status: 503,
                message: "Service Unavailable".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_wrong_body_shape_is_transport_failure() {
        let (url, _) = fake_upstream(200, r#"{"error":"not a list"}"#).await;
        let client = CoinGeckoClient::new(&url, None).unwrap();
        assert!(matches!(
            client.fetch_page(nz(1), nz(50)).await,
            Err(UpstreamError::Transport(_))
        ));

        let (url, _) = fake_upstream(200, "<html>").await;
        let client = CoinGeckoClient::new(&url, None).unwrap();
        assert!(matches!(
            client.fetch_page(nz(1), nz(50)).await,
            Err(UpstreamError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = CoinGeckoClient::new(&format!("http://{}", addr), None).unwrap();
        assert!(matches!(
            client.fetch_page(nz(1), nz(50)).await,
            Err(UpstreamError::Transport(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = CoinGeckoClient::new("https://api.example.com/v3/", None).unwrap();
        assert_eq!(client.markets_url(), "https://api.example.com/v3/coins/markets");
    }
}
