//! Consumer helper for the inbound `/api/markets` endpoint.
//!
//! Mirrors what a dashboard needs: records on success, a distinct
//! [`ClientError::EmptyPage`] when paging runs past the end, and a structured
//! way to tell throttling apart from other failures.

use reqwest::StatusCode;
use serde_json::Value;
use tracing::error;

use crate::api::ErrorBody;
use crate::market_data::CoinRecord;

pub const EMPTY_PAGE_MESSAGE: &str = "No more coins to display.";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Market API error: {status} {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },
    #[error("Unexpected response format from market API")]
    UnexpectedFormat,
    #[error("{}", EMPTY_PAGE_MESSAGE)]
    EmptyPage,
    #[error("request to market API failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ClientError::Api { status, code, .. } => match code.as_deref() {
                Some(code) => code == "rate_limited",
                None => *status == StatusCode::TOO_MANY_REQUESTS.as_u16(),
            },
            _ => false,
        }
    }

    pub fn is_empty_page(&self) -> bool {
        matches!(self, ClientError::EmptyPage)
    }
}

pub struct MarketsClient {
    http: reqwest::Client,
    base_url: String, // e.g. "http://127.0.0.1:3000"
}

impl MarketsClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_market_coins(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CoinRecord>, ClientError> {
        self.request(page, per_page).await.map_err(|e| {
            error!(page, per_page, error = %e, "fetch_market_coins failed");
            e
        })
    }

    async fn request(&self, page: u32, per_page: u32) -> Result<Vec<CoinRecord>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/markets", self.base_url))
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => ClientError::Api {
                    status: status.as_u16(),
                    message: parsed.error,
                    code: Some(parsed.code),
                },
                Err(_) => ClientError::Api {
                    status: status.as_u16(),
                    message: body,
                    code: None,
                },
            });
        }

        let body: Value = response.json().await.map_err(|_| ClientError::UnexpectedFormat)?;
        if !body.is_array() {
            return Err(ClientError::UnexpectedFormat);
        }
        let coins: Vec<CoinRecord> =
            serde_json::from_value(body).map_err(|_| ClientError::UnexpectedFormat)?;
        if coins.is_empty() {
            return Err(ClientError::EmptyPage);
        }
        Ok(coins)
    }
}
