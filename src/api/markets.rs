use std::num::NonZeroU32;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AppState;
use crate::market_data::ProxyError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 50;
// CoinGecko refuses anything larger
pub const MAX_PER_PAGE: u32 = 250;

const X_CACHE: &str = "x-cache";

#[derive(Debug, Default, Deserialize)]
pub struct MarketsParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl MarketsParams {
    pub fn resolve(&self) -> Result<(NonZeroU32, NonZeroU32), ApiError> {
        let page = parse_positive("page", self.page.as_deref(), DEFAULT_PAGE)?;
        let per_page = parse_positive("per_page", self.per_page.as_deref(), DEFAULT_PER_PAGE)?;
        if per_page.get() > MAX_PER_PAGE {
            return Err(ApiError::BadRequest(format!(
                "per_page must be at most {}",
                MAX_PER_PAGE
            )));
        }
        Ok((page, per_page))
    }
}

fn parse_positive(name: &str, raw: Option<&str>, default: u32) -> Result<NonZeroU32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(NonZeroU32::new(default).unwrap_or(NonZeroU32::MIN)),
        Some(raw) => raw,
    };
    raw.parse::<NonZeroU32>()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a positive integer", name)))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Proxy(ProxyError::RateLimitExceeded) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Proxy(ProxyError::UpstreamFailure { status, .. }) => {
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Proxy(ProxyError::TransportFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Proxy(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// GET /api/markets?page=<n>&per_page=<n>
pub async fn get_markets(
    State(state): State<AppState>,
    query: Result<Query<MarketsParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let (page, per_page) = params.resolve()?;
    let result = state.cache.get_markets(page, per_page).await.map_err(|e| {
        warn!(page = page.get(), per_page = per_page.get(), error = %e, "markets request failed");
        ApiError::from(e)
    })?;
    debug!(cache = result.cache.as_str(), rows = result.coins.len(), "serving markets");

    let mut response = Json(&*result.coins).into_response();
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static(X_CACHE), HeaderValue::from_static(result.cache.as_str()));
    if let Some(freshness) = result.freshness {
        if let Ok(value) = HeaderValue::from_str(&freshness.header_value()) {
            headers.insert(CACHE_CONTROL, value);
        }
    }
    Ok(response)
}
