//! Financial Modeling Prep REST client with rate limiting and retry.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::models::{PriceHistoryResponse, PriceBarDto, ProfileDto, StatementLine};
use super::{ApiGateway, ReportingPeriod, StatementKind};
use crate::config::Config;
use crate::error::ApiError;

pub const FMP_STABLE_URL: &str = "https://financialmodelingprep.com/stable";

const MAX_ATTEMPTS: u32 = 3;

/// FMP API client
pub struct FmpClient {
    http: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    retry_backoff: Duration,
}

impl FmpClient {
    pub fn new(api_key: &str, calls: u32, period: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("fundamentals-etl/1.0")
            .build()?;

        Ok(Self {
            http,
            base_url: FMP_STABLE_URL.to_string(),
            api_key: api_key.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota(calls, period))),
            retry_backoff: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api_key = config
            .fmp_api_key
            .as_deref()
            .ok_or(ApiError::MissingApiKey)?;
        Ok(Self::new(api_key, config.rate_limit_calls, config.rate_limit_period)?.with_base_url(&config.fmp_base_url))
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&base)?.join(endpoint.trim_start_matches('/'))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("apikey", &self.api_key);
        }
        Ok(url)
    }

    /// Rate-limited GET with retry on 429, 5xx and connection failures.
    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint, params)?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.get_once(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let wait = self.retry_backoff * 2u32.pow(attempt - 1);
                    warn!("⚠️  {} attempt {} failed: {}. Retrying in {:?}", endpoint, attempt, e, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        self.rate_limiter.until_ready().await;
        debug!("GET {}", url.path());

        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Err(ApiError::Payload(message.to_string()));
        }
        serde_json::from_value(body).map_err(|e| ApiError::Payload(e.to_string()))
    }
}

fn quota(calls: u32, period: Duration) -> Quota {
    let burst = NonZeroU32::new(calls).unwrap_or(NonZeroU32::MIN);
    let interval = period / burst.get();
    Quota::with_period(interval)
        .map(|q| q.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst))
}

#[async_trait]
impl ApiGateway for FmpClient {
    async fn fetch_profile(&self, symbol: &str) -> Result<Option<ProfileDto>, ApiError> {
        let profiles: Vec<ProfileDto> = self.get("profile", &[("symbol", symbol.to_string())]).await?;
        Ok(profiles.into_iter().next())
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBarDto>, ApiError> {
        let mut params = vec![("symbol", symbol.to_string())];
        if let Some(from) = from {
            params.push(("from", from.to_string()));
        }
        if let Some(to) = to {
            params.push(("to", to.to_string()));
        }
        let response: PriceHistoryResponse = self.get("historical-price-eod/full", &params).await?;
        Ok(response.into_bars())
    }

    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        period: ReportingPeriod,
        limit: u32,
    ) -> Result<Vec<StatementLine>, ApiError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("period", period.as_param().to_string()),
            ("limit", limit.to_string()),
        ];
        self.get(kind.endpoint(), &params).await
    }
}
