use crate::core::config::DEFAULT_BASE_URL;
use crate::core::{LatestRates, RateInfo, RateProvider};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CurrencyApiError {
    #[error("validation error on field '{field}': {message}")]
    Validation { field: &'static str, message: String },

    #[error("request error during {op}: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("API error [{code}]: {message}{}", info_suffix(.info))]
    Api {
        status: u16,
        code: String,
        message: String,
        info: Option<String>,
    },

    #[error("failed to parse response from '{endpoint}': {source}")]
    Parse {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn info_suffix(info: &Option<String>) -> String {
    info.as_deref()
        .filter(|i| !i.is_empty())
        .map(|i| format!(" ({i})"))
        .unwrap_or_default()
}

impl CurrencyApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CurrencyApiError::Http { status, .. } | CurrencyApiError::Api { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            CurrencyApiError::Api { code, .. } if code == "invalid_api_key" => true,
            _ => self.status_code() == Some(401),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code() == Some(429)
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, CurrencyApiError::Api { code, .. } if code == "quota_exceeded")
    }

    /// Whether retrying later might succeed: server errors, throttling and
    /// network failures.
    pub fn is_temporary(&self) -> bool {
        match self {
            CurrencyApiError::Request { op, .. } => *op == "execute_request",
            _ => self
                .status_code()
                .is_some_and(|s| s >= 500 || s == 429),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestMeta {
    last_updated_at: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    meta: LatestMeta,
    data: BTreeMap<String, RateInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Client for the CurrencyAPI `latest` endpoint.
///
/// Built once and shared with every worker through the manager.
pub struct CurrencyApiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl CurrencyApiProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, CurrencyApiError> {
        Self::with_timeout(base_url, api_key, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CurrencyApiError> {
        if api_key.is_empty() {
            return Err(CurrencyApiError::Validation {
                field: "api_key",
                message: "API key is required".to_string(),
            });
        }

        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        let client = reqwest::Client::builder()
            .user_agent("ratekeeper/0.1")
            .timeout(timeout)
            .build()
            .map_err(|source| CurrencyApiError::Request {
                op: "build_client",
                source,
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn endpoint_url(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, CurrencyApiError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint)).map_err(|e| {
            CurrencyApiError::Validation {
                field: "base_url",
                message: e.to_string(),
            }
        })?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    fn parse_api_error(status: StatusCode, body: String) -> CurrencyApiError {
        match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(parsed) => CurrencyApiError::Api {
                status: status.as_u16(),
                code: parsed.error.code,
                message: parsed.error.message,
                info: parsed.error.info,
            },
            Err(_) => CurrencyApiError::Http {
                status: status.as_u16(),
                body,
            },
        }
    }

    #[instrument(name = "CurrencyApiLatest", skip(self), fields(base = %base_currency))]
    pub async fn latest(&self, base_currency: &str) -> Result<LatestRates, CurrencyApiError> {
        let url = self.endpoint_url("latest", &[("base_currency", base_currency)])?;
        debug!("Requesting latest rates from {}", url);

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|source| CurrencyApiError::Request {
                op: "execute_request",
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| CurrencyApiError::Request {
                op: "read_response",
                source,
            })?;

        if !status.is_success() {
            return Err(Self::parse_api_error(status, body));
        }

        let parsed: LatestResponse =
            serde_json::from_str(&body).map_err(|source| CurrencyApiError::Parse {
                endpoint: "latest",
                source,
            })?;

        Ok(LatestRates {
            rates: parsed.data,
            last_updated_at: parsed.meta.last_updated_at,
        })
    }
}

#[async_trait]
impl RateProvider for CurrencyApiProvider {
    async fn fetch_latest(&self, base_currency: &str) -> anyhow::Result<LatestRates> {
        Ok(self.latest(base_currency).await?)
    }
}
