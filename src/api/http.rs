// src/api/http.rs
//! HTTP transport seam for upstream JSON APIs.

use crate::error::{MarketDataError, Result};
use crate::utils::Timer;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = "CryptoInsight/1.0";
const MAX_ERROR_BODY: usize = 200;

/// A GET request against a JSON endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    /// Repeated keys are allowed (`ids[]=a&ids[]=b`)
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Path portion of the url, used in errors and logs
    pub fn endpoint(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, request: &HttpRequest) -> Result<serde_json::Value>;
}

/// `Retry-After` as delta-seconds; HTTP-date hints are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Every request made through this transport is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| MarketDataError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, request: &HttpRequest) -> Result<serde_json::Value> {
        let endpoint = request.endpoint();
        let url = Url::parse_with_params(&request.url, &request.query)
            .map_err(|e| MarketDataError::Config(format!("invalid url {}: {}", request.url, e)))?;

        let mut builder = self.client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let timer = Timer::start(&format!("GET {}", endpoint));
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map(|(i, _)| i)
                    .unwrap_or(body.len()),
            );
            warn!("HTTP {} from {}: {}", status.as_u16(), endpoint, body);
            return Err(MarketDataError::HttpStatus {
                status: status.as_u16(),
                endpoint,
                body,
                retry_after,
            });
        }

        let bytes = response.bytes().await?;
        timer.finish_with_threshold(2000);
        debug!("GET {} returned {} bytes", endpoint, bytes.len());
        serde_json::from_slice(&bytes).map_err(|e| {
            MarketDataError::MalformedResponse(format!("{} returned invalid JSON: {}", endpoint, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::get("https://hermes.pyth.network/api/latest_price_feeds")
            .query("ids[]", "abc")
            .query("ids[]", "def")
            .header("x-cg-demo-api-key", "k");
        assert_eq!(req.endpoint(), "/api/latest_price_feeds");
        assert_eq!(req.query.len(), 2);
        assert_eq!(req.headers[0].0, "x-cg-demo-api-key");
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        let err = transport
            .get_json(&HttpRequest::get("http://127.0.0.1:1/ping"))
            .await
            .unwrap_err();
        assert!(err.should_retry(), "unexpected error: {:?}", err);
    }
}
