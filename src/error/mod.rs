use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MarketDataError {
    /// Invalid or missing configuration value
    #[error("Config Error: {0}")]
    Config(String),

    /// Internal coin id has no identifier for the given provider
    #[error("Unmapped identifier '{coin_id}' for provider {provider}")]
    UnmappedIdentifier { coin_id: String, provider: String },

    /// Upstream returned a feed/coin id we have no record for
    #[error("Unknown upstream identifier '{0}'")]
    UnknownUpstreamId(String),

    /// Missing API key or similar credential
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    Network(String),

    /// Upstream call exceeded its wall-clock timeout
    #[error("Timeout Error: {0}")]
    Timeout(String),

    /// Non-success HTTP status from an upstream
    #[error("HTTP {status} from {endpoint}: {body}")]
    HttpStatus {
        status: u16,
        endpoint: String,
        body: String,
        retry_after: Option<Duration>,
    },

    /// Upstream payload could not be normalized
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Cache/Redis errors
    #[error("Cache Error: {0}")]
    Cache(String),

    /// Fresh fetch failed and nothing stale was available
    #[error("Data unavailable for {key}: {reason}")]
    Unavailable { key: String, reason: String },
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::MalformedResponse(format!("JSON error: {}", err))
    }
}

impl From<redis::RedisError> for MarketDataError {
    fn from(err: redis::RedisError) -> Self {
        MarketDataError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MarketDataError::Timeout(err.to_string())
        } else if err.is_decode() {
            MarketDataError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            MarketDataError::HttpStatus {
                status: status.as_u16(),
                endpoint: err.url().map(|u| u.path().to_string()).unwrap_or_default(),
                body: err.to_string(),
                retry_after: None,
            }
        } else {
            MarketDataError::Network(err.to_string())
        }
    }
}

impl MarketDataError {
    /// Determines if an error may go away on its own (retry or later call)
    pub fn is_recoverable(&self) -> bool {
        match self {
            MarketDataError::Network(_) => true,
            MarketDataError::Timeout(_) => true,
            MarketDataError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            MarketDataError::Cache(_) => true, // Redis might come back
            MarketDataError::Unavailable { .. } => true,
            MarketDataError::Config(_)
            | MarketDataError::UnmappedIdentifier { .. }
            | MarketDataError::UnknownUpstreamId(_)
            | MarketDataError::MissingCredential(_)
            | MarketDataError::MalformedResponse(_) => false,
        }
    }

    /// Whether the retry policy should attempt the call again
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                MarketDataError::Network(_) => true,
                MarketDataError::Timeout(_) => true,
                MarketDataError::HttpStatus { .. } => true,
                // Cache problems never reach the retry loop; they degrade instead
                _ => false,
            }
    }

    /// Server-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MarketDataError::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MarketDataError::HttpStatus { status: 429, .. })
    }

    /// Categorizes error for logging and display
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            MarketDataError::Config(_)
            | MarketDataError::UnmappedIdentifier { .. }
            | MarketDataError::MissingCredential(_) => ErrorCategory::Configuration,
            MarketDataError::Network(_)
            | MarketDataError::Timeout(_)
            | MarketDataError::HttpStatus { .. } => ErrorCategory::Transient,
            MarketDataError::MalformedResponse(_) | MarketDataError::UnknownUpstreamId(_) => {
                ErrorCategory::Data
            }
            MarketDataError::Cache(_) => ErrorCategory::Infrastructure,
            MarketDataError::Unavailable { .. } => ErrorCategory::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transient,
    Data,
    Infrastructure,
    Unavailable,
}

pub type Result<T> = std::result::Result<T, MarketDataError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> MarketDataError {
        MarketDataError::HttpStatus {
            status: code,
            endpoint: "/test".to_string(),
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(status(429).should_retry());
        assert!(status(500).should_retry());
        assert!(status(503).should_retry());
        assert!(!status(400).should_retry());
        assert!(!status(404).should_retry());
        assert!(!status(401).should_retry());
    }

    #[test]
    fn test_configuration_errors_are_not_retried() {
        let err = MarketDataError::UnmappedIdentifier {
            coin_id: "dogecoin".to_string(),
            provider: "pyth".to_string(),
        };
        assert!(!err.should_retry());
        assert_eq!(err.categorize(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_malformed_and_cache_errors() {
        assert!(!MarketDataError::MalformedResponse("x".into()).should_retry());
        // Cache errors are recoverable but handled by degradation, not retry
        let cache = MarketDataError::Cache("down".into());
        assert!(cache.is_recoverable());
        assert!(!cache.should_retry());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = MarketDataError::HttpStatus {
            status: 429,
            endpoint: "/coins/markets".into(),
            body: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }
}
