use thiserror::Error;

/// Errors raised by provider calls
///
/// Timeouts, rate limits, server errors and empty answers are transient and
/// move the fallback chain to the next provider. A structural rejection means
/// the request form itself was refused and is retried once in a lighter form.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("{provider} rate limited the request")]
    RateLimited { provider: String },

    #[error("{provider} returned HTTP {status}")]
    Upstream { provider: String, status: u16 },

    #[error("{provider} rejected the request: {reason}")]
    Structural { provider: String, reason: String },

    #[error("{provider} returned no usable results")]
    NoResults { provider: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ProviderError {
    /// Maps a non-success HTTP status to an error
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let provider = provider.to_string();
        match status {
            429 => ProviderError::RateLimited { provider },
            400 | 414 | 422 => ProviderError::Structural {
                provider,
                reason: body.chars().take(200).collect(),
            },
            _ => ProviderError::Upstream { provider, status },
        }
    }

    pub fn no_results(provider: &str) -> Self {
        ProviderError::NoResults {
            provider: provider.to_string(),
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, ProviderError::Structural { .. })
    }
}
