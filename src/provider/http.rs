//! Shared HTTP plumbing for provider clients

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::error::ProviderError;

/// User agent sent with every request; Nominatim rejects anonymous clients
pub const USER_AGENT: &str = concat!("roadwatch/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by all providers
///
/// Per-call deadlines are enforced by the fetch orchestrator, so the client
/// itself carries no timeout.
pub fn build_client() -> Result<Client, ProviderError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Sends a request and parses the body as JSON
///
/// Non-success statuses are mapped through `ProviderError::from_status`.
pub async fn send_json(provider: &str, request: RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        debug!(provider, status = status.as_u16(), "Provider returned an error status");
        return Err(ProviderError::from_status(provider, status.as_u16(), &text));
    }

    Ok(serde_json::from_str(&text)?)
}

/// Joins a base URL and a path without doubling the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
