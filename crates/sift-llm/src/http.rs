//! Shared HTTP client construction.

use std::time::Duration;

/// Create the HTTP client used by remote providers.
///
/// Per-call deadlines are enforced by callers with `tokio::time::timeout`;
/// the client-level timeout is only a backstop.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(180))
        .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}
