// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::ClientConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Parse a base URL, making sure it ends with `/` so that `join` appends.
pub fn parse_base_url(base: &str) -> Result<url::Url> {
    if base.ends_with('/') {
        Ok(url::Url::parse(base)?)
    } else {
        Ok(url::Url::parse(&format!("{base}/"))?)
    }
}
