// src/services/pages.rs

//! Page fetcher: one page of listing results per call.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::ClientConfig;
use crate::utils::http::parse_base_url;

/// One page of raw listing records plus the advertised total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    /// Total number of results for the whole query
    pub total_count: u64,
    /// Raw records, opaque beyond what listing mapping reads
    pub records: Vec<Value>,
}

impl ListingPage {
    /// Parse a page response: `result_size` and `_embedded.estates`.
    pub fn from_json(body: &Value) -> Result<Self> {
        let total_count = body
            .get("result_size")
            .and_then(Value::as_u64)
            .ok_or_else(|| AppError::validation("page response has no result_size"))?;
        let records = body
            .pointer("/_embedded/estates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            total_count,
            records,
        })
    }
}

/// Fetches a single page of a listing query. Stateless.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<ListingPage>;
}

/// HTTP page fetcher for the listing API.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    endpoint: url::Url,
    query: Vec<(String, String)>,
}

impl HttpPageFetcher {
    /// Build a fetcher for `{base_url}estates` with the configured query.
    pub fn new(client: reqwest::Client, config: &ClientConfig) -> Result<Self> {
        let endpoint = parse_base_url(&config.base_url)?.join("estates")?;
        let query = config
            .query
            .iter()
            .filter(|(key, _)| key.as_str() != "page" && key.as_str() != "per_page")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            client,
            endpoint,
            query,
        })
    }

    fn page_url(&self, page: u32, per_page: u32) -> url::Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("per_page", &per_page.to_string());
            pairs.append_pair("page", &page.to_string());
        }
        url
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<ListingPage> {
        let url = self.page_url(page, per_page);
        log::debug!("Fetching {}", url);

        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        ListingPage::from_json(&body)
    }
}
