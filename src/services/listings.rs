// src/services/listings.rs

//! Listing client service.
//!
//! Drives a [`PageFetcher`] across every page of the configured query.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{ClientConfig, Listing};
use crate::services::pages::PageFetcher;

/// Summary of one full fetch.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Valid listings in page order, unique by id
    pub listings: Vec<Listing>,
    /// Number of pages the query spans
    pub page_total: u32,
    /// Pages after the first that failed and contributed nothing
    pub failed_pages: Vec<u32>,
    /// Records dropped because they could not be mapped
    pub invalid_records: usize,
}

impl FetchOutcome {
    /// True if some page or record was lost.
    pub fn is_partial(&self) -> bool {
        !self.failed_pages.is_empty() || self.invalid_records > 0
    }
}

/// Service assembling the full current result set of a query.
pub struct ListingClient {
    fetcher: Arc<dyn PageFetcher>,
    per_page: u32,
    max_concurrent: usize,
    detail_url: String,
}

impl ListingClient {
    /// Create a listing client with the given fetcher and settings.
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ClientConfig) -> Self {
        Self {
            fetcher,
            per_page: config.per_page.max(1),
            max_concurrent: config.max_concurrent.max(1),
            detail_url: config.detail_url.clone(),
        }
    }

    /// Fetch all pages of the query.
    ///
    /// A failing first page fails the whole fetch. Later pages are fetched
    /// concurrently and a failing one only contributes no records.
    pub async fn fetch_all(&self) -> Result<FetchOutcome> {
        let per_page = self.per_page;
        let first = self
            .fetcher
            .fetch_page(1, per_page)
            .await
            .map_err(|e| AppError::fetch("page 1", e))?;

        let page_total = first
            .total_count
            .div_ceil(u64::from(per_page))
            .clamp(1, u64::from(u32::MAX)) as u32;

        let mut outcome = FetchOutcome {
            page_total,
            ..FetchOutcome::default()
        };

        let mut pages = vec![first.records];

        // Stage 2: remaining pages, bounded and order-preserving.
        let mut page_stream = stream::iter(2..=page_total)
            .map(|page| async move {
                let result = self.fetcher.fetch_page(page, per_page).await;
                (page, result)
            })
            .buffered(self.max_concurrent);

        while let Some((page, result)) = page_stream.next().await {
            match result {
                Ok(listing_page) => pages.push(listing_page.records),
                Err(error) => {
                    outcome.failed_pages.push(page);
                    log::warn!("Failed to fetch page {}/{}: {}", page, page_total, error);
                }
            }
        }

        let mut seen = HashSet::new();
        for record in pages.iter().flatten() {
            match Listing::from_record(record, &self.detail_url) {
                Ok(listing) => {
                    if seen.insert(listing.id.clone()) {
                        outcome.listings.push(listing);
                    }
                }
                Err(error) => {
                    outcome.invalid_records += 1;
                    log::warn!("Dropping invalid listing record: {}", error);
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pages::ListingPage;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Serves `total` generated records, failing the listed pages.
    struct FakeFetcher {
        total: u64,
        failing: Vec<u32>,
        calls: Mutex<Vec<u32>>,
    }

    impl FakeFetcher {
        fn new(total: u64, failing: Vec<u32>) -> Self {
            Self {
                total,
                failing,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u32> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    fn record(i: u64) -> Value {
        json!({
            "_links": {"self": {"href": format!("/estates/{i}")}},
            "seo": {"locality": "praha"},
            "price_czk": {"value_raw": i * 1000},
            "gps": {"lat": 50.0, "lon": 14.0},
        })
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch_page(&self, page: u32, per_page: u32) -> Result<ListingPage> {
            self.calls.lock().unwrap().push(page);
            if self.failing.contains(&page) {
                return Err(AppError::fetch(format!("page {page}"), "connection reset"));
            }
            let start = u64::from(page - 1) * u64::from(per_page);
            let end = (start + u64::from(per_page)).min(self.total);
            Ok(ListingPage {
                total_count: self.total,
                records: (start..end).map(record).collect(),
            })
        }
    }

    fn client(fetcher: Arc<FakeFetcher>) -> ListingClient {
        ListingClient::new(fetcher, &ClientConfig::default())
    }

    #[tokio::test]
    async fn test_fetches_every_page_once() {
        let fetcher = Arc::new(FakeFetcher::new(250, vec![]));
        let outcome = client(fetcher.clone()).fetch_all().await.unwrap();

        assert_eq!(fetcher.calls(), vec![1, 2, 3]);
        assert_eq!(outcome.page_total, 3);
        assert_eq!(outcome.listings.len(), 250);
        assert!(!outcome.is_partial());
    }

    #[tokio::test]
    async fn test_failed_later_page_keeps_other_pages() {
        let fetcher = Arc::new(FakeFetcher::new(250, vec![3]));
        let outcome = client(fetcher.clone()).fetch_all().await.unwrap();

        assert_eq!(fetcher.calls(), vec![1, 2, 3]);
        assert_eq!(outcome.listings.len(), 200);
        assert_eq!(outcome.failed_pages, vec![3]);
        assert!(outcome.is_partial());
        // Page order is preserved.
        assert_eq!(outcome.listings[0].id, "0");
        assert_eq!(outcome.listings[199].id, "199");
    }

    #[tokio::test]
    async fn test_failed_first_page_fails_fetch() {
        let fetcher = Arc::new(FakeFetcher::new(250, vec![1]));
        let result = client(fetcher.clone()).fetch_all().await;

        assert!(matches!(result, Err(AppError::Fetch { .. })));
        assert_eq!(fetcher.calls(), vec![1]);
    }

    #[tokio::test]
    async fn test_empty_result_fetches_single_page() {
        let fetcher = Arc::new(FakeFetcher::new(0, vec![]));
        let outcome = client(fetcher.clone()).fetch_all().await.unwrap();

        assert_eq!(fetcher.calls(), vec![1]);
        assert_eq!(outcome.page_total, 1);
        assert!(outcome.listings.is_empty());
    }

    struct StaticFetcher(Vec<Value>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch_page(&self, _page: u32, _per_page: u32) -> Result<ListingPage> {
            Ok(ListingPage {
                total_count: self.0.len() as u64,
                records: self.0.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_records() {
        let mut cheaper_duplicate = record(1);
        cheaper_duplicate["price_czk"]["value_raw"] = json!(1);
        let records = vec![
            record(1),
            json!({"price_czk": {"value_raw": 5}}),
            cheaper_duplicate,
            record(2),
        ];
        let client = ListingClient::new(Arc::new(StaticFetcher(records)), &ClientConfig::default());
        let outcome = client.fetch_all().await.unwrap();

        assert_eq!(outcome.invalid_records, 1);
        assert_eq!(outcome.listings.len(), 2);
        assert_eq!(outcome.listings[0].price, 1000);
        assert_eq!(outcome.listings[1].id, "2");
    }
}
