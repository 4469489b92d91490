// src/pipeline/watch.rs

//! The watch cycle: fetch, diff, enhance, filter, emit, persist.
//!
//! A cycle is split in two halves. [`Watcher::prepare`] only reads durable
//! state and can be abandoned at any await point. [`Watcher::commit`]
//! enqueues hits first and upserts the snapshot last, so a crash in between
//! re-emits the delta on the next cycle instead of losing it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};
use crate::models::{Config, Listing};
use crate::pipeline::commute::CommuteTimeCalculator;
use crate::pipeline::diff::{DiffCalculator, DiffResult};
use crate::pipeline::enhance::EnhancerPipeline;
use crate::pipeline::filter::{ListingFilter, RuleFilter};
use crate::pipeline::stations::{NearestStationCalculator, StationIndex};
use crate::pipeline::timer::{CycleTimer, Shutdown, shutdown_requested};
use crate::services::{HttpPageFetcher, ListingClient, RoutingClient};
use crate::storage::{HitOutbox, ObjectStore, SnapshotStore};
use crate::utils::http::create_async_client;

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Valid listings fetched
    pub fetched: usize,
    pub page_total: u32,
    pub failed_pages: Vec<u32>,
    pub invalid_records: usize,
    pub added: usize,
    pub updated: usize,
    /// Ids gone from the source; they stay in the snapshot
    pub removed: usize,
    pub feature_failures: usize,
    /// Outbox keys of emitted hits, in emission order
    pub emitted: Vec<String>,
    /// Snapshot objects written
    pub persisted: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Number of listings that went through enhancement.
    pub fn delta(&self) -> usize {
        self.added + self.updated
    }

    pub fn log_summary(&self) {
        log::info!(
            "Cycle done in {:.1}s: {} fetched ({} pages), {} new, {} changed, {} gone, {} hits",
            self.elapsed.as_secs_f64(),
            self.fetched,
            self.page_total,
            self.added,
            self.updated,
            self.removed,
            self.emitted.len()
        );
        if !self.failed_pages.is_empty() || self.invalid_records > 0 {
            log::warn!(
                "Partial fetch: failed pages {:?}, {} invalid records",
                self.failed_pages,
                self.invalid_records
            );
        }
        if self.feature_failures > 0 {
            log::warn!("{} feature calculations failed", self.feature_failures);
        }
    }
}

/// The read-only half of a cycle, ready to be committed.
#[derive(Debug)]
pub struct PreparedCycle {
    report: CycleReport,
    delta: Vec<Listing>,
    hits: Vec<usize>,
    started: Instant,
}

impl PreparedCycle {
    /// Enhanced new and changed listings.
    pub fn delta(&self) -> &[Listing] {
        &self.delta
    }

    /// Delta listings that passed the filter.
    pub fn hits(&self) -> impl Iterator<Item = &Listing> {
        self.hits.iter().map(|&i| &self.delta[i])
    }
}

/// Periodically detects new or changed listings and emits matching ones.
pub struct Watcher {
    client: ListingClient,
    snapshot: SnapshotStore,
    outbox: HitOutbox,
    diff: DiffCalculator,
    enhancer: EnhancerPipeline,
    filter: Box<dyn ListingFilter>,
    timer: CycleTimer,
}

impl Watcher {
    /// A watcher with no calculators, a pass-all filter and a 10 minute interval.
    pub fn new(client: ListingClient, snapshot: SnapshotStore, outbox: HitOutbox) -> Self {
        Self {
            client,
            snapshot,
            outbox,
            diff: DiffCalculator::new(),
            enhancer: EnhancerPipeline::new(),
            filter: Box::new(RuleFilter::default()),
            timer: CycleTimer::new(Duration::from_secs(600), Duration::from_secs(1)),
        }
    }

    /// Assemble the HTTP clients, storage views and calculators from configuration.
    pub async fn from_config(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let http = create_async_client(&config.client)?;
        let fetcher = HttpPageFetcher::new(http.clone(), &config.client)?;
        let client = ListingClient::new(Arc::new(fetcher), &config.client);

        let snapshot = SnapshotStore::new(store.clone(), &config.storage.snapshot_prefix)
            .with_max_concurrent(config.storage.max_concurrent);
        let outbox = HitOutbox::new(store, &config.storage.outbox_prefix);

        let mut enhancer = EnhancerPipeline::new();
        if config.routing.enabled {
            let path = config
                .routing
                .stations_path
                .as_ref()
                .ok_or_else(|| AppError::config("routing.stations_path is required"))?;
            let index = Arc::new(StationIndex::load(path).await?);
            let routes = Arc::new(RoutingClient::new(http, &config.routing)?);
            enhancer = enhancer
                .with_calculator(NearestStationCalculator::new(index))
                .with_calculator(CommuteTimeCalculator::new(
                    routes,
                    config.routing.destination.clone(),
                ));
        }

        Ok(Self::new(client, snapshot, outbox)
            .with_enhancer(enhancer)
            .with_filter(RuleFilter::from_config(&config.filter))
            .with_timer(CycleTimer::new(
                Duration::from_secs(config.watcher.interval_secs),
                Duration::from_secs(config.watcher.tick_secs),
            )))
    }

    pub fn with_enhancer(mut self, enhancer: EnhancerPipeline) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn with_filter(mut self, filter: impl ListingFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn with_timer(mut self, timer: CycleTimer) -> Self {
        self.timer = timer;
        self
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    pub fn outbox(&self) -> &HitOutbox {
        &self.outbox
    }

    /// Fetch, diff, enhance and filter without writing anything.
    pub async fn prepare(&self) -> Result<PreparedCycle> {
        let started = Instant::now();

        let fetch = self.client.fetch_all().await?;
        let previous = self.snapshot.read_all().await?;
        log::debug!(
            "Fetched {} listings, {} in snapshot",
            fetch.listings.len(),
            previous.len()
        );

        let DiffResult { diff, mut delta } = self.diff.calculate(&fetch.listings, &previous);
        if !diff.removed.is_empty() {
            log::debug!("No longer listed: {:?}", diff.removed);
        }

        let enhanced = self.enhancer.enhance_all(&mut delta).await;

        let hits = delta
            .iter()
            .enumerate()
            .filter(|(_, listing)| self.filter.matches(listing))
            .map(|(i, _)| i)
            .collect();

        Ok(PreparedCycle {
            report: CycleReport {
                fetched: fetch.listings.len(),
                page_total: fetch.page_total,
                failed_pages: fetch.failed_pages,
                invalid_records: fetch.invalid_records,
                added: diff.added.len(),
                updated: diff.updated.len(),
                removed: diff.removed.len(),
                feature_failures: enhanced.failures.len(),
                ..CycleReport::default()
            },
            delta,
            hits,
            started,
        })
    }

    /// Enqueue the hits, then persist the delta.
    ///
    /// An enqueue failure aborts before the snapshot is touched.
    pub async fn commit(&self, prepared: PreparedCycle) -> Result<CycleReport> {
        let PreparedCycle {
            mut report,
            delta,
            hits,
            started,
        } = prepared;

        for &i in &hits {
            let key = self.outbox.enqueue(&delta[i]).await.inspect_err(|e| {
                log::error!(
                    "Enqueue of {} failed after {} hits, snapshot left unchanged: {}",
                    delta[i].id,
                    report.emitted.len(),
                    e
                )
            })?;
            report.emitted.push(key);
        }

        report.persisted = self.snapshot.upsert(&delta).await?;
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// One full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let prepared = self.prepare().await?;
        self.commit(prepared).await
    }

    /// Run cycles until `shutdown` turns `true`.
    ///
    /// A shutdown during the read-only half abandons that cycle. Once
    /// emission has started the cycle runs to completion.
    pub async fn watch(&mut self, mut shutdown: Shutdown) {
        log::info!(
            "Watching every {}s",
            self.timer.interval().as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.timer.elapsed() {
                let prepared = tokio::select! {
                    result = self.prepare() => Some(result),
                    _ = shutdown_requested(&mut shutdown) => None,
                };

                match prepared {
                    None => {
                        log::info!("Shutdown requested, abandoning cycle");
                        break;
                    }
                    Some(Ok(prepared)) => match self.commit(prepared).await {
                        Ok(report) => report.log_summary(),
                        Err(e) => log::error!("Cycle failed while emitting: {}", e),
                    },
                    Some(Err(e)) => log::warn!("Cycle skipped: {}", e),
                }
                self.timer.reset();
            }

            if !self.timer.wait(&mut shutdown).await {
                break;
            }
        }

        log::info!("Watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientConfig, FeatureResult};
    use crate::pipeline::enhance::FeatureCalculator;
    use crate::pipeline::timer::shutdown_channel;
    use crate::services::{ListingPage, PageFetcher};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn record(id: u64, price: i64) -> Value {
        json!({
            "_links": {"self": {"href": format!("/cs/v2/estates/{id}")}},
            "seo": {"locality": "beroun"},
            "price_czk": {"value_raw": price},
            "gps": {"lat": 49.96, "lon": 14.07},
            "name": "Prodej domu",
        })
    }

    /// Serves a mutable single-page result set.
    #[derive(Default)]
    struct FakeSource {
        records: Mutex<Vec<Value>>,
        calls: AtomicUsize,
        fail: AtomicBool,
        hang: AtomicBool,
    }

    impl FakeSource {
        fn with(records: Vec<Value>) -> Arc<Self> {
            let source = Self::default();
            *source.records.lock().unwrap() = records;
            Arc::new(source)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for FakeSource {
        async fn fetch_page(&self, _page: u32, _per_page: u32) -> Result<ListingPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::fetch("page 1", "503 Service Unavailable"));
            }
            let records = self.records.lock().unwrap().clone();
            Ok(ListingPage {
                total_count: records.len() as u64,
                records,
            })
        }
    }

    #[derive(Default)]
    struct CountingCalculator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeatureCalculator for Arc<CountingCalculator> {
        fn name(&self) -> &str {
            "counted"
        }

        async fn calculate(&self, _listing: &Listing) -> Result<FeatureResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FeatureResult::NearestStation {
                station: "Beroun".into(),
                distance_km: 0.4,
            })
        }
    }

    /// Memory store whose puts under `hits/` fail.
    #[derive(Default)]
    struct BrokenOutboxStore {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl ObjectStore for BrokenOutboxStore {
        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_keys(prefix).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            if key.starts_with("hits/") {
                return Err(AppError::storage("disk full"));
            }
            self.inner.put(key, bytes).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    fn watcher(source: Arc<FakeSource>, store: Arc<dyn ObjectStore>) -> Watcher {
        let client = ListingClient::new(source, &ClientConfig::default());
        Watcher::new(
            client,
            SnapshotStore::new(store.clone(), "snapshot"),
            HitOutbox::new(store, "hits"),
        )
    }

    fn five_listings() -> Vec<Value> {
        vec![
            record(1, 12_000_000),
            record(2, 9_000_000),
            record(3, 15_500_000),
            record(4, 11_000_000),
            record(5, 10_000_000),
        ]
    }

    fn cheap(listing: &Listing) -> bool {
        listing.price < 10_000_000
    }

    #[tokio::test]
    async fn test_first_cycle_emits_matching_and_persists_all() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let watcher = watcher(FakeSource::with(five_listings()), store).with_filter(cheap);

        let report = watcher.run_cycle().await.unwrap();

        assert_eq!(report.added, 5);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(report.persisted, 5);
        assert_eq!(watcher.snapshot().len().await.unwrap(), 5);
        assert_eq!(watcher.outbox().count().await.unwrap(), 1);

        let hit = watcher.outbox().peek_oldest().await.unwrap().unwrap();
        assert_eq!(hit.listing.id, "2");
        assert_eq!(hit.listing.price, 9_000_000);
        assert_eq!(hit.listing.link, "https://www.sreality.cz/detail/prodej/dum/rodinny/beroun/2");
    }

    #[tokio::test]
    async fn test_unchanged_rerun_does_nothing() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let counter = Arc::new(CountingCalculator::default());
        let watcher = watcher(FakeSource::with(five_listings()), store)
            .with_enhancer(EnhancerPipeline::new().with_calculator(counter.clone()))
            .with_filter(cheap);

        watcher.run_cycle().await.unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 5);

        let report = watcher.run_cycle().await.unwrap();
        assert_eq!(report.delta(), 0);
        assert!(report.emitted.is_empty());
        assert_eq!(counter.calls.load(Ordering::SeqCst), 5);
        assert_eq!(watcher.outbox().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_price_drop_is_enhanced_and_emitted() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let source = FakeSource::with(five_listings());
        let counter = Arc::new(CountingCalculator::default());
        let watcher = watcher(source.clone(), store)
            .with_enhancer(EnhancerPipeline::new().with_calculator(counter.clone()))
            .with_filter(cheap);
        watcher.run_cycle().await.unwrap();

        source.records.lock().unwrap()[0] = record(1, 8_500_000);
        let report = watcher.run_cycle().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 6);
        assert_eq!(watcher.snapshot().read_all().await.unwrap()["1"].price, 8_500_000);
        assert_eq!(watcher.outbox().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persisted_listing_carries_features() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let counter = Arc::new(CountingCalculator::default());
        let watcher = watcher(FakeSource::with(vec![record(7, 1)]), store)
            .with_enhancer(EnhancerPipeline::new().with_calculator(counter));

        watcher.run_cycle().await.unwrap();

        let stored = watcher.snapshot().read_all().await.unwrap();
        assert!(stored["7"].feature("counted").is_some());
    }

    #[tokio::test]
    async fn test_first_page_failure_skips_cycle() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let source = FakeSource::with(five_listings());
        source.fail.store(true, Ordering::SeqCst);
        let watcher = watcher(source, store);

        assert!(matches!(
            watcher.run_cycle().await,
            Err(AppError::Fetch { .. })
        ));
        assert_eq!(watcher.snapshot().len().await.unwrap(), 0);
        assert_eq!(watcher.outbox().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_snapshot_untouched() {
        let store: Arc<dyn ObjectStore> = Arc::new(BrokenOutboxStore::default());
        let watcher = watcher(FakeSource::with(five_listings()), store).with_filter(cheap);

        assert!(watcher.run_cycle().await.is_err());
        assert_eq!(watcher.snapshot().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prepare_writes_nothing() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let watcher = watcher(FakeSource::with(five_listings()), store).with_filter(cheap);

        let prepared = watcher.prepare().await.unwrap();
        assert_eq!(prepared.delta().len(), 5);
        assert_eq!(prepared.hits().count(), 1);
        drop(prepared);

        assert_eq!(watcher.snapshot().len().await.unwrap(), 0);
        assert_eq!(watcher.outbox().count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_runs_on_interval_until_shutdown() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let source = FakeSource::with(five_listings());
        let mut watcher = watcher(source.clone(), store).with_timer(CycleTimer::new(
            Duration::from_secs(600),
            Duration::from_secs(1),
        ));

        let (tx, rx) = shutdown_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1250)).await;
            let _ = tx.send(true);
        });

        watcher.watch(rx).await;

        // Cycles start at t=0, t=601 and t=1202.
        assert_eq!(source.calls(), 3);
        assert_eq!(watcher.snapshot().len().await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_stuck_cycle() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStorage::new());
        let source = FakeSource::with(five_listings());
        source.hang.store(true, Ordering::SeqCst);
        let mut watcher = watcher(source.clone(), store);

        let (tx, rx) = shutdown_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(true);
        });

        watcher.watch(rx).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(watcher.snapshot().len().await.unwrap(), 0);
        assert_eq!(watcher.outbox().count().await.unwrap(), 0);
    }
}
