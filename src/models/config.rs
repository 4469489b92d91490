//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listing source settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Routing service and station data
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Scheduler settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Snapshot and outbox backing store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Emission rules
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override selected values from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = env_parse("WATCH_INTERVAL_SECS") {
            self.watcher.interval_secs = secs;
        }
        if let Some(n) = env_parse("MAX_CONCURRENT") {
            self.client.max_concurrent = n;
        }
        if let Ok(bucket) = std::env::var("S3_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Ok(prefix) = std::env::var("S3_PREFIX") {
            self.storage.prefix = prefix;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.client.user_agent.trim().is_empty() {
            return Err(AppError::validation("client.user_agent is empty"));
        }
        if self.client.timeout_secs == 0 {
            return Err(AppError::validation("client.timeout_secs must be > 0"));
        }
        if self.client.per_page == 0 {
            return Err(AppError::validation("client.per_page must be > 0"));
        }
        if self.client.max_concurrent == 0 {
            return Err(AppError::validation("client.max_concurrent must be > 0"));
        }
        url::Url::parse(&self.client.base_url)?;
        if self.watcher.interval_secs == 0 {
            return Err(AppError::validation("watcher.interval_secs must be > 0"));
        }
        if self.watcher.tick_secs == 0 {
            return Err(AppError::validation("watcher.tick_secs must be > 0"));
        }
        if self.storage.max_concurrent == 0 {
            return Err(AppError::validation("storage.max_concurrent must be > 0"));
        }
        self.storage.validate_prefixes()?;
        if self.storage.backend == StorageBackend::S3
            && self.storage.bucket.as_deref().is_none_or(str::is_empty)
        {
            return Err(AppError::config("storage.bucket is required for s3"));
        }
        if self.routing.enabled {
            url::Url::parse(&self.routing.url_base)?;
            if self.routing.destination.trim().is_empty() {
                return Err(AppError::config("routing.destination is empty"));
            }
            if self.routing.stations_path.is_none() {
                return Err(AppError::config("routing.stations_path is required"));
            }
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Snapshot, outbox and dead-letter keys must live under disjoint prefixes.
    fn validate_prefixes(&self) -> Result<()> {
        let snapshot = self.snapshot_prefix.trim_matches('/');
        let outbox = self.outbox_prefix.trim_matches('/');
        if snapshot.is_empty() || outbox.is_empty() {
            return Err(AppError::config(
                "storage.snapshot_prefix and storage.outbox_prefix must not be empty",
            ));
        }

        let dead = format!("{outbox}-dead");
        for other in [outbox, dead.as_str()] {
            if prefixes_overlap(snapshot, other) {
                return Err(AppError::config(format!(
                    "storage.snapshot_prefix '{snapshot}' overlaps outbox prefix '{other}'"
                )));
            }
        }
        Ok(())
    }
}

fn prefixes_overlap(a: &str, b: &str) -> bool {
    let a = format!("{a}/");
    let b = format!("{b}/");
    a.starts_with(&b) || b.starts_with(&a)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

/// Listing source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root of the listing API
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Prefix of canonical listing links
    #[serde(default = "defaults::detail_url")]
    pub detail_url: String,

    /// User-Agent header; the source randomizes data without a browser UA
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Page size requested from the source
    #[serde(default = "defaults::per_page")]
    pub per_page: u32,

    /// Maximum concurrent page fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Query parameters passed through to the source
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            detail_url: defaults::detail_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            per_page: defaults::per_page(),
            max_concurrent: defaults::max_concurrent(),
            query: BTreeMap::new(),
        }
    }
}

/// Routing service and reference station settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Whether the nearest-station and commute calculators run
    #[serde(default)]
    pub enabled: bool,

    /// Route search endpoint
    #[serde(default = "defaults::routing_url")]
    pub url_base: String,

    /// Fixed destination stop
    #[serde(default = "defaults::destination")]
    pub destination: String,

    /// Extra `[key, value]` pairs added to every route request
    #[serde(default)]
    pub query: Vec<(String, String)>,

    /// JSON file with `stopGroups`
    #[serde(default)]
    pub stations_path: Option<PathBuf>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url_base: defaults::routing_url(),
            destination: defaults::destination(),
            query: Vec::new(),
            stations_path: None,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Wait loop polling granularity in seconds
    #[serde(default = "defaults::tick")]
    pub tick_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            tick_secs: defaults::tick(),
        }
    }
}

/// Which object store backs the snapshot and outbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
    S3,
}

/// Snapshot and outbox storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the local backend
    #[serde(default = "defaults::storage_root")]
    pub root: PathBuf,

    /// Key prefix of snapshot objects
    #[serde(default = "defaults::snapshot_prefix")]
    pub snapshot_prefix: String,

    /// Key prefix of outbox entries
    #[serde(default = "defaults::outbox_prefix")]
    pub outbox_prefix: String,

    /// S3 bucket
    #[serde(default)]
    pub bucket: Option<String>,

    /// S3 key prefix
    #[serde(default = "defaults::s3_prefix")]
    pub prefix: String,

    /// Maximum concurrent object reads when loading the snapshot
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: defaults::storage_root(),
            snapshot_prefix: defaults::snapshot_prefix(),
            outbox_prefix: defaults::outbox_prefix(),
            bucket: None,
            prefix: defaults::s3_prefix(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Emission rules; a listing is emitted when any rule matches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

/// One emission rule. Every constraint that is set must hold.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilterRule {
    /// Price must be strictly below this value
    #[serde(default)]
    pub max_price: Option<i64>,

    /// Nearest station must be closer than this many kilometres
    #[serde(default)]
    pub max_station_km: Option<f64>,

    /// Commute must take fewer minutes than this
    #[serde(default)]
    pub max_commute_minutes: Option<u32>,

    /// Nearest station must have exactly this name
    #[serde(default)]
    pub station: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn base_url() -> String {
        "https://www.sreality.cz/api/cs/v2/".into()
    }
    pub fn detail_url() -> String {
        "https://www.sreality.cz/detail/prodej/dum/rodinny".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn per_page() -> u32 {
        100
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn routing_url() -> String {
        "https://idos.idnes.cz/vlakyautobusymhdvse/spojeni/vysledky/".into()
    }
    pub fn destination() -> String {
        "Praha".into()
    }
    pub fn interval() -> u64 {
        600
    }
    pub fn tick() -> u64 {
        1
    }
    pub fn storage_root() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn snapshot_prefix() -> String {
        "snapshot".into()
    }
    pub fn outbox_prefix() -> String {
        "hits".into()
    }
    pub fn s3_prefix() -> String {
        "estates".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
