// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains the data structures shared by the pipeline,
//! the services and the storage layer.

mod config;
mod feature;
mod listing;

// Re-export all public types
pub use config::{
    ClientConfig, Config, FilterConfig, FilterRule, LoggingConfig, RoutingConfig, StorageBackend,
    StorageConfig, WatcherConfig,
};
pub use feature::{COMMUTE_TIME, FeatureResult, NEAREST_STATION, RouteSummary};
pub use listing::{Gps, Listing};
