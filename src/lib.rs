// src/lib.rs

//! Estate Watcher Library
//!
//! Polls a paginated listing source, detects new or re-priced listings,
//! enriches them with nearest station and commute features, and queues
//! the ones that pass the filter in a durable outbox.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
