//! Service layer for the watcher.
//!
//! This module contains the network-facing collaborators:
//! - Page fetching (`PageFetcher`, `HttpPageFetcher`)
//! - Full query assembly (`ListingClient`)
//! - Transit route lookup (`RoutingClient`)

mod listings;
mod pages;
mod routing;

pub use listings::{FetchOutcome, ListingClient};
pub use pages::{HttpPageFetcher, ListingPage, PageFetcher};
pub use routing::{
    RouteFinder, RoutingClient, next_business_day, parse_duration, parse_routes, parse_transfers,
};
