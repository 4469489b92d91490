//! Derived feature results attached to listings.

use serde::{Deserialize, Serialize};

/// Feature name of the nearest-station calculator.
pub const NEAREST_STATION: &str = "nearest_station";

/// Feature name of the commute-time calculator.
pub const COMMUTE_TIME: &str = "commute_time";

/// Result of one feature calculator, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureResult {
    /// Closest reference station to the listing
    NearestStation { station: String, distance_km: f64 },

    /// Best transit route from the nearest station to the destination.
    /// `route` is `None` when the routing service found no itinerary.
    Commute {
        from_station: String,
        to_station: String,
        route: Option<RouteSummary>,
    },
}

/// The chosen itinerary of a route lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteSummary {
    /// Total travel time
    pub minutes: u32,

    /// Number of transfers
    pub transfers: u32,

    /// Legs as `from->to (class)`, one per line
    pub path_info: String,
}
