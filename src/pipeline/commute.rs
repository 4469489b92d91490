// src/pipeline/commute.rs

//! Commute time from a listing's nearest station to a fixed destination.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{COMMUTE_TIME, FeatureResult, Listing, NEAREST_STATION};
use crate::pipeline::enhance::FeatureCalculator;
use crate::services::RouteFinder;

/// Attaches the `commute_time` feature.
///
/// Must run after the nearest station calculator; a listing without a
/// `nearest_station` feature fails this calculation.
pub struct CommuteTimeCalculator {
    finder: Arc<dyn RouteFinder>,
    destination: String,
}

impl CommuteTimeCalculator {
    pub fn new(finder: Arc<dyn RouteFinder>, destination: impl Into<String>) -> Self {
        Self {
            finder,
            destination: destination.into(),
        }
    }
}

#[async_trait]
impl FeatureCalculator for CommuteTimeCalculator {
    fn name(&self) -> &str {
        COMMUTE_TIME
    }

    async fn calculate(&self, listing: &Listing) -> Result<FeatureResult> {
        let (station, _) = listing.nearest_station().ok_or_else(|| {
            AppError::calculator(COMMUTE_TIME, format!("missing {NEAREST_STATION} feature"))
        })?;

        let route = self.finder.best_route(station, &self.destination).await?;
        if route.is_none() {
            log::debug!("No route from {} to {}", station, self.destination);
        }

        Ok(FeatureResult::Commute {
            from_station: station.to_string(),
            to_station: self.destination.clone(),
            route,
        })
    }
}
