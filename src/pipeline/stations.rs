// src/pipeline/stations.rs

//! Nearest reference station lookup.
//!
//! Stations are projected onto a local equirectangular plane (kilometres)
//! and stored in a 2-d tree laid out implicitly in a slice: the median of
//! each sub-slice is the node, the halves are its subtrees.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{FeatureResult, Gps, Listing, NEAREST_STATION};
use crate::pipeline::enhance::FeatureCalculator;

/// Kilometres per degree of latitude on a sphere of radius 6371 km.
const KM_PER_DEGREE: f64 = 111.195;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Deserialize)]
struct StopGroupsFile {
    #[serde(rename = "stopGroups", default)]
    stop_groups: Vec<StopGroup>,
}

#[derive(Debug, Deserialize)]
struct StopGroup {
    #[serde(rename = "idosName")]
    name: Option<String>,
    #[serde(rename = "avgLat")]
    lat: Option<f64>,
    #[serde(rename = "avgLon")]
    lon: Option<f64>,
}

/// Immutable spatial index of named stations.
#[derive(Debug, Clone)]
pub struct StationIndex {
    names: Vec<String>,
    coords: Vec<Gps>,
    points: Vec<[f64; 2]>,
    order: Vec<usize>,
    cos_ref: f64,
}

impl StationIndex {
    /// Build an index from `(name, position)` pairs.
    pub fn new(stations: Vec<(String, Gps)>) -> Self {
        let cos_ref = if stations.is_empty() {
            1.0
        } else {
            let mean_lat =
                stations.iter().map(|(_, gps)| gps.lat).sum::<f64>() / stations.len() as f64;
            mean_lat.to_radians().cos()
        };

        let (names, coords): (Vec<_>, Vec<_>) = stations.into_iter().unzip();
        let points: Vec<[f64; 2]> = coords.iter().map(|gps| project(*gps, cos_ref)).collect();
        let mut order: Vec<usize> = (0..points.len()).collect();
        build(&mut order, &points, 0);

        Self {
            names,
            coords,
            points,
            order,
            cos_ref,
        }
    }

    /// Parse a stop groups document (`{"stopGroups": [{idosName, avgLat, avgLon}]}`).
    ///
    /// Groups missing a name or a coordinate are skipped.
    pub fn from_stop_groups(json: &str) -> Result<Self> {
        let file: StopGroupsFile = serde_json::from_str(json)?;

        let mut stations = Vec::with_capacity(file.stop_groups.len());
        let mut skipped = 0usize;
        for group in file.stop_groups {
            match (group.name, group.lat, group.lon) {
                (Some(name), Some(lat), Some(lon)) => stations.push((name, Gps::new(lat, lon))),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {} incomplete stop groups", skipped);
        }

        Ok(Self::new(stations))
    }

    /// Load a stop groups file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let index = Self::from_stop_groups(&content)?;
        if index.is_empty() {
            return Err(AppError::config(format!(
                "no stations in {}",
                path.display()
            )));
        }
        log::info!("Loaded {} stations from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Closest station and its great-circle distance in kilometres.
    pub fn nearest(&self, gps: Gps) -> Option<(&str, f64)> {
        let target = project(gps, self.cos_ref);
        let mut best = None;
        self.search(&self.order, 0, target, &mut best);

        best.map(|(idx, _)| (self.names[idx].as_str(), haversine_km(gps, self.coords[idx])))
    }

    fn search(
        &self,
        order: &[usize],
        depth: usize,
        target: [f64; 2],
        best: &mut Option<(usize, f64)>,
    ) {
        if order.is_empty() {
            return;
        }
        let mid = order.len() / 2;
        let idx = order[mid];
        let axis = depth % 2;

        let d2 = distance_sq(self.points[idx], target);
        if best.is_none_or(|(_, best_d2)| d2 < best_d2) {
            *best = Some((idx, d2));
        }

        let delta = target[axis] - self.points[idx][axis];
        let (near, far) = if delta < 0.0 {
            (&order[..mid], &order[mid + 1..])
        } else {
            (&order[mid + 1..], &order[..mid])
        };

        self.search(near, depth + 1, target, best);
        if best.is_none_or(|(_, best_d2)| delta * delta < best_d2) {
            self.search(far, depth + 1, target, best);
        }
    }
}

fn build(order: &mut [usize], points: &[[f64; 2]], depth: usize) {
    if order.len() <= 1 {
        return;
    }
    let axis = depth % 2;
    order.sort_by(|&a, &b| points[a][axis].total_cmp(&points[b][axis]));

    let mid = order.len() / 2;
    let (left, right) = order.split_at_mut(mid);
    build(left, points, depth + 1);
    build(&mut right[1..], points, depth + 1);
}

fn project(gps: Gps, cos_ref: f64) -> [f64; 2] {
    [
        gps.lon * KM_PER_DEGREE * cos_ref,
        gps.lat * KM_PER_DEGREE,
    ]
}

fn distance_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

fn haversine_km(a: Gps, b: Gps) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Attaches the `nearest_station` feature.
pub struct NearestStationCalculator {
    index: Arc<StationIndex>,
}

impl NearestStationCalculator {
    pub fn new(index: Arc<StationIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl FeatureCalculator for NearestStationCalculator {
    fn name(&self) -> &str {
        NEAREST_STATION
    }

    async fn calculate(&self, listing: &Listing) -> Result<FeatureResult> {
        let (station, distance_km) = self
            .index
            .nearest(listing.gps)
            .ok_or_else(|| AppError::calculator(NEAREST_STATION, "station index is empty"))?;

        Ok(FeatureResult::NearestStation {
            station: station.to_string(),
            distance_km,
        })
    }
}
