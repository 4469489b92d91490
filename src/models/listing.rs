//! Listing data structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::feature::{COMMUTE_TIME, FeatureResult, NEAREST_STATION, RouteSummary};

/// WGS84 coordinates of a listing or station.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Gps {
    pub lat: f64,
    pub lon: f64,
}

impl Gps {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single listing fetched from the source.
///
/// `features` is only ever written by the enhancer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    /// Stable identifier, the last segment of the source's resource path
    pub id: String,

    /// Asking price
    pub price: i64,

    /// Canonical detail URL
    pub link: String,

    /// Listing location
    pub gps: Gps,

    /// Listing headline, display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human readable locality, display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,

    /// Derived features keyed by calculator name
    #[serde(default)]
    pub features: BTreeMap<String, FeatureResult>,
}

impl Listing {
    /// Map one raw page record into a listing.
    ///
    /// Fails with [`AppError::Validation`] when a required field is missing
    /// or has the wrong type.
    pub fn from_record(record: &Value, detail_url: &str) -> Result<Self> {
        let href = record
            .pointer("/_links/self/href")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("record has no _links.self.href"))?;
        let id = extract_id(href)
            .ok_or_else(|| AppError::validation(format!("cannot derive id from '{href}'")))?;

        let price = record
            .pointer("/price_czk/value_raw")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or_else(|| AppError::validation(format!("listing {id} has no price")))?;

        let seo_locality = record
            .pointer("/seo/locality")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation(format!("listing {id} has no seo.locality")))?;

        let gps = extract_gps(record.get("gps"))
            .ok_or_else(|| AppError::validation(format!("listing {id} has no gps")))?;

        Ok(Self {
            link: format!(
                "{}/{}/{}",
                detail_url.trim_end_matches('/'),
                seo_locality,
                id
            ),
            id,
            price,
            gps,
            name: record.get("name").and_then(Value::as_str).map(str::to_string),
            locality: record
                .get("locality")
                .and_then(Value::as_str)
                .map(str::to_string),
            features: BTreeMap::new(),
        })
    }

    /// Look up a computed feature by calculator name.
    pub fn feature(&self, name: &str) -> Option<&FeatureResult> {
        self.features.get(name)
    }

    /// Nearest station name and distance in kilometres, if computed.
    pub fn nearest_station(&self) -> Option<(&str, f64)> {
        match self.feature(NEAREST_STATION)? {
            FeatureResult::NearestStation {
                station,
                distance_km,
            } => Some((station.as_str(), *distance_km)),
            _ => None,
        }
    }

    /// Commute route, if computed. `Some(None)` means no route exists.
    pub fn commute(&self) -> Option<Option<&RouteSummary>> {
        match self.feature(COMMUTE_TIME)? {
            FeatureResult::Commute { route, .. } => Some(route.as_ref()),
            _ => None,
        }
    }

    /// Format listing for display using a template.
    ///
    /// Supported placeholders:
    /// - `{id}`, `{price}`, `{link}`, `{name}`, `{locality}`
    /// - `{station}`, `{station_km}`, `{minutes}`, `{transfers}`
    pub fn format(&self, template: &str) -> String {
        let (station, station_km) = self
            .nearest_station()
            .map(|(name, km)| (name.to_string(), format!("{km:.1}")))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        let (minutes, transfers) = match self.commute() {
            Some(Some(route)) => (route.minutes.to_string(), route.transfers.to_string()),
            Some(None) => ("unreachable".to_string(), "-".to_string()),
            None => ("-".to_string(), "-".to_string()),
        };

        template
            .replace("{id}", &self.id)
            .replace("{price}", &self.price.to_string())
            .replace("{link}", &self.link)
            .replace("{name}", self.name.as_deref().unwrap_or(""))
            .replace("{locality}", self.locality.as_deref().unwrap_or(""))
            .replace("{station}", &station)
            .replace("{station_km}", &station_km)
            .replace("{minutes}", &minutes)
            .replace("{transfers}", &transfers)
    }
}

fn extract_id(href: &str) -> Option<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Accepts both `{"lat": .., "lon": ..}` and `[lat, lon]`.
fn extract_gps(value: Option<&Value>) -> Option<Gps> {
    match value? {
        Value::Object(map) => Some(Gps::new(
            map.get("lat")?.as_f64()?,
            map.get("lon")?.as_f64()?,
        )),
        Value::Array(pair) if pair.len() == 2 => {
            Some(Gps::new(pair[0].as_f64()?, pair[1].as_f64()?))
        }
        _ => None,
    }
}
