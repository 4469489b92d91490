// src/services/routing.rs

//! Transit routing service client.
//!
//! Asks the routing provider for connections between two stops on the next
//! business day and keeps the fastest itinerary.

use async_trait::async_trait;
use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{RouteSummary, RoutingConfig};

/// Date format expected by the routing provider.
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Route lookup between two named stops.
#[async_trait]
pub trait RouteFinder: Send + Sync {
    /// Fastest route, or `None` when the provider has no itinerary.
    async fn best_route(&self, from: &str, to: &str) -> Result<Option<RouteSummary>>;
}

/// HTTP client for the routing provider.
pub struct RoutingClient {
    client: reqwest::Client,
    endpoint: url::Url,
    query: Vec<(String, String)>,
}

impl RoutingClient {
    pub fn new(client: reqwest::Client, config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: url::Url::parse(&config.url_base)?,
            query: config.query.clone(),
        })
    }

    fn route_url(&self, from: &str, to: &str, date: NaiveDate) -> url::Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
            pairs
                .append_pair("stop_from", from)
                .append_pair("stop_to", to)
                .append_pair("date", &date.format(DATE_FORMAT).to_string());
        }
        url
    }

    /// Fastest route on a specific date.
    pub async fn best_route_on(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Option<RouteSummary>> {
        let url = self.route_url(from, to, date);
        log::debug!("Routing {} -> {} via {}", from, to, url);

        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_routes(&body)
    }
}

#[async_trait]
impl RouteFinder for RoutingClient {
    async fn best_route(&self, from: &str, to: &str) -> Result<Option<RouteSummary>> {
        let date = next_business_day(Local::now().date_naive());
        self.best_route_on(from, to, date).await
    }
}

/// Pick the fastest itinerary from a provider response.
///
/// Ties go to the itinerary listed first.
pub fn parse_routes(body: &Value) -> Result<Option<RouteSummary>> {
    let Some(itineraries) = body.get("data").and_then(Value::as_array) else {
        return Ok(None);
    };

    let mut best: Option<(u32, &Value)> = None;
    for itinerary in itineraries {
        let Some(minutes) = itinerary
            .get("timeLength")
            .and_then(Value::as_str)
            .and_then(parse_duration)
        else {
            log::warn!("Skipping itinerary without a usable timeLength");
            continue;
        };
        if best.is_none_or(|(best_minutes, _)| minutes < best_minutes) {
            best = Some((minutes, itinerary));
        }
    }

    let Some((minutes, itinerary)) = best else {
        return Ok(None);
    };

    let transfers_text = itinerary
        .get("transfers")
        .and_then(Value::as_str)
        .unwrap_or("bez přestupu");
    let transfers = parse_transfers(transfers_text)
        .ok_or_else(|| AppError::routing(format!("unparsable transfers '{transfers_text}'")))?;

    Ok(Some(RouteSummary {
        minutes,
        transfers,
        path_info: path_info(itinerary, transfers),
    }))
}

/// Minutes in a duration like `"1 hod 25 min"`. Unknown units are ignored.
///
/// `None` when nothing matched or the total does not fit in a `u32`.
pub fn parse_duration(text: &str) -> Option<u32> {
    let pattern = Regex::new(r"(\d+)\s*(hod|min)").ok()?;

    let mut total: Option<u32> = None;
    for caps in pattern.captures_iter(text) {
        let value: u32 = caps[1].parse().ok()?;
        let minutes = match &caps[2] {
            "hod" => value.checked_mul(60)?,
            _ => value,
        };
        total = Some(total.unwrap_or(0).checked_add(minutes)?);
    }
    total
}

/// Transfer count from text like `"2 přestupy"`; `"bez přestupu"` is zero.
pub fn parse_transfers(text: &str) -> Option<u32> {
    let first = text.split_whitespace().next()?;
    if first.starts_with("bez") {
        return Some(0);
    }
    first.parse().ok()
}

/// The first `transfers + 1` legs as `from->to (class)` lines.
fn path_info(itinerary: &Value, transfers: u32) -> String {
    let Some(legs) = itinerary.get("route").and_then(Value::as_array) else {
        return String::new();
    };

    legs.iter()
        .take(transfers as usize + 1)
        .map(|leg| {
            format!(
                "{}->{} ({})",
                leg_field(leg, "displayStation"),
                leg_field(leg, "destinationStation"),
                leg_field(leg, "class")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leg_field<'a>(leg: &'a Value, name: &str) -> &'a str {
    leg.get(name).and_then(Value::as_str).unwrap_or("?")
}

/// The next Monday-to-Friday date after `today`.
pub fn next_business_day(today: NaiveDate) -> NaiveDate {
    let mut day = today + Days::new(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day + Days::new(1);
    }
    day
}
