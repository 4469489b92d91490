// src/pipeline/filter.rs

//! Emission filters.
//!
//! A filter decides whether an enhanced delta listing becomes a hit. Any
//! `Fn(&Listing) -> bool` closure is a filter; [`RuleFilter`] builds one
//! from configuration.

use crate::models::{FilterConfig, FilterRule, Listing};

/// Predicate applied to enhanced listings.
///
/// `Send + Sync` so the watcher can be moved between tasks.
pub trait ListingFilter: Send + Sync {
    fn matches(&self, listing: &Listing) -> bool;
}

impl<F> ListingFilter for F
where
    F: Fn(&Listing) -> bool + Send + Sync,
{
    fn matches(&self, listing: &Listing) -> bool {
        self(listing)
    }
}

/// Matches when any configured rule holds. No rules matches everything.
///
/// Constraints on features the listing lacks never hold, so a listing whose
/// station or commute calculation failed only passes rules that ignore it.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    rules: Vec<FilterRule>,
}

impl RuleFilter {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.rules.clone())
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }
}

impl ListingFilter for RuleFilter {
    fn matches(&self, listing: &Listing) -> bool {
        self.rules.is_empty() || self.rules.iter().any(|rule| rule_matches(rule, listing))
    }
}

fn rule_matches(rule: &FilterRule, listing: &Listing) -> bool {
    let price_ok = rule.max_price.is_none_or(|max| listing.price < max);

    let station = listing.nearest_station();
    let distance_ok = rule
        .max_station_km
        .is_none_or(|max| station.is_some_and(|(_, km)| km < max));
    let name_ok = rule
        .station
        .as_deref()
        .is_none_or(|wanted| station.is_some_and(|(name, _)| name == wanted));

    let commute_ok = rule.max_commute_minutes.is_none_or(|max| {
        listing
            .commute()
            .flatten()
            .is_some_and(|route| route.minutes < max)
    });

    price_ok && distance_ok && name_ok && commute_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{COMMUTE_TIME, FeatureResult, Gps, NEAREST_STATION, RouteSummary};

    fn listing(price: i64) -> Listing {
        Listing {
            id: "1".into(),
            price,
            link: String::new(),
            gps: Gps::new(50.0, 14.0),
            name: None,
            locality: None,
            features: Default::default(),
        }
    }

    fn with_station(mut listing: Listing, station: &str, km: f64) -> Listing {
        listing.features.insert(
            NEAREST_STATION.into(),
            FeatureResult::NearestStation {
                station: station.into(),
                distance_km: km,
            },
        );
        listing
    }

    fn with_commute(mut listing: Listing, minutes: Option<u32>) -> Listing {
        listing.features.insert(
            COMMUTE_TIME.into(),
            FeatureResult::Commute {
                from_station: "A".into(),
                to_station: "B".into(),
                route: minutes.map(|minutes| RouteSummary {
                    minutes,
                    transfers: 0,
                    path_info: String::new(),
                }),
            },
        );
        listing
    }

    #[test]
    fn test_closure_is_a_filter() {
        let cheap = |l: &Listing| l.price < 10_000_000;
        assert!(cheap.matches(&listing(9_000_000)));
        assert!(!cheap.matches(&listing(12_000_000)));
    }

    #[test]
    fn test_no_rules_matches_everything() {
        assert!(RuleFilter::default().matches(&listing(i64::MAX)));
    }

    #[test]
    fn test_price_bound_is_strict() {
        let filter = RuleFilter::new(vec![FilterRule {
            max_price: Some(100),
            ..Default::default()
        }]);
        assert!(filter.matches(&listing(99)));
        assert!(!filter.matches(&listing(100)));
    }

    #[test]
    fn test_all_constraints_in_rule_must_hold() {
        let filter = RuleFilter::new(vec![FilterRule {
            max_price: Some(5_000_000),
            max_station_km: Some(1.0),
            station: Some("Beroun".into()),
            ..Default::default()
        }]);

        assert!(filter.matches(&with_station(listing(4_000_000), "Beroun", 0.5)));
        assert!(!filter.matches(&with_station(listing(4_000_000), "Beroun", 1.5)));
        assert!(!filter.matches(&with_station(listing(4_000_000), "Kladno", 0.5)));
        assert!(!filter.matches(&listing(4_000_000)));
    }

    #[test]
    fn test_any_rule_may_match() {
        let filter = RuleFilter::new(vec![
            FilterRule {
                max_price: Some(3_000_000),
                ..Default::default()
            },
            FilterRule {
                max_commute_minutes: Some(45),
                ..Default::default()
            },
        ]);

        assert!(filter.matches(&listing(2_000_000)));
        assert!(filter.matches(&with_commute(listing(9_000_000), Some(30))));
        assert!(!filter.matches(&with_commute(listing(9_000_000), Some(60))));
        assert!(!filter.matches(&with_commute(listing(9_000_000), None)));
        assert!(!filter.matches(&listing(9_000_000)));
    }

    #[test]
    fn test_from_config() {
        let config: FilterConfig = toml::from_str(
            r#"
            [[rules]]
            max_price = 100
            "#,
        )
        .unwrap();
        let filter = RuleFilter::from_config(&config);
        assert_eq!(filter.rules().len(), 1);
        assert!(filter.matches(&listing(1)));
    }
}
