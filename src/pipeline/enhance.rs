// src/pipeline/enhance.rs

//! Listing enhancement.
//!
//! Each [`FeatureCalculator`] attaches one named feature to a listing.
//! Calculators run in registration order, so a later one may read what an
//! earlier one produced. A failing calculator leaves its feature absent.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeatureResult, Listing};

/// Computes one derived attribute for a listing.
#[async_trait]
pub trait FeatureCalculator: Send + Sync {
    /// Key the result is stored under in [`Listing::features`].
    fn name(&self) -> &str;

    async fn calculate(&self, listing: &Listing) -> Result<FeatureResult>;
}

/// Outcome of enhancing one or more listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnhanceReport {
    /// Features successfully attached
    pub calculated: usize,
    /// `(listing id, calculator name)` for every failed calculation
    pub failures: Vec<(String, String)>,
}

impl EnhanceReport {
    fn merge(&mut self, other: EnhanceReport) {
        self.calculated += other.calculated;
        self.failures.extend(other.failures);
    }
}

/// Ordered list of calculators applied to every delta listing.
#[derive(Default)]
pub struct EnhancerPipeline {
    calculators: Vec<Box<dyn FeatureCalculator>>,
}

impl EnhancerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a calculator. A later calculator with the same name overwrites
    /// the earlier one's result.
    pub fn with_calculator(mut self, calculator: impl FeatureCalculator + 'static) -> Self {
        self.calculators.push(Box::new(calculator));
        self
    }

    /// Registered calculator names, in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.calculators.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }

    /// Run every calculator on one listing.
    pub async fn enhance(&self, listing: &mut Listing) -> EnhanceReport {
        let mut report = EnhanceReport::default();

        for calculator in &self.calculators {
            let name = calculator.name().to_string();
            match calculator.calculate(listing).await {
                Ok(feature) => {
                    listing.features.insert(name, feature);
                    report.calculated += 1;
                }
                Err(e) => {
                    log::warn!("Feature '{}' failed for listing {}: {}", name, listing.id, e);
                    listing.features.remove(&name);
                    report.failures.push((listing.id.clone(), name));
                }
            }
        }

        report
    }

    /// Run every calculator on each listing, one listing at a time.
    pub async fn enhance_all(&self, listings: &mut [Listing]) -> EnhanceReport {
        let mut report = EnhanceReport::default();
        for listing in listings.iter_mut() {
            report.merge(self.enhance(listing).await);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Gps, NEAREST_STATION};

    fn listing(id: &str) -> Listing {
        Listing {
            id: id.to_string(),
            price: 1,
            link: String::new(),
            gps: Gps::new(50.0, 14.0),
            name: None,
            locality: None,
            features: Default::default(),
        }
    }

    struct FixedStation(&'static str);

    #[async_trait]
    impl FeatureCalculator for FixedStation {
        fn name(&self) -> &str {
            NEAREST_STATION
        }

        async fn calculate(&self, _listing: &Listing) -> Result<FeatureResult> {
            Ok(FeatureResult::NearestStation {
                station: self.0.to_string(),
                distance_km: 0.5,
            })
        }
    }

    /// Echoes the station seen from the previous calculator.
    struct ReadsStation;

    #[async_trait]
    impl FeatureCalculator for ReadsStation {
        fn name(&self) -> &str {
            "echo"
        }

        async fn calculate(&self, listing: &Listing) -> Result<FeatureResult> {
            let (station, _) = listing
                .nearest_station()
                .ok_or_else(|| AppError::calculator("echo", "no station"))?;
            Ok(FeatureResult::NearestStation {
                station: station.to_string(),
                distance_km: 0.0,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl FeatureCalculator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn calculate(&self, _listing: &Listing) -> Result<FeatureResult> {
            Err(AppError::calculator("broken", "always fails"))
        }
    }

    #[tokio::test]
    async fn test_later_calculator_sees_earlier_feature() {
        let pipeline = EnhancerPipeline::new()
            .with_calculator(FixedStation("Beroun"))
            .with_calculator(ReadsStation);
        let mut item = listing("1");

        let report = pipeline.enhance(&mut item).await;

        assert_eq!(report.calculated, 2);
        assert!(report.failures.is_empty());
        assert!(matches!(
            item.feature("echo"),
            Some(FeatureResult::NearestStation { station, .. }) if station == "Beroun"
        ));
    }

    #[tokio::test]
    async fn test_order_matters() {
        let pipeline = EnhancerPipeline::new()
            .with_calculator(ReadsStation)
            .with_calculator(FixedStation("Beroun"));
        let mut item = listing("1");

        let report = pipeline.enhance(&mut item).await;

        assert_eq!(report.failures, vec![("1".to_string(), "echo".to_string())]);
        assert!(item.feature("echo").is_none());
        assert!(item.feature(NEAREST_STATION).is_some());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_others() {
        let pipeline = EnhancerPipeline::new()
            .with_calculator(Broken)
            .with_calculator(FixedStation("Kladno"));
        let mut items = vec![listing("1"), listing("2")];

        let report = pipeline.enhance_all(&mut items).await;

        assert_eq!(report.calculated, 2);
        assert_eq!(report.failures.len(), 2);
        for item in &items {
            assert!(item.feature("broken").is_none());
            assert_eq!(item.nearest_station().map(|(s, _)| s), Some("Kladno"));
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_noop() {
        let pipeline = EnhancerPipeline::new();
        let mut item = listing("1");

        assert!(pipeline.is_empty());
        assert_eq!(pipeline.enhance(&mut item).await, EnhanceReport::default());
        assert!(item.features.is_empty());
    }

    #[test]
    fn test_names_in_order() {
        let pipeline = EnhancerPipeline::new()
            .with_calculator(FixedStation("x"))
            .with_calculator(Broken);
        assert_eq!(pipeline.names(), vec![NEAREST_STATION, "broken"]);
    }
}
