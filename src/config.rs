//! Tunable parameters for every analysis stage.
//!
//! All structs deserialize with `#[serde(default)]`, so a JSON config file
//! only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{OdError, Result};
use crate::heatmap::HeatmapConfig;
use crate::Bounds;

/// Configuration for the data cleaner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Study area; records on or outside the edges are dropped.
    /// Default: Shenzhen (113.75..114.6 E, 22.4..22.85 N)
    pub bounds: Bounds,

    /// Records at or above this speed (km/h) are dropped.
    /// Default: 120.0
    pub max_speed_kmh: f64,

    /// Drop single readings whose status disagrees with both neighbours.
    /// Default: true
    pub remove_status_flips: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds {
                min_lat: 22.4,
                max_lat: 22.85,
                min_lng: 113.75,
                max_lng: 114.6,
            },
            max_speed_kmh: 120.0,
            remove_status_flips: true,
        }
    }
}

/// Distance metric used for DBSCAN neighbourhoods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Great-circle distance. Accurate at any latitude.
    #[default]
    Haversine,
    /// Planar distance on raw degrees scaled by 111 km/degree.
    /// Degraded precision: east-west distances are overstated away from the equator.
    Euclidean,
}

/// Configuration for pickup hotspot clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighbourhood radius in kilometers.
    /// Default: 0.3 km (about one city block cluster around a rank or mall entrance)
    pub eps_km: f64,

    /// Minimum neighbourhood size, the point itself included.
    /// Default: 5
    pub min_samples: usize,

    /// Default: haversine
    pub metric: DistanceMetric,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps_km: 0.3,
            min_samples: 5,
            metric: DistanceMetric::Haversine,
        }
    }
}

/// Configuration for temporal and occupancy aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Width of time distribution buckets in seconds.
    /// Default: 900 (15 minutes)
    pub bucket_seconds: i64,

    /// Spacing of the occupied-vehicle time axis in seconds.
    /// Default: 900 (15 minutes)
    pub occupancy_resolution_seconds: i64,

    /// Trips at or above this average speed (km/h) are left out of hourly speeds.
    /// Default: 120.0
    pub max_trip_speed_kmh: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            bucket_seconds: 900,
            occupancy_resolution_seconds: 900,
            max_trip_speed_kmh: 120.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub cleaning: CleaningConfig,
    pub clustering: ClusterConfig,
    pub aggregation: AggregationConfig,
    pub heatmap: HeatmapConfig,
    /// GeoJSON property holding the region name.
    /// Default: "qh"
    pub region_name_property: Option<String>,
}

impl AnalysisConfig {
    /// Parse a JSON config, filling unspecified values with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        let b = &self.cleaning.bounds;
        if !(b.min_lng < b.max_lng && b.min_lat < b.max_lat) {
            return Err(OdError::InvalidConfig(format!(
                "cleaning bounds are empty: lng {}..{}, lat {}..{}",
                b.min_lng, b.max_lng, b.min_lat, b.max_lat
            )));
        }
        if !(self.clustering.eps_km > 0.0 && self.clustering.eps_km.is_finite()) {
            return Err(OdError::InvalidConfig(format!(
                "eps_km must be positive, got {}",
                self.clustering.eps_km
            )));
        }
        if self.clustering.min_samples == 0 {
            return Err(OdError::InvalidConfig("min_samples must be at least 1".into()));
        }
        if self.aggregation.bucket_seconds <= 0
            || self.aggregation.occupancy_resolution_seconds <= 0
        {
            return Err(OdError::InvalidConfig(
                "bucket and occupancy resolutions must be positive".into(),
            ));
        }
        if self.heatmap.frame_seconds <= 0 || self.heatmap.cell_size_meters <= 0.0 {
            return Err(OdError::InvalidConfig(
                "heatmap frame width and cell size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn region_property(&self) -> &str {
        self.region_name_property.as_deref().unwrap_or("qh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert_eq!(AnalysisConfig::default().region_property(), "qh");
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = AnalysisConfig::from_json(
            r#"{"clustering": {"eps_km": 0.5, "metric": "euclidean"}, "aggregation": {"bucket_seconds": 3600}}"#,
        )
        .unwrap();
        assert_eq!(config.clustering.eps_km, 0.5);
        assert_eq!(config.clustering.min_samples, 5);
        assert_eq!(config.clustering.metric, DistanceMetric::Euclidean);
        assert_eq!(config.aggregation.bucket_seconds, 3600);
        assert_eq!(config.cleaning.max_speed_kmh, 120.0);
    }

    #[test]
    fn test_invalid_eps_rejected() {
        let result = AnalysisConfig::from_json(r#"{"clustering": {"eps_km": 0.0}}"#);
        assert!(matches!(result, Err(OdError::InvalidConfig(_))));
    }

    #[test]
    fn test_non_positive_resolutions_rejected() {
        let mut config = AnalysisConfig::default();
        config.aggregation.occupancy_resolution_seconds = 0;
        assert!(matches!(config.validate(), Err(OdError::InvalidConfig(_))));

        let mut config = AnalysisConfig::default();
        config.aggregation.bucket_seconds = -60;
        assert!(matches!(config.validate(), Err(OdError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_bounds_rejected() {
        let mut config = AnalysisConfig::default();
        config.cleaning.bounds.max_lat = config.cleaning.bounds.min_lat;
        assert!(config.validate().is_err());
    }
}
