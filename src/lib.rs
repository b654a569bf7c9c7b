//! # Taxi OD
//!
//! Origin-destination (OD) extraction and demand analysis for taxi GPS probe data.
//!
//! This library provides:
//! - Cleaning of raw probe records (validation, bounding box, speed, dedup, status flips)
//! - Trip reconstruction from per-vehicle occupancy status traces
//! - Density-based (DBSCAN) clustering of pickups into demand hotspots
//! - Temporal, speed, occupancy and distance aggregates over the OD table
//! - Point-in-polygon joins of trip endpoints against administrative regions
//! - Per-minute gridded heatmap frames for dynamic map rendering
//!
//! ## Features
//!
//! - **`parallel`** - Reconstruct trips for each vehicle in parallel with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use taxi_od::{GpsRecord, OccupancyStatus, reconstruct_trips};
//!
//! let t = |s| NaiveDate::from_ymd_opt(2014, 10, 22).unwrap().and_hms_opt(8, 0, s).unwrap();
//! let trace = vec![
//!     GpsRecord::new("22223", t(0), 114.05, 22.54, OccupancyStatus::Vacant, 30.0),
//!     GpsRecord::new("22223", t(10), 114.06, 22.55, OccupancyStatus::Occupied, 0.0),
//!     GpsRecord::new("22223", t(50), 114.08, 22.56, OccupancyStatus::Vacant, 12.0),
//! ];
//!
//! let extraction = reconstruct_trips(&trace).unwrap();
//! assert_eq!(extraction.trips.len(), 1);
//! assert_eq!(extraction.trips[0].duration_seconds, 40.0);
//! ```

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OdError, OptionExt, Result};

// Geographic utilities (haversine, bounds, centers, dispersion)
pub mod geo_utils;

// Tunable parameters for every stage
pub mod config;
pub use config::{
    AggregationConfig, AnalysisConfig, CleaningConfig, ClusterConfig, DistanceMetric,
};

// Raw record validation and filtering
pub mod cleaner;
pub use cleaner::{clean_records, CleanedTrace, CleaningStats};

// Per-vehicle trip reconstruction
pub mod trips;
pub use trips::{reconstruct_trips, ExtractionStats, TripExtraction};

// Density-based pickup hotspot clustering
pub mod hotspot;
pub use hotspot::{cluster_pickups, cluster_trips, Hotspot, HotspotResult, PickupPoint, NOISE};

// Temporal, speed, occupancy and distance aggregates
pub mod aggregate;
pub use aggregate::{
    average_speed_by_hour, distance_histogram, hourly_pickup_counts, occupied_vehicle_count,
    summarize_trips, time_distribution, DailyDistanceCounts, HourlyPickups, HourlySpeed,
    OccupancySample, TimeBucket, TripSummary,
};

// Region point-in-polygon join
pub mod region;
pub use region::{HourlyDemand, HourlyRegionDemand, RegionAssignment, RegionIndex, RegionPairCount};

// Dynamic heatmap frames
pub mod heatmap;
pub use heatmap::{generate_heatmap_frames, HeatmapCell, HeatmapConfig, HeatmapFrame, HeatmapFrames};

// Cleaned-trace cache keyed by input fingerprint
pub mod cache;
pub use cache::{Fingerprint, TraceCache};

// CSV/JSON reading and writing
pub mod io;

// End-to-end analysis
pub mod pipeline;
pub use pipeline::{AnalysisReport, Analyzer, RegionTables};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in WGS84 degrees.
///
/// Coordinates are ordered longitude first, matching the column order of
/// taxi probe exports.
///
/// # Example
/// ```
/// use taxi_od::GpsPoint;
/// let point = GpsPoint::new(114.0579, 22.5429); // Shenzhen
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GpsPoint {
    /// Create a new point from longitude and latitude.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. Returns `None` for empty input.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Strict containment, the rule used by the cleaning bounding box.
    pub fn contains_strict(&self, point: &GpsPoint) -> bool {
        point.longitude > self.min_lng
            && point.longitude < self.max_lng
            && point.latitude > self.min_lat
            && point.latitude < self.max_lat
    }
}

/// Whether a vehicle is carrying a passenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupancyStatus {
    Vacant,
    Occupied,
}

impl OccupancyStatus {
    /// Parse the 0/1 flag used in probe exports.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OccupancyStatus::Vacant),
            1 => Some(OccupancyStatus::Occupied),
            _ => None,
        }
    }

    pub fn code(self) -> i8 {
        match self {
            OccupancyStatus::Vacant => 0,
            OccupancyStatus::Occupied => 1,
        }
    }
}

/// One row of a probe export exactly as read, before validation.
///
/// Column names follow the common Shenzhen taxi export layout
/// (`id,time,long,lati,status,speed[,head]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub long: Option<f64>,
    #[serde(default)]
    pub lati: Option<f64>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub head: Option<f64>,
}

/// A validated GPS probe reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsRecord {
    pub vehicle_id: String,
    pub timestamp: NaiveDateTime,
    pub longitude: f64,
    pub latitude: f64,
    pub status: OccupancyStatus,
    /// Instantaneous speed in km/h
    pub speed: f64,
    /// Heading in degrees, when the export carries one
    pub heading: Option<f64>,
}

impl GpsRecord {
    /// Create a record without heading.
    pub fn new(
        vehicle_id: &str,
        timestamp: NaiveDateTime,
        longitude: f64,
        latitude: f64,
        status: OccupancyStatus,
        speed: f64,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            timestamp,
            longitude,
            latitude,
            status,
            speed,
            heading: None,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.longitude, self.latitude)
    }
}

/// A reconstructed passenger trip between a pickup and its matching dropoff.
///
/// Invariants: `duration_seconds > 0`, `distance_km > 0` and
/// `dropoff_time > pickup_time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OdTrip {
    pub vehicle_id: String,
    pub pickup_time: NaiveDateTime,
    pub pickup_lon: f64,
    pub pickup_lat: f64,
    pub pickup_speed: f64,
    pub pickup_heading: f64,
    pub dropoff_time: NaiveDateTime,
    pub dropoff_lon: f64,
    pub dropoff_lat: f64,
    pub dropoff_speed: f64,
    pub dropoff_heading: f64,
    pub duration_seconds: f64,
    /// Straight-line (great-circle) distance between pickup and dropoff
    pub distance_km: f64,
}

impl OdTrip {
    pub fn pickup_point(&self) -> GpsPoint {
        GpsPoint::new(self.pickup_lon, self.pickup_lat)
    }

    pub fn dropoff_point(&self) -> GpsPoint {
        GpsPoint::new(self.dropoff_lon, self.dropoff_lat)
    }

    /// Average speed over the trip in km/h.
    pub fn avg_speed_kmh(&self) -> f64 {
        self.distance_km / (self.duration_seconds / 3600.0)
    }

    /// Hour of day (0-23) of the pickup.
    pub fn pickup_hour(&self) -> u32 {
        self.pickup_time.hour()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
