//! End-to-end analysis: raw records in, every result table out.
//!
//! ```text
//! raw CSV ─► clean ─► reconstruct trips ─┬─► hotspots
//!    │                                   ├─► time / speed / occupancy / distance tables
//!    └─ fingerprint cache                ├─► region tables (when regions are loaded)
//!                                        └─► summary
//! ```

use std::path::Path;
use std::time::Instant;

use chrono::Duration;
use log::info;
use serde::Serialize;

use crate::aggregate::{
    average_speed_by_hour, distance_histogram, hourly_pickup_counts, occupied_vehicle_count,
    summarize_trips, time_distribution, DailyDistanceCounts, HourlyPickups, HourlySpeed,
    OccupancySample, TimeBucket, TripSummary,
};
use crate::cache::{Fingerprint, TraceCache};
use crate::cleaner::{clean_records, CleanedTrace, CleaningStats};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::heatmap::{generate_heatmap_frames, HeatmapFrames};
use crate::hotspot::{cluster_trips, HotspotResult};
use crate::io;
use crate::region::{
    HourlyDemand, HourlyRegionDemand, RegionAssignment, RegionIndex, RegionPairCount,
};
use crate::trips::{reconstruct_trips, ExtractionStats};
use crate::{OdTrip, RawRecord};

/// Region-pair tables, present when the analyzer has regions loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionTables {
    pub assignments: Vec<RegionAssignment>,
    pub pairs: Vec<RegionPairCount>,
    pub hourly: Vec<HourlyRegionDemand>,
    pub by_hour: Vec<HourlyDemand>,
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub cleaning: CleaningStats,
    pub extraction: ExtractionStats,
    pub trips: Vec<OdTrip>,
    pub hotspots: HotspotResult,
    pub time_distribution: Vec<TimeBucket>,
    pub hourly_speed: Vec<HourlySpeed>,
    pub occupancy: Vec<OccupancySample>,
    pub distance_histogram: Vec<DailyDistanceCounts>,
    pub hourly_pickups: Vec<HourlyPickups>,
    pub summary: TripSummary,
    pub regions: Option<RegionTables>,
    pub heatmap: Option<HeatmapFrames>,
}

impl AnalysisReport {
    pub fn raw_records(&self) -> usize {
        self.cleaning.input
    }

    pub fn cleaned_records(&self) -> usize {
        self.cleaning.output
    }
}

/// Runs the full analysis with a fixed configuration.
pub struct Analyzer {
    config: AnalysisConfig,
    regions: Option<RegionIndex>,
    heatmap: bool,
    cache: TraceCache,
}

impl Analyzer {
    /// Create an analyzer, rejecting an invalid configuration up front.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            regions: None,
            heatmap: false,
            cache: TraceCache::default(),
        })
    }

    /// Join trip endpoints against these regions.
    pub fn with_regions(mut self, regions: RegionIndex) -> Self {
        self.regions = Some(regions);
        self
    }

    /// Also build heatmap frames from the cleaned trace.
    pub fn with_heatmap(mut self, enabled: bool) -> Self {
        self.heatmap = enabled;
        self
    }

    /// Replace the default cleaned-trace cache.
    pub fn with_cache(mut self, cache: TraceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Clean and analyse records already in memory. Bypasses the cache.
    pub fn analyze_records(&self, raw: &[RawRecord]) -> Result<AnalysisReport> {
        let trace = clean_records(raw, &self.config.cleaning)?;
        self.analyze_trace(&trace)
    }

    /// Parse, clean and analyse a CSV export, reusing a cached cleaned trace
    /// when the same bytes were cleaned with the same parameters.
    pub fn analyze_bytes(&mut self, input: &[u8]) -> Result<AnalysisReport> {
        let key = Fingerprint::compute(input, &self.config.cleaning)?;
        if let Some(trace) = self.cache.get(&key) {
            info!("[Analyzer] Cache hit for {:016x}", key.0);
            let trace = trace.clone();
            return self.analyze_trace(&trace);
        }

        let raw = io::read_raw_records(input)?;
        let trace = clean_records(&raw, &self.config.cleaning)?;
        let report = self.analyze_trace(&trace)?;
        self.cache.insert(key, trace);
        Ok(report)
    }

    /// Read a CSV export from disk and analyse it.
    pub fn analyze_path(&mut self, path: &Path) -> Result<AnalysisReport> {
        let bytes = io::read_bytes(path)?;
        info!("[Analyzer] Read {} bytes from {}", bytes.len(), path.display());
        self.analyze_bytes(&bytes)
    }

    fn analyze_trace(&self, trace: &CleanedTrace) -> Result<AnalysisReport> {
        let start = Instant::now();
        let stats = &trace.stats;
        info!(
            "[Analyzer] Cleaned {} -> {} records ({} duplicates, {} out of bounds, {} over speed, {} status flips)",
            stats.input,
            stats.output,
            stats.duplicates,
            stats.out_of_bounds,
            stats.over_speed,
            stats.status_flips
        );

        let extraction = reconstruct_trips(&trace.records)?;
        info!(
            "[Analyzer] {} trips from {} vehicles ({} unmatched events)",
            extraction.trips.len(),
            extraction.stats.vehicles,
            extraction.stats.unmatched_events
        );

        let trips = extraction.trips;
        let hotspots = cluster_trips(&trips, &self.config.clustering);
        info!(
            "[Analyzer] {} hotspots, {} noise pickups",
            hotspots.cluster_count, hotspots.noise_count
        );

        let agg = &self.config.aggregation;
        let time_dist = time_distribution(&trips, Duration::seconds(agg.bucket_seconds));
        let hourly_speed = average_speed_by_hour(&trips, agg.max_trip_speed_kmh);
        let occupancy =
            occupied_vehicle_count(&trips, Duration::seconds(agg.occupancy_resolution_seconds));
        let histogram = distance_histogram(&trips);
        let hourly_pickups = hourly_pickup_counts(&trips);
        let summary = summarize_trips(&trips);

        let regions = self.regions.as_ref().map(|index| {
            let tables = RegionTables {
                assignments: index.assign_regions(&trips),
                pairs: index.od_region_counts(&trips),
                hourly: index.hourly_region_demand(&trips),
                by_hour: index.demand_by_hour(&trips),
            };
            info!(
                "[Analyzer] {} region pairs over {} regions",
                tables.pairs.len(),
                index.len()
            );
            tables
        });

        let heatmap = self
            .heatmap
            .then(|| generate_heatmap_frames(&trace.records, &self.config.heatmap));

        info!("[Analyzer] Analysis finished in {:?}", start.elapsed());

        Ok(AnalysisReport {
            cleaning: trace.stats.clone(),
            extraction: extraction.stats,
            trips,
            hotspots,
            time_distribution: time_dist,
            hourly_speed,
            occupancy,
            distance_histogram: histogram,
            hourly_pickups,
            summary,
            regions,
            heatmap,
        })
    }
}
