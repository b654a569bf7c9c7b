//! Time-sliced density heatmap frames.
//!
//! Cleaned GPS readings are bucketed into fixed-width time frames (one minute
//! by default). Within each frame points are snapped to a sparse metric grid
//! and counted per cell, giving a sequence of frames a map client can animate.
//!
//! ## Overview
//!
//! | Step | What happens |
//! |------|--------------|
//! | Frame | `timestamp` floored to `frame_seconds` (Unix seconds, naive time read as UTC) |
//! | Sample | Frames over `max_points_per_frame` keep an evenly strided subset |
//! | Grid | Points snapped to `cell_size_meters` cells anchored on the first latitude |
//! | Normalise | `density = count / max count over all frames` |
//!
//! Sampling is deterministic, so the same trace always renders the same frames.

use std::collections::{BTreeMap, HashMap};

use log::info;
use serde::{Deserialize, Serialize};

use crate::geo_utils::meters_to_degrees;
use crate::{Bounds, GpsPoint, GpsRecord};

/// Meters per degree of latitude used for grid snapping.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Configuration for heatmap frame generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Grid cell size in meters (default: 200m)
    pub cell_size_meters: f64,
    /// Frame width in seconds (default: 60)
    pub frame_seconds: i64,
    /// Points kept per frame; 0 keeps everything (default: 200)
    pub max_points_per_frame: usize,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: 200.0,
            frame_seconds: 60,
            max_points_per_frame: 200,
        }
    }
}

/// A single occupied cell in one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    /// Grid row index
    pub row: i32,
    /// Grid column index
    pub col: i32,
    /// Cell center for rendering
    pub center_lat: f64,
    pub center_lng: f64,
    /// Points in this cell during the frame
    pub count: u32,
    /// Normalized density (0.0-1.0) against the busiest cell of any frame
    pub density: f32,
}

/// All occupied cells for one time frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapFrame {
    /// Frame start (Unix seconds)
    pub timestamp: i64,
    /// Points rendered after sampling
    pub point_count: usize,
    /// Sparse cells, ordered by (row, col)
    pub cells: Vec<HeatmapCell>,
}

/// Complete frame sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeatmapFrames {
    /// Frame start times in ascending order
    pub time_series: Vec<i64>,
    pub frames: Vec<HeatmapFrame>,
    /// First frame start, 0 when empty
    pub min_time: i64,
    /// Last frame start, 0 when empty
    pub max_time: i64,
    /// Largest cell count, the density denominator
    pub max_count: u32,
    /// Extent of all readings, for fitting the map view
    pub bounds: Option<Bounds>,
}

/// Grid coordinate
type CellCoord = (i32, i32);

/// Metric grid anchored on a reference latitude.
struct FrameGrid {
    ref_lat: f64,
    /// Cell height in degrees of latitude
    lat_step: f64,
    /// Cell width in degrees of longitude at `ref_lat`
    lng_step: f64,
}

impl FrameGrid {
    fn new(cell_size_meters: f64, ref_lat: f64) -> Self {
        Self {
            ref_lat,
            lat_step: cell_size_meters / METERS_PER_DEGREE,
            lng_step: meters_to_degrees(cell_size_meters, ref_lat),
        }
    }

    fn to_grid_coords(&self, lat: f64, lng: f64) -> CellCoord {
        let row = ((lat - self.ref_lat) / self.lat_step).floor() as i32;
        let col = (lng / self.lng_step).floor() as i32;
        (row, col)
    }

    fn cell_center(&self, row: i32, col: i32) -> (f64, f64) {
        let center_lat = self.ref_lat + (row as f64 + 0.5) * self.lat_step;
        let center_lng = (col as f64 + 0.5) * self.lng_step;
        (center_lat, center_lng)
    }
}

/// Keep at most `limit` items, evenly spaced across the slice.
fn stride_sample<'a>(points: &[&'a GpsRecord], limit: usize) -> Vec<&'a GpsRecord> {
    let n = points.len();
    if limit == 0 || n <= limit {
        return points.to_vec();
    }
    (0..limit).map(|i| points[i * n / limit]).collect()
}

fn frame_start(record: &GpsRecord, frame_seconds: i64) -> i64 {
    let secs = record.timestamp.and_utc().timestamp();
    secs.div_euclid(frame_seconds) * frame_seconds
}

/// Build per-frame density grids from cleaned GPS readings.
///
/// Empty input, or a non-positive frame width or cell size, yields an empty
/// result.
pub fn generate_heatmap_frames(records: &[GpsRecord], config: &HeatmapConfig) -> HeatmapFrames {
    let Some(first) = records.first() else {
        return HeatmapFrames::default();
    };
    if config.frame_seconds <= 0 || config.cell_size_meters <= 0.0 {
        return HeatmapFrames::default();
    }

    let grid = FrameGrid::new(config.cell_size_meters, first.latitude);

    let mut by_frame: BTreeMap<i64, Vec<&GpsRecord>> = BTreeMap::new();
    for record in records {
        by_frame
            .entry(frame_start(record, config.frame_seconds))
            .or_default()
            .push(record);
    }

    let mut counted: Vec<(i64, usize, BTreeMap<CellCoord, u32>)> =
        Vec::with_capacity(by_frame.len());
    let mut max_count = 0u32;
    for (timestamp, points) in by_frame {
        let sampled = stride_sample(&points, config.max_points_per_frame);
        let mut cells: HashMap<CellCoord, u32> = HashMap::new();
        for record in &sampled {
            *cells
                .entry(grid.to_grid_coords(record.latitude, record.longitude))
                .or_insert(0) += 1;
        }
        max_count = max_count.max(cells.values().copied().max().unwrap_or(0));
        counted.push((timestamp, sampled.len(), cells.into_iter().collect()));
    }

    let denominator = max_count.max(1) as f32;
    let frames: Vec<HeatmapFrame> = counted
        .into_iter()
        .map(|(timestamp, point_count, cells)| HeatmapFrame {
            timestamp,
            point_count,
            cells: cells
                .into_iter()
                .map(|((row, col), count)| {
                    let (center_lat, center_lng) = grid.cell_center(row, col);
                    HeatmapCell {
                        row,
                        col,
                        center_lat,
                        center_lng,
                        count,
                        density: count as f32 / denominator,
                    }
                })
                .collect(),
        })
        .collect();

    let time_series: Vec<i64> = frames.iter().map(|f| f.timestamp).collect();
    info!(
        "[Heatmap] {} readings -> {} frames (max cell count {})",
        records.len(),
        frames.len(),
        max_count
    );

    let points: Vec<GpsPoint> = records.iter().map(GpsRecord::point).collect();

    HeatmapFrames {
        bounds: Bounds::from_points(&points),
        min_time: time_series.first().copied().unwrap_or(0),
        max_time: time_series.last().copied().unwrap_or(0),
        time_series,
        frames,
        max_count,
    }
}
