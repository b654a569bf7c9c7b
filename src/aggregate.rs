//! Temporal, speed, occupancy and distance aggregates over an OD table.
//!
//! Every function here is a pure read of the trip slice and returns an owned
//! table. Empty input yields an empty table (or zero-filled rows where the
//! table has a fixed shape, like [`hourly_pickup_counts`]).

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::OdTrip;

/// Trips shorter than this are "short".
pub const SHORT_TRIP_KM: f64 = 4.0;
/// Trips longer than this are "long".
pub const LONG_TRIP_KM: f64 = 8.0;

/// Pickup count in one fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub start: NaiveDateTime,
    pub count: usize,
}

/// Mean trip speed for one hour of day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySpeed {
    pub hour: u32,
    pub avg_speed_kmh: f64,
    pub trips: usize,
}

/// Number of trips in progress at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancySample {
    pub time: NaiveDateTime,
    pub occupied: usize,
}

/// Trip counts per distance class for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyDistanceCounts {
    pub day: NaiveDate,
    /// Under 4 km
    pub short: usize,
    /// 4 to 8 km inclusive
    pub medium: usize,
    /// Over 8 km
    pub long: usize,
}

/// Pickups in one hour of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyPickups {
    pub hour: u32,
    pub demand: usize,
}

/// Headline numbers for a trip table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripSummary {
    pub trip_count: usize,
    pub mean_distance_km: Option<f64>,
    pub mean_duration_minutes: Option<f64>,
    /// Total distance over total hours, so long trips weigh more
    pub overall_speed_kmh: Option<f64>,
}

fn midnight(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN)
}

/// Count pickups per fixed-width bucket.
///
/// Buckets are aligned to midnight of the first pickup day and cover every
/// bucket from the first to the last pickup, empty ones included with count 0.
/// The counts always sum to `trips.len()`.
pub fn time_distribution(trips: &[OdTrip], bucket: Duration) -> Vec<TimeBucket> {
    let width = bucket.num_milliseconds();
    let (Some(first), Some(last)) = (
        trips.iter().map(|t| t.pickup_time).min(),
        trips.iter().map(|t| t.pickup_time).max(),
    ) else {
        return Vec::new();
    };
    if width <= 0 {
        return Vec::new();
    }

    let origin = midnight(first);
    let slot = |ts: NaiveDateTime| ((ts - origin).num_milliseconds() / width) as usize;

    let first_slot = slot(first);
    let mut counts = vec![0usize; slot(last) - first_slot + 1];
    for trip in trips {
        counts[slot(trip.pickup_time) - first_slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| TimeBucket {
            start: origin + Duration::milliseconds(width * (first_slot + i) as i64),
            count,
        })
        .collect()
}

/// Mean trip speed by pickup hour.
///
/// Trips at or above `max_speed_kmh` are physically implausible and left out.
/// Hours without surviving trips are absent from the output.
pub fn average_speed_by_hour(trips: &[OdTrip], max_speed_kmh: f64) -> Vec<HourlySpeed> {
    let mut by_hour: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for trip in trips {
        let speed = trip.avg_speed_kmh();
        if !(speed < max_speed_kmh) {
            continue;
        }
        let entry = by_hour.entry(trip.pickup_hour()).or_insert((0.0, 0));
        entry.0 += speed;
        entry.1 += 1;
    }

    by_hour
        .into_iter()
        .map(|(hour, (sum, n))| HourlySpeed {
            hour,
            avg_speed_kmh: sum / n as f64,
            trips: n,
        })
        .collect()
}

/// Count trips in progress at each sample of a one-day time axis.
///
/// The axis runs from midnight of the earliest pickup day to the following
/// midnight, both inclusive, every `resolution`. A trip counts at every sample
/// in `[pickup_time, dropoff_time]`; trips not entirely inside the axis window
/// are left out rather than clipped.
///
/// Each trip contributes +1 at its first covered sample and -1 after its last,
/// and a prefix sum turns those into counts, so the cost is linear in trips
/// plus samples.
pub fn occupied_vehicle_count(trips: &[OdTrip], resolution: Duration) -> Vec<OccupancySample> {
    let step = resolution.num_milliseconds();
    let Some(first) = trips.iter().map(|t| t.pickup_time).min() else {
        return Vec::new();
    };
    if step <= 0 {
        return Vec::new();
    }

    let start = midnight(first);
    let end = start + Duration::days(1);
    let span = (end - start).num_milliseconds();
    let samples = (span / step) as usize + 1;

    let mut delta = vec![0i64; samples + 1];
    for trip in trips {
        if trip.pickup_time < start || trip.dropoff_time > end {
            continue;
        }
        let from = (trip.pickup_time - start).num_milliseconds();
        let to = (trip.dropoff_time - start).num_milliseconds();
        let lo = ((from + step - 1) / step) as usize;
        let hi = ((to / step) as usize).min(samples - 1);
        if lo <= hi {
            delta[lo] += 1;
            delta[hi + 1] -= 1;
        }
    }

    let mut running = 0i64;
    (0..samples)
        .map(|i| {
            running += delta[i];
            OccupancySample {
                time: start + Duration::milliseconds(step * i as i64),
                occupied: running as usize,
            }
        })
        .collect()
}

/// Tally short/medium/long trips per calendar day of pickup.
pub fn distance_histogram(trips: &[OdTrip]) -> Vec<DailyDistanceCounts> {
    let mut by_day: BTreeMap<NaiveDate, DailyDistanceCounts> = BTreeMap::new();
    for trip in trips {
        let day = trip.pickup_time.date();
        let counts = by_day.entry(day).or_insert(DailyDistanceCounts {
            day,
            short: 0,
            medium: 0,
            long: 0,
        });
        if trip.distance_km < SHORT_TRIP_KM {
            counts.short += 1;
        } else if trip.distance_km <= LONG_TRIP_KM {
            counts.medium += 1;
        } else {
            counts.long += 1;
        }
    }
    by_day.into_values().collect()
}

/// Pickups per hour of day, all 24 hours present.
pub fn hourly_pickup_counts(trips: &[OdTrip]) -> Vec<HourlyPickups> {
    let mut counts = [0usize; 24];
    for trip in trips {
        counts[trip.pickup_hour() as usize] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(hour, &demand)| HourlyPickups {
            hour: hour as u32,
            demand,
        })
        .collect()
}

/// Count, mean distance, mean duration and aggregate speed of a trip table.
pub fn summarize_trips(trips: &[OdTrip]) -> TripSummary {
    if trips.is_empty() {
        return TripSummary::default();
    }
    let n = trips.len() as f64;
    let total_km: f64 = trips.iter().map(|t| t.distance_km).sum();
    let total_seconds: f64 = trips.iter().map(|t| t.duration_seconds).sum();

    TripSummary {
        trip_count: trips.len(),
        mean_distance_km: Some(total_km / n),
        mean_duration_minutes: Some(total_seconds / n / 60.0),
        overall_speed_kmh: Some(total_km / (total_seconds / 3600.0)),
    }
}
