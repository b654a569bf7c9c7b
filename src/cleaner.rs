//! Raw record validation and filtering.
//!
//! Turns [`RawRecord`]s into a trace the trip reconstructor can trust:
//!
//! 1. every record carries id, time, coordinates, status and speed
//!    (a missing or malformed field aborts the run)
//! 2. readings outside the study area or at/above the speed ceiling are dropped
//! 3. duplicate `(vehicle, timestamp)` readings among the rest are dropped,
//!    first one wins
//! 4. the trace is sorted by `(vehicle, timestamp)`
//! 5. isolated single-reading status flips are dropped

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info};
use serde::Serialize;

use crate::config::CleaningConfig;
use crate::error::{OdError, OptionExt, Result};
use crate::{GpsRecord, OccupancyStatus, RawRecord};

/// Full date-time layouts accepted in the `time` column.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Per-rule drop counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    pub input: usize,
    pub duplicates: usize,
    pub out_of_bounds: usize,
    pub over_speed: usize,
    pub status_flips: usize,
    pub output: usize,
}

/// A validated trace sorted by `(vehicle_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedTrace {
    pub records: Vec<GpsRecord>,
    pub stats: CleaningStats,
}

/// Parse a probe timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (optionally with fractional seconds, a `T`
/// separator or slashes) and bare `HH:MM:SS`. Time-of-day values are anchored
/// on 1900-01-01, so traces exported without a date still order correctly
/// within a single day.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M:%S%.f").ok()?;
    NaiveDate::from_ymd_opt(1900, 1, 1).map(|day| day.and_time(time))
}

/// Validate a single raw record. `record` is the 1-based position used in errors.
pub fn validate_record(raw: &RawRecord, record: usize) -> Result<GpsRecord> {
    let vehicle = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let vehicle_label = vehicle.unwrap_or("<unknown>");
    let vehicle = vehicle.ok_or_missing(record, vehicle_label, "id")?;

    let time = raw.time.as_deref().ok_or_missing(record, vehicle, "time")?;
    let timestamp = parse_timestamp(time).ok_or_else(|| OdError::InvalidTimestamp {
        record,
        vehicle: vehicle.to_string(),
        value: time.to_string(),
    })?;

    let longitude = raw.long.ok_or_missing(record, vehicle, "long")?;
    let latitude = raw.lati.ok_or_missing(record, vehicle, "lati")?;
    let code = raw.status.ok_or_missing(record, vehicle, "status")?;
    let status = OccupancyStatus::from_code(code).ok_or_else(|| OdError::InvalidStatus {
        record,
        vehicle: vehicle.to_string(),
        value: code,
    })?;
    let speed = raw.speed.ok_or_missing(record, vehicle, "speed")?;

    Ok(GpsRecord {
        vehicle_id: vehicle.to_string(),
        timestamp,
        longitude,
        latitude,
        status,
        speed,
        heading: raw.head,
    })
}

/// Validate, filter and sort raw records.
///
/// Returns an error for the first record that violates the input contract;
/// nothing is cleaned in that case.
pub fn clean_records(raw: &[RawRecord], config: &CleaningConfig) -> Result<CleanedTrace> {
    let mut stats = CleaningStats {
        input: raw.len(),
        ..Default::default()
    };

    let validated = raw
        .iter()
        .enumerate()
        .map(|(i, r)| validate_record(r, i + 1))
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashSet<(String, NaiveDateTime)> = HashSet::with_capacity(validated.len());
    let mut records = Vec::with_capacity(validated.len());
    for record in validated {
        if !config.bounds.contains_strict(&record.point()) {
            stats.out_of_bounds += 1;
            continue;
        }
        if !(record.speed < config.max_speed_kmh) {
            stats.over_speed += 1;
            continue;
        }
        // Dedup only among readings that survive the filters
        if !seen.insert((record.vehicle_id.clone(), record.timestamp)) {
            stats.duplicates += 1;
            continue;
        }
        records.push(record);
    }

    records.sort_by(|a, b| {
        a.vehicle_id
            .cmp(&b.vehicle_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    if config.remove_status_flips {
        let before = records.len();
        records = remove_status_flips(records);
        stats.status_flips = before - records.len();
    }

    stats.output = records.len();
    debug!("[Cleaner] {:?}", stats);
    info!(
        "[Cleaner] Kept {} of {} records",
        stats.output, stats.input
    );

    Ok(CleanedTrace { records, stats })
}

/// Drop readings whose status differs from both neighbours while the
/// neighbours agree. Expects records sorted by vehicle; the first and last
/// reading of each vehicle are always kept.
///
/// Scans left to right against the last kept reading, so in an alternating
/// run like `0,1,0,1,1` only the first blip goes.
fn remove_status_flips(records: Vec<GpsRecord>) -> Vec<GpsRecord> {
    let n = records.len();
    let mut keep = vec![true; n];
    let mut last_kept: Option<usize> = None;

    for i in 0..n {
        let cur = &records[i];
        let isolated = match last_kept {
            Some(p) if i + 1 < n => {
                let (prev, next) = (&records[p], &records[i + 1]);
                prev.vehicle_id == cur.vehicle_id
                    && next.vehicle_id == cur.vehicle_id
                    && prev.status == next.status
                    && cur.status != prev.status
            }
            _ => false,
        };
        if isolated {
            keep[i] = false;
        } else {
            last_kept = Some(i);
        }
    }

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}
