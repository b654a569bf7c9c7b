//! Reading probe exports and writing result tables.
//!
//! CSV is read with headers (`id,time,long,lati,status,speed[,head]`);
//! surrounding whitespace is trimmed and empty fields read as missing.
//! Tables are written as CSV with a header row (empty tables included),
//! nested results as pretty JSON.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::{debug, info};
use serde::Serialize;

use crate::aggregate::{
    DailyDistanceCounts, HourlyPickups, HourlySpeed, OccupancySample, TimeBucket,
};
use crate::error::{OdError, Result};
use crate::hotspot::Hotspot;
use crate::region::{HourlyRegionDemand, RegionIndex, RegionPairCount};
use crate::{OdTrip, RawRecord};

/// Parse probe records from any CSV source.
pub fn read_raw_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Parse probe records from a CSV file.
pub fn read_raw_records_path(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path).map_err(|e| OdError::io(path, e))?;
    let records = read_raw_records(BufReader::new(file))?;
    info!("[Input] Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Read a whole file, for inputs that are fingerprinted before parsing.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| OdError::io(path, e))
}

/// Load region boundaries from a GeoJSON file.
pub fn read_regions(path: &Path, name_property: &str) -> Result<RegionIndex> {
    let json = fs::read_to_string(path).map_err(|e| OdError::io(path, e))?;
    RegionIndex::from_geojson_str(&json, name_property)
}

/// A row type written as one CSV table.
///
/// `HEADER` lists the serialised field names in order, so an empty table
/// still gets its header row.
pub trait CsvTable: Serialize {
    const HEADER: &'static [&'static str];
}

impl CsvTable for OdTrip {
    const HEADER: &'static [&'static str] = &[
        "vehicle_id",
        "pickup_time",
        "pickup_lon",
        "pickup_lat",
        "pickup_speed",
        "pickup_heading",
        "dropoff_time",
        "dropoff_lon",
        "dropoff_lat",
        "dropoff_speed",
        "dropoff_heading",
        "duration_seconds",
        "distance_km",
    ];
}

impl CsvTable for Hotspot {
    const HEADER: &'static [&'static str] = &[
        "cluster_id",
        "center_lon",
        "center_lat",
        "point_count",
        "coverage_km",
        "avg_weight",
    ];
}

impl CsvTable for TimeBucket {
    const HEADER: &'static [&'static str] = &["start", "count"];
}

impl CsvTable for HourlySpeed {
    const HEADER: &'static [&'static str] = &["hour", "avg_speed_kmh", "trips"];
}

impl CsvTable for OccupancySample {
    const HEADER: &'static [&'static str] = &["time", "occupied"];
}

impl CsvTable for DailyDistanceCounts {
    const HEADER: &'static [&'static str] = &["day", "short", "medium", "long"];
}

impl CsvTable for HourlyPickups {
    const HEADER: &'static [&'static str] = &["hour", "demand"];
}

impl CsvTable for RegionPairCount {
    const HEADER: &'static [&'static str] = &["origin_region", "destination_region", "count"];
}

impl CsvTable for HourlyRegionDemand {
    const HEADER: &'static [&'static str] =
        &["hour", "origin_region", "destination_region", "demand"];
}

/// Write rows as CSV with a header row, also when there are no rows.
pub fn write_csv<T: CsvTable>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).map_err(|e| OdError::io(path, e))?;
    let mut writer = WriterBuilder::new().from_writer(BufWriter::new(file));
    if rows.is_empty() {
        writer.write_record(T::HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| OdError::io(path, e))?;
    debug!("[Output] Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write a value as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| OdError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| OdError::io(path, e))?;
    debug!("[Output] Wrote {}", path.display());
    Ok(())
}
