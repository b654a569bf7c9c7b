//! # Trip Reconstruction
//!
//! Converts status-tagged GPS traces into origin-destination trips.
//!
//! ## Algorithm
//! 1. Partition the cleaned trace by vehicle (partitions never interact)
//! 2. Take the first difference of the occupancy flag: `0→1` is a pickup,
//!    `1→0` a dropoff
//! 3. Pair the i-th pickup with the i-th dropoff, up to the shorter list
//! 4. Skip pairs with a non-positive duration or distance
//!
//! Rejections are counted in [`ExtractionStats`], never raised. Only a trace that
//! breaks the cleaning contract (time running backwards, non-finite
//! coordinates) is an error.

use std::collections::BTreeMap;

use log::info;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{OdError, Result};
use crate::geo_utils::haversine_km;
use crate::{GpsRecord, OccupancyStatus, OdTrip};

/// Counters describing what the reconstructor saw and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub vehicles: usize,
    pub pickups: usize,
    pub dropoffs: usize,
    /// Pickup or dropoff events left over after pairing
    pub unmatched_events: usize,
    pub rejected_duration: usize,
    pub rejected_distance: usize,
    pub trips: usize,
}

impl ExtractionStats {
    fn merge(&mut self, other: &ExtractionStats) {
        self.vehicles += other.vehicles;
        self.pickups += other.pickups;
        self.dropoffs += other.dropoffs;
        self.unmatched_events += other.unmatched_events;
        self.rejected_duration += other.rejected_duration;
        self.rejected_distance += other.rejected_distance;
        self.trips += other.trips;
    }
}

/// Output of [`reconstruct_trips`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripExtraction {
    /// Trips in vehicle-then-pickup-time order
    pub trips: Vec<OdTrip>,
    pub stats: ExtractionStats,
}

/// Reconstruct OD trips from a cleaned trace.
///
/// Records may arrive in any vehicle order but each vehicle's readings must
/// be in non-decreasing time order. Output is ordered by vehicle id, then by
/// pickup time.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use taxi_od::{GpsRecord, OccupancyStatus::*, reconstruct_trips};
///
/// let t = |s| NaiveDate::from_ymd_opt(2014, 10, 22).unwrap().and_hms_opt(0, 0, s).unwrap();
/// let trace = vec![
///     GpsRecord::new("a", t(0), 114.00, 22.50, Vacant, 0.0),
///     GpsRecord::new("a", t(1), 114.00, 22.50, Occupied, 0.0),
///     GpsRecord::new("a", t(2), 114.01, 22.51, Vacant, 0.0),
/// ];
/// let trips = reconstruct_trips(&trace).unwrap().trips;
/// assert_eq!(trips.len(), 1);
/// assert_eq!(trips[0].pickup_time, t(1));
/// assert_eq!(trips[0].dropoff_time, t(2));
/// ```
pub fn reconstruct_trips(records: &[GpsRecord]) -> Result<TripExtraction> {
    let mut partitions: BTreeMap<&str, Vec<&GpsRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.vehicle_id.as_str())
            .or_default()
            .push(record);
    }
    let partitions: Vec<(&str, Vec<&GpsRecord>)> = partitions.into_iter().collect();

    #[cfg(feature = "parallel")]
    let per_vehicle: Vec<Result<(Vec<OdTrip>, ExtractionStats)>> = partitions
        .par_iter()
        .map(|(vehicle, trace)| reconstruct_vehicle(vehicle, trace))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let per_vehicle: Vec<Result<(Vec<OdTrip>, ExtractionStats)>> = partitions
        .iter()
        .map(|(vehicle, trace)| reconstruct_vehicle(vehicle, trace))
        .collect();

    let mut extraction = TripExtraction::default();
    for result in per_vehicle {
        let (trips, stats) = result?;
        extraction.trips.extend(trips);
        extraction.stats.merge(&stats);
    }

    info!(
        "[Trips] {} trips from {} vehicles ({} pickups, {} dropoffs, {} rejected)",
        extraction.stats.trips,
        extraction.stats.vehicles,
        extraction.stats.pickups,
        extraction.stats.dropoffs,
        extraction.stats.rejected_duration + extraction.stats.rejected_distance
    );

    Ok(extraction)
}

/// Scan one vehicle's time-ordered trace.
fn reconstruct_vehicle(
    vehicle: &str,
    trace: &[&GpsRecord],
) -> Result<(Vec<OdTrip>, ExtractionStats)> {
    let mut stats = ExtractionStats {
        vehicles: 1,
        ..Default::default()
    };

    for (position, record) in trace.iter().enumerate() {
        if !(record.longitude.is_finite() && record.latitude.is_finite()) {
            return Err(OdError::InvalidCoordinate {
                vehicle: vehicle.to_string(),
                position,
            });
        }
        if position > 0 && record.timestamp < trace[position - 1].timestamp {
            return Err(OdError::UnsortedTrace {
                vehicle: vehicle.to_string(),
                position,
            });
        }
    }

    let mut pickups: Vec<&GpsRecord> = Vec::new();
    let mut dropoffs: Vec<&GpsRecord> = Vec::new();
    for pair in trace.windows(2) {
        match (pair[0].status, pair[1].status) {
            (OccupancyStatus::Vacant, OccupancyStatus::Occupied) => pickups.push(pair[1]),
            (OccupancyStatus::Occupied, OccupancyStatus::Vacant) => dropoffs.push(pair[1]),
            _ => {}
        }
    }

    stats.pickups = pickups.len();
    stats.dropoffs = dropoffs.len();
    stats.unmatched_events = pickups.len().abs_diff(dropoffs.len());

    let mut trips = Vec::with_capacity(pickups.len().min(dropoffs.len()));
    for (pickup, dropoff) in pickups.iter().zip(dropoffs.iter()) {
        let duration_seconds =
            (dropoff.timestamp - pickup.timestamp).num_milliseconds() as f64 / 1000.0;
        if duration_seconds <= 0.0 {
            stats.rejected_duration += 1;
            continue;
        }

        let distance_km = haversine_km(&pickup.point(), &dropoff.point());
        if distance_km <= 0.0 {
            stats.rejected_distance += 1;
            continue;
        }

        trips.push(OdTrip {
            vehicle_id: vehicle.to_string(),
            pickup_time: pickup.timestamp,
            pickup_lon: pickup.longitude,
            pickup_lat: pickup.latitude,
            pickup_speed: pickup.speed,
            pickup_heading: pickup.heading.unwrap_or(0.0),
            dropoff_time: dropoff.timestamp,
            dropoff_lon: dropoff.longitude,
            dropoff_lat: dropoff.latitude,
            dropoff_speed: dropoff.speed,
            dropoff_heading: dropoff.heading.unwrap_or(0.0),
            duration_seconds,
            distance_km,
        });
    }

    stats.trips = trips.len();
    Ok((trips, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use OccupancyStatus::{Occupied, Vacant};

    fn t(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 10, 22)
            .unwrap()
            .and_hms_opt(8, s / 60, s % 60)
            .unwrap()
    }

    fn rec(id: &str, s: u32, lon: f64, status: OccupancyStatus) -> GpsRecord {
        GpsRecord::new(id, t(s), lon, 22.5, status, 20.0)
    }

    #[test]
    fn test_single_trip() {
        let trace = vec![
            rec("a", 0, 114.00, Vacant),
            rec("a", 1, 114.01, Occupied),
            rec("a", 2, 114.02, Vacant),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert_eq!(extraction.trips.len(), 1);
        let trip = &extraction.trips[0];
        assert_eq!(trip.pickup_time, t(1));
        assert_eq!(trip.dropoff_time, t(2));
        assert_eq!(trip.duration_seconds, 1.0);
        assert!(trip.distance_km > 0.0);
        assert_eq!(trip.pickup_heading, 0.0);
    }

    #[test]
    fn test_first_record_is_not_an_event() {
        // Starts occupied: the first reading never counts as a pickup
        let trace = vec![
            rec("a", 0, 114.00, Occupied),
            rec("a", 10, 114.01, Vacant),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert!(extraction.trips.is_empty());
        assert_eq!(extraction.stats.pickups, 0);
        assert_eq!(extraction.stats.dropoffs, 1);
        assert_eq!(extraction.stats.unmatched_events, 1);
    }

    #[test]
    fn test_unmatched_trailing_pickup_dropped() {
        let trace = vec![
            rec("a", 0, 114.00, Vacant),
            rec("a", 10, 114.01, Occupied),
            rec("a", 20, 114.02, Vacant),
            rec("a", 30, 114.03, Occupied),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert_eq!(extraction.trips.len(), 1);
        assert_eq!(extraction.stats.unmatched_events, 1);
    }

    #[test]
    fn test_zero_distance_rejected() {
        let trace = vec![
            GpsRecord::new("a", t(0), 113.0, 22.0, Vacant, 0.0),
            GpsRecord::new("a", t(5), 113.0, 22.0, Occupied, 0.0),
            GpsRecord::new("a", t(9), 113.0, 22.0, Vacant, 0.0),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert!(extraction.trips.is_empty());
        assert_eq!(extraction.stats.rejected_distance, 1);
    }

    #[test]
    fn test_non_causal_pair_rejected() {
        // Dropoff before the first pickup pairs up out of order and is rejected
        let trace = vec![
            rec("a", 0, 114.00, Occupied),
            rec("a", 10, 114.01, Vacant),
            rec("a", 20, 114.02, Occupied),
            rec("a", 30, 114.03, Occupied),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert!(extraction.trips.is_empty());
        assert_eq!(extraction.stats.rejected_duration, 1);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let trace = vec![
            rec("a", 0, 114.00, Vacant),
            rec("a", 5, 114.01, Occupied),
            rec("a", 5, 114.02, Vacant),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        assert!(extraction.trips.is_empty());
        assert_eq!(extraction.stats.rejected_duration, 1);
    }

    #[test]
    fn test_vehicles_do_not_interact_and_order_is_stable() {
        let trace = vec![
            rec("b", 0, 114.00, Vacant),
            rec("b", 5, 114.01, Occupied),
            rec("a", 0, 114.00, Vacant),
            rec("a", 3, 114.01, Occupied),
            rec("a", 9, 114.02, Vacant),
            rec("a", 12, 114.03, Occupied),
            rec("a", 20, 114.05, Vacant),
            rec("b", 9, 114.02, Vacant),
        ];
        let extraction = reconstruct_trips(&trace).unwrap();
        let keys: Vec<(&str, NaiveDateTime)> = extraction
            .trips
            .iter()
            .map(|trip| (trip.vehicle_id.as_str(), trip.pickup_time))
            .collect();
        assert_eq!(keys, vec![("a", t(3)), ("a", t(12)), ("b", t(5))]);
        assert_eq!(extraction.stats.vehicles, 2);
    }

    #[test]
    fn test_heading_carried_through() {
        let mut pickup = rec("a", 1, 114.01, Occupied);
        pickup.heading = Some(90.0);
        let trace = vec![rec("a", 0, 114.00, Vacant), pickup, rec("a", 2, 114.02, Vacant)];
        let trip = &reconstruct_trips(&trace).unwrap().trips[0];
        assert_eq!(trip.pickup_heading, 90.0);
        assert_eq!(trip.dropoff_heading, 0.0);
    }

    #[test]
    fn test_backwards_time_is_an_error() {
        let trace = vec![rec("a", 10, 114.00, Vacant), rec("a", 5, 114.01, Occupied)];
        assert!(matches!(
            reconstruct_trips(&trace),
            Err(OdError::UnsortedTrace { position: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_coordinate_is_an_error() {
        let trace = vec![rec("a", 0, f64::NAN, Vacant)];
        assert!(matches!(
            reconstruct_trips(&trace),
            Err(OdError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let extraction = reconstruct_trips(&[]).unwrap();
        assert!(extraction.trips.is_empty());
        assert_eq!(extraction.stats, ExtractionStats::default());
    }
}
