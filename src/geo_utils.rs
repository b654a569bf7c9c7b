//! # Geographic Utilities
//!
//! Core geographic computation utilities for taxi probe analysis.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two points in kilometers |
//! | [`compute_bounds`] | Bounding box of a point set |
//! | [`compute_center`] | Arithmetic centroid of a point set |
//! | [`weighted_center`] | Weighted centroid of a point set |
//! | [`sample_std_dev`] | Sample standard deviation (n - 1) |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use taxi_od::{GpsPoint, geo_utils};
//!
//! let futian = GpsPoint::new(114.0550, 22.5214);
//! let luohu = GpsPoint::new(114.1315, 22.5482);
//!
//! let km = geo_utils::haversine_km(&futian, &luohu);
//! assert!(km > 8.0 && km < 9.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine formula on a sphere of radius 6371 km. The formula is
//! spelled out here rather than taken from `geo::Haversine`, whose mean Earth radius
//! (6371.0088 km) would shift every trip distance by about 1.4 ppm.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use crate::{Bounds, GpsPoint};

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree used for planar approximations.
pub const KM_PER_DEGREE: f64 = 111.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two points in kilometers.
///
/// Symmetric, and exactly `0.0` for identical points.
///
/// # Example
///
/// ```rust
/// use taxi_od::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 1.0);
/// let km = geo_utils::haversine_km(&a, &b);
/// assert!((km - 111.19).abs() < 0.1);
/// ```
#[inline]
pub fn haversine_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Planar distance in kilometers treating one degree as [`KM_PER_DEGREE`] on both axes.
///
/// Ignores longitude convergence, so east-west distances are overstated away
/// from the equator (by about 8% at 22°N).
#[inline]
pub fn planar_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let dlon = p2.longitude - p1.longitude;
    let dlat = p2.latitude - p1.latitude;
    (dlon * dlon + dlat * dlat).sqrt() * KM_PER_DEGREE
}

/// Convert meters to approximate degrees of longitude at a given latitude.
///
/// Uses 111,320 m per degree at the equator scaled by `cos(latitude)`, clamped
/// so that the result stays finite near the poles.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a point set.
///
/// For empty input, returns a bounds with MIN/MAX values that contain nothing.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    }
}

// =============================================================================
// Center and Dispersion Functions
// =============================================================================

/// Compute the arithmetic centroid of a point set.
///
/// Returns (0, 0) for empty input.
pub fn compute_center(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lng / n, sum_lat / n)
}

/// Compute the weighted centroid of a point set.
///
/// Falls back to [`compute_center`] when the weights do not line up with the
/// points or sum to zero.
pub fn weighted_center(points: &[GpsPoint], weights: &[f64]) -> GpsPoint {
    let total: f64 = weights.iter().sum();
    if weights.len() != points.len() || total == 0.0 || !total.is_finite() {
        return compute_center(points);
    }

    let lng: f64 = points.iter().zip(weights).map(|(p, w)| p.longitude * w).sum();
    let lat: f64 = points.iter().zip(weights).map(|(p, w)| p.latitude * w).sum();

    GpsPoint::new(lng / total, lat / total)
}

/// Sample standard deviation (denominator n - 1). Zero for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Straight transcription of the textbook formula, arguments as (lon, lat).
    fn reference_haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        let (lon1, lat1, lon2, lat2) = (
            lon1.to_radians(),
            lat1.to_radians(),
            lon2.to_radians(),
            lat2.to_radians(),
        );
        let a = ((lat2 - lat1) / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
        2.0 * a.sqrt().asin() * 6371.0
    }

    #[test]
    fn test_haversine_same_point() {
        let p = GpsPoint::new(113.0, 22.0);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let km = haversine_km(&GpsPoint::new(0.0, 0.0), &GpsPoint::new(0.0, 1.0));
        assert!(approx_eq(km, 111.19, 111.19 * 0.001));
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = GpsPoint::new(114.0579, 22.5429);
        let b = GpsPoint::new(113.9, 22.7);
        assert_eq!(haversine_km(&a, &b), haversine_km(&b, &a));
    }

    #[test]
    fn test_haversine_matches_reference() {
        let cases = [
            (114.0579, 22.5429, 113.9, 22.7),
            (-0.1278, 51.5074, 2.3522, 48.8566),
            (170.0, -40.0, -170.0, -41.0),
        ];
        for (lon1, lat1, lon2, lat2) in cases {
            let expected = reference_haversine(lon1, lat1, lon2, lat2);
            let actual = haversine_km(&GpsPoint::new(lon1, lat1), &GpsPoint::new(lon2, lat2));
            assert!(((actual - expected) / expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_planar_km() {
        let km = planar_km(&GpsPoint::new(114.0, 22.0), &GpsPoint::new(114.0, 23.0));
        assert!(approx_eq(km, 111.0, 1e-9));
    }

    #[test]
    fn test_compute_bounds() {
        let points = vec![
            GpsPoint::new(-0.13, 51.50),
            GpsPoint::new(-0.12, 51.51),
            GpsPoint::new(-0.125, 51.505),
        ];
        let bounds = compute_bounds(&points);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }

    #[test]
    fn test_compute_center() {
        let points = vec![GpsPoint::new(-0.10, 51.50), GpsPoint::new(-0.12, 51.52)];
        let center = compute_center(&points);
        assert!(approx_eq(center.latitude, 51.51, 1e-9));
        assert!(approx_eq(center.longitude, -0.11, 1e-9));
    }

    #[test]
    fn test_compute_center_empty() {
        let center = compute_center(&[]);
        assert_eq!(center, GpsPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_weighted_center() {
        let points = vec![GpsPoint::new(114.0, 22.0), GpsPoint::new(114.4, 22.4)];
        let center = weighted_center(&points, &[3.0, 1.0]);
        assert!(approx_eq(center.longitude, 114.1, 1e-9));
        assert!(approx_eq(center.latitude, 22.1, 1e-9));

        // Zero weights fall back to the plain mean
        let center = weighted_center(&points, &[0.0, 0.0]);
        assert!(approx_eq(center.longitude, 114.2, 1e-9));
    }

    #[test]
    fn test_sample_std_dev() {
        assert_eq!(sample_std_dev(&[1.0]), 0.0);
        assert!(approx_eq(sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.138, 1e-3));
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));

        let deg_45 = meters_to_degrees(111_320.0, 45.0);
        assert!(deg_45 > 1.0);
    }
}
