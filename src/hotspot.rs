//! # Pickup Hotspot Clustering
//!
//! Density-based clustering (DBSCAN) of pickup locations into demand hotspots.
//!
//! ## Algorithm
//! 1. Index all pickups in an R-tree keyed on `[lng, lat]`
//! 2. For each point, query a degree envelope guaranteed to cover `eps_km`,
//!    then keep candidates within `eps_km` under the configured metric
//! 3. Points with at least `min_samples` neighbours (themselves included) are core
//! 4. Core points within `eps_km` of each other are merged with union-find
//! 5. Every other point joins the cluster of its nearest core neighbour, or is noise
//!
//! Step 5 replaces the visit-order dependent border assignment of textbook DBSCAN,
//! so the same input rows yield the same memberships in any order. Cluster ids
//! follow the first appearance of a member in the input and carry no meaning
//! across runs.

use std::collections::HashMap;

use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

use crate::config::{ClusterConfig, DistanceMetric};
use crate::geo_utils::{
    compute_center, haversine_km, planar_km, sample_std_dev, weighted_center, EARTH_RADIUS_KM,
    KM_PER_DEGREE,
};
use crate::{GpsPoint, OdTrip};

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// A point to cluster, with an optional weight such as passenger count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PickupPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub weight: Option<f64>,
}

impl PickupPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            weight: None,
        }
    }

    pub fn with_weight(longitude: f64, latitude: f64, weight: f64) -> Self {
        Self {
            longitude,
            latitude,
            weight: Some(weight),
        }
    }

    fn point(&self) -> GpsPoint {
        GpsPoint::new(self.longitude, self.latitude)
    }
}

/// Summary of one cluster of pickups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    pub cluster_id: i32,
    /// Mean pickup longitude, weighted when every member carries a weight
    pub center_lon: f64,
    /// Mean pickup latitude, weighted when every member carries a weight
    pub center_lat: f64,
    pub point_count: usize,
    /// Dispersion proxy: `sqrt(std(lon)² + std(lat)²) × 111`, not a geodesic radius
    pub coverage_km: f64,
    /// Mean member weight, when every member carries a weight
    pub avg_weight: Option<f64>,
}

/// Output of [`cluster_pickups`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HotspotResult {
    /// One hotspot per cluster, sorted by `cluster_id`
    pub hotspots: Vec<Hotspot>,
    /// Cluster id per input point, [`NOISE`] for noise
    pub labels: Vec<i32>,
    pub cluster_count: usize,
    pub noise_count: usize,
}

// =============================================================================
// R-tree Indexed Point for Neighbourhood Queries
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lng: f64,
    lat: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

/// Array-backed union-find over point indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller index becomes root so roots do not depend on union order
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Neighbourhood search honouring the configured metric.
struct NeighbourIndex<'a> {
    points: &'a [PickupPoint],
    tree: RTree<IndexedPoint>,
    eps_km: f64,
    metric: DistanceMetric,
}

impl<'a> NeighbourIndex<'a> {
    fn new(points: &'a [PickupPoint], config: &ClusterConfig) -> Self {
        let indexed: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedPoint {
                idx,
                lng: p.longitude,
                lat: p.latitude,
            })
            .collect();
        Self {
            points,
            tree: RTree::bulk_load(indexed),
            eps_km: config.eps_km,
            metric: config.metric,
        }
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        let (pa, pb) = (self.points[a].point(), self.points[b].point());
        match self.metric {
            DistanceMetric::Haversine => haversine_km(&pa, &pb),
            DistanceMetric::Euclidean => planar_km(&pa, &pb),
        }
    }

    /// Degree half-widths `(d_lng, d_lat)` of a box that contains every point
    /// within `eps_km` of `p`.
    fn search_margins(&self, p: &PickupPoint) -> (f64, f64) {
        // Slack for rounding at the envelope edge
        let slack = 1.0 + 1e-9;
        match self.metric {
            DistanceMetric::Euclidean => {
                let d = self.eps_km / KM_PER_DEGREE * slack;
                (d, d)
            }
            DistanceMetric::Haversine => {
                let angle = self.eps_km / EARTH_RADIUS_KM;
                let d_lat = angle.to_degrees() * slack;
                let max_lat = p.latitude.abs() + d_lat;
                if max_lat >= 89.9 {
                    // Reach includes or nears a pole: every longitude
                    return (360.0, d_lat);
                }
                let ratio = (angle / 2.0).sin() / max_lat.to_radians().cos();
                let d_lng = if ratio >= 1.0 {
                    360.0
                } else {
                    (2.0 * ratio.asin()).to_degrees() * slack
                };
                (d_lng, d_lat)
            }
        }
    }

    /// All points within `eps_km` of point `i`, itself included.
    fn neighbours(&self, i: usize) -> Vec<usize> {
        let p = &self.points[i];
        let (d_lng, d_lat) = self.search_margins(p);
        let (min_lat, max_lat) = (p.latitude - d_lat, p.latitude + d_lat);

        let mut candidates: Vec<usize> = Vec::new();
        for (west, east) in longitude_spans(p.longitude, d_lng) {
            let envelope = AABB::from_corners([west, min_lat], [east, max_lat]);
            candidates.extend(self.tree.locate_in_envelope(&envelope).map(|c| c.idx));
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates.retain(|&j| j == i || self.distance(i, j) <= self.eps_km);
        candidates
    }
}

/// Longitude intervals covering `lon ± d_lng`, split where the range crosses
/// the antimeridian so every piece lies within [-180, 180].
fn longitude_spans(lon: f64, d_lng: f64) -> Vec<(f64, f64)> {
    if d_lng >= 180.0 {
        return vec![(-180.0, 180.0)];
    }
    let (west, east) = (lon - d_lng, lon + d_lng);
    let mut spans = vec![(west.max(-180.0), east.min(180.0))];
    if west < -180.0 {
        spans.push((west + 360.0, 180.0));
    }
    if east > 180.0 {
        spans.push((-180.0, east - 360.0));
    }
    spans
}

// =============================================================================
// Clustering
// =============================================================================

/// Cluster pickup points with DBSCAN.
///
/// Empty input and all-noise input both return an empty hotspot list with
/// `cluster_count == 0`.
pub fn cluster_pickups(points: &[PickupPoint], config: &ClusterConfig) -> HotspotResult {
    let n = points.len();
    if n == 0 {
        return HotspotResult::default();
    }

    let index = NeighbourIndex::new(points, config);
    let neighbourhoods: Vec<Vec<usize>> = (0..n).map(|i| index.neighbours(i)).collect();
    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|nb| nb.len() >= config.min_samples)
        .collect();

    let mut components = DisjointSet::new(n);
    for i in (0..n).filter(|&i| is_core[i]) {
        for &j in neighbourhoods[i].iter().filter(|&&j| is_core[j]) {
            components.union(i, j);
        }
    }

    // Root of the cluster each point belongs to, None for noise
    let roots: Vec<Option<usize>> = (0..n)
        .map(|i| {
            if is_core[i] {
                return Some(components.find(i));
            }
            neighbourhoods[i]
                .iter()
                .copied()
                .filter(|&j| is_core[j])
                .min_by(|&a, &b| {
                    index
                        .distance(i, a)
                        .total_cmp(&index.distance(i, b))
                        .then(points[a].longitude.total_cmp(&points[b].longitude))
                        .then(points[a].latitude.total_cmp(&points[b].latitude))
                })
                .map(|core| components.find(core))
        })
        .collect();

    let mut label_of_root: HashMap<usize, i32> = HashMap::new();
    let labels: Vec<i32> = roots
        .iter()
        .map(|root| match root {
            Some(root) => {
                let next = label_of_root.len() as i32;
                *label_of_root.entry(*root).or_insert(next)
            }
            None => NOISE,
        })
        .collect();

    let cluster_count = label_of_root.len();
    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();

    let mut members: Vec<Vec<&PickupPoint>> = vec![Vec::new(); cluster_count];
    for (point, &label) in points.iter().zip(&labels) {
        if label != NOISE {
            members[label as usize].push(point);
        }
    }

    let hotspots: Vec<Hotspot> = members
        .iter()
        .enumerate()
        .map(|(cluster_id, cluster)| summarize_cluster(cluster_id as i32, cluster))
        .collect();

    info!(
        "[Hotspots] {} clusters, {} noise points from {} pickups",
        cluster_count, noise_count, n
    );
    for hotspot in &hotspots {
        debug!(
            "[Hotspots] cluster {}: {} points at ({:.5}, {:.5})",
            hotspot.cluster_id, hotspot.point_count, hotspot.center_lon, hotspot.center_lat
        );
    }

    HotspotResult {
        hotspots,
        labels,
        cluster_count,
        noise_count,
    }
}

/// Cluster the pickup locations of a trip table (unweighted).
pub fn cluster_trips(trips: &[OdTrip], config: &ClusterConfig) -> HotspotResult {
    let points: Vec<PickupPoint> = trips
        .iter()
        .map(|trip| PickupPoint::new(trip.pickup_lon, trip.pickup_lat))
        .collect();
    cluster_pickups(&points, config)
}

fn summarize_cluster(cluster_id: i32, members: &[&PickupPoint]) -> Hotspot {
    let coords: Vec<GpsPoint> = members.iter().map(|p| p.point()).collect();
    let weights: Option<Vec<f64>> = members.iter().map(|p| p.weight).collect();

    let center = match &weights {
        Some(w) => weighted_center(&coords, w),
        None => compute_center(&coords),
    };

    let lngs: Vec<f64> = coords.iter().map(|p| p.longitude).collect();
    let lats: Vec<f64> = coords.iter().map(|p| p.latitude).collect();
    let coverage_km =
        (sample_std_dev(&lngs).powi(2) + sample_std_dev(&lats).powi(2)).sqrt() * KM_PER_DEGREE;

    let avg_weight = weights
        .filter(|w| !w.is_empty())
        .map(|w| w.iter().sum::<f64>() / w.len() as f64);

    Hotspot {
        cluster_id,
        center_lon: center.longitude,
        center_lat: center.latitude,
        point_count: members.len(),
        coverage_km,
        avg_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn blob(
        center: (f64, f64),
        count: usize,
        spread_deg: f64,
        rng: &mut StdRng,
    ) -> Vec<PickupPoint> {
        (0..count)
            .map(|_| {
                PickupPoint::new(
                    center.0 + rng.gen_range(-spread_deg..spread_deg),
                    center.1 + rng.gen_range(-spread_deg..spread_deg),
                )
            })
            .collect()
    }

    fn config(eps_km: f64, min_samples: usize) -> ClusterConfig {
        ClusterConfig {
            eps_km,
            min_samples,
            metric: DistanceMetric::Haversine,
        }
    }

    #[test]
    fn test_empty_input() {
        let result = cluster_pickups(&[], &ClusterConfig::default());
        assert!(result.hotspots.is_empty());
        assert_eq!(result.cluster_count, 0);
    }

    #[test]
    fn test_all_noise() {
        // Points ~11 km apart with eps 0.3 km
        let points: Vec<PickupPoint> = (0..6)
            .map(|i| PickupPoint::new(114.0 + i as f64 * 0.1, 22.5))
            .collect();
        let result = cluster_pickups(&points, &config(0.3, 2));
        assert!(result.hotspots.is_empty());
        assert_eq!(result.cluster_count, 0);
        assert_eq!(result.noise_count, 6);
        assert!(result.labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_two_blobs_and_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut points = blob((114.05, 22.54), 30, 0.001, &mut rng);
        points.extend(blob((114.12, 22.60), 20, 0.001, &mut rng));
        points.push(PickupPoint::new(113.90, 22.45));

        let result = cluster_pickups(&points, &config(0.3, 5));
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.noise_count, 1);
        assert_eq!(result.labels[50], NOISE);
        assert_eq!(result.labels[0], 0);
        assert_eq!(result.labels[30], 1);

        let first = &result.hotspots[0];
        assert_eq!(first.point_count, 30);
        assert!((first.center_lon - 114.05).abs() < 0.001);
        assert!((first.center_lat - 22.54).abs() < 0.001);
        assert!(first.coverage_km > 0.0 && first.coverage_km < 0.2);
        assert_eq!(first.avg_weight, None);
    }

    #[test]
    fn test_min_samples_counts_the_point_itself() {
        let points = vec![
            PickupPoint::new(114.0, 22.5),
            PickupPoint::new(114.0005, 22.5),
        ];
        assert_eq!(cluster_pickups(&points, &config(0.3, 2)).cluster_count, 1);
        assert_eq!(cluster_pickups(&points, &config(0.3, 3)).cluster_count, 0);
    }

    #[test]
    fn test_border_point_joins_nearest_core() {
        // Two cores 0.5 km apart, each backed by a denser group further out.
        // The border point sits 0.225 km from the left core and 0.275 km from
        // the right one, within eps of both but not dense enough to be core.
        let k = 1.0 / (111.19 * 22.5f64.to_radians().cos());
        let left = 114.0;
        let right = left + 0.5 * k;
        let mut points = vec![PickupPoint::new(left + 0.225 * k, 22.5)];
        for _ in 0..5 {
            points.push(PickupPoint::new(left, 22.5));
            points.push(PickupPoint::new(right, 22.5));
        }
        for _ in 0..10 {
            points.push(PickupPoint::new(left - 0.2 * k, 22.5));
            points.push(PickupPoint::new(right + 0.2 * k, 22.5));
        }

        let result = cluster_pickups(&points, &config(0.3, 12));
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.noise_count, 0);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_ne!(result.labels[0], result.labels[2]);
    }

    #[test]
    fn test_weighted_center_and_avg_weight() {
        let points = vec![
            PickupPoint::with_weight(114.000, 22.5, 3.0),
            PickupPoint::with_weight(114.001, 22.5, 1.0),
        ];
        let result = cluster_pickups(&points, &config(0.3, 2));
        let hotspot = &result.hotspots[0];
        assert!((hotspot.center_lon - 114.00025).abs() < 1e-9);
        assert_eq!(hotspot.avg_weight, Some(2.0));
    }

    #[test]
    fn test_euclidean_fallback_overstates_east_west() {
        let points = vec![
            PickupPoint::new(114.0, 22.5),
            PickupPoint::new(114.002, 22.5),
            PickupPoint::new(114.004, 22.5),
        ];
        // 0.002 deg is 0.222 km planar but ~0.205 km great-circle at 22.5N
        let haversine = config(0.21, 2);
        let euclidean = ClusterConfig {
            metric: DistanceMetric::Euclidean,
            ..haversine.clone()
        };
        assert_eq!(cluster_pickups(&points, &haversine).cluster_count, 1);
        assert_eq!(cluster_pickups(&points, &euclidean).cluster_count, 0);
    }

    #[test]
    fn test_membership_independent_of_input_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut points = blob((114.05, 22.54), 40, 0.003, &mut rng);
        points.extend(blob((114.058, 22.545), 25, 0.002, &mut rng));
        points.extend(blob((114.2, 22.7), 15, 0.02, &mut rng));

        let memberships = |order: &[usize]| -> BTreeSet<Vec<usize>> {
            let shuffled: Vec<PickupPoint> = order.iter().map(|&i| points[i]).collect();
            let result = cluster_pickups(&shuffled, &config(0.25, 5));
            let mut clusters: HashMap<i32, Vec<usize>> = HashMap::new();
            for (pos, &label) in result.labels.iter().enumerate() {
                if label != NOISE {
                    clusters.entry(label).or_default().push(order[pos]);
                }
            }
            clusters
                .into_values()
                .map(|mut members| {
                    members.sort_unstable();
                    members
                })
                .collect()
        };

        let identity: Vec<usize> = (0..points.len()).collect();
        let baseline = memberships(&identity);
        assert!(!baseline.is_empty());

        for _ in 0..5 {
            let mut order = identity.clone();
            order.shuffle(&mut rng);
            assert_eq!(memberships(&order), baseline);
        }
    }

    #[test]
    fn test_cluster_trips_uses_pickups() {
        use chrono::NaiveDate;
        let t = NaiveDate::from_ymd_opt(2014, 10, 22)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let trips: Vec<OdTrip> = (0..5)
            .map(|i| OdTrip {
                vehicle_id: format!("v{}", i),
                pickup_time: t,
                pickup_lon: 114.05 + i as f64 * 0.0001,
                pickup_lat: 22.54,
                pickup_speed: 0.0,
                pickup_heading: 0.0,
                dropoff_time: t + chrono::Duration::minutes(10),
                dropoff_lon: 114.2 + i as f64 * 0.05,
                dropoff_lat: 22.6,
                dropoff_speed: 0.0,
                dropoff_heading: 0.0,
                duration_seconds: 600.0,
                distance_km: 15.0,
            })
            .collect();
        let result = cluster_trips(&trips, &ClusterConfig::default());
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.hotspots[0].point_count, 5);
    }

    #[test]
    fn test_neighbours_across_antimeridian() {
        let points = vec![
            PickupPoint::new(179.9999, 0.0),
            PickupPoint::new(179.9998, 0.0),
            PickupPoint::new(-179.9999, 0.0),
            PickupPoint::new(-179.9998, 0.0),
        ];
        let result = cluster_pickups(&points, &config(0.1, 4));
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_neighbours_around_pole() {
        // 0.111 km from the pole, spread over every quadrant
        let points: Vec<PickupPoint> = [0.0, 90.0, 180.0, -90.0]
            .iter()
            .map(|&lng| PickupPoint::new(lng, 89.999))
            .collect();
        let result = cluster_pickups(&points, &config(0.3, 4));
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.noise_count, 0);
    }

    #[test]
    fn test_longitude_spans_wrap() {
        assert_eq!(longitude_spans(114.0, 0.5), vec![(113.5, 114.5)]);
        assert_eq!(longitude_spans(0.0, 200.0), vec![(-180.0, 180.0)]);

        let spans = longitude_spans(179.9, 0.2);
        assert_eq!(spans.len(), 2);
        assert!((spans[0].0 - 179.7).abs() < 1e-9);
        assert_eq!(spans[0].1, 180.0);
        assert_eq!(spans[1].0, -180.0);
        assert!((spans[1].1 - (-179.9)).abs() < 1e-9);
    }
}
