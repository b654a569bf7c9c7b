//! Point-in-polygon join of trip endpoints against administrative regions.
//!
//! Regions come from a GeoJSON `FeatureCollection` of `Polygon` or
//! `MultiPolygon` features. An R-tree over region bounding boxes narrows each
//! lookup to a handful of candidates, which are then tested with exact
//! containment in load order. The first region containing the point wins, so
//! results are only meaningful for a non-overlapping partition.
//!
//! Points exactly on a region boundary are not contained by any region.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use geojson::{feature::Id, Feature, GeoJson};
use log::info;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

use crate::error::{OdError, Result};
use crate::OdTrip;

/// Region endpoints of one trip. `None` when the endpoint falls outside
/// every region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionAssignment {
    pub vehicle_id: String,
    pub pickup_time: chrono::NaiveDateTime,
    pub origin_region: Option<String>,
    pub destination_region: Option<String>,
}

/// Trips between one ordered pair of regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionPairCount {
    pub origin_region: String,
    pub destination_region: String,
    pub count: usize,
}

/// Trips between one ordered pair of regions within one pickup hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyRegionDemand {
    pub hour: u32,
    pub origin_region: String,
    pub destination_region: String,
    pub demand: usize,
}

/// All region-pair demand for one pickup hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyDemand {
    pub hour: u32,
    pub total_demand: usize,
    pub pairs: Vec<RegionPairCount>,
}

/// A named region boundary.
#[derive(Debug, Clone)]
struct Region {
    name: String,
    shape: MultiPolygon<f64>,
}

/// Region bounding box stored in the R-tree.
#[derive(Debug, Clone)]
struct RegionEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over a fixed set of named regions.
#[derive(Debug)]
pub struct RegionIndex {
    regions: Vec<Region>,
    tree: RTree<RegionEnvelope>,
}

impl RegionIndex {
    /// Build an index from named shapes, kept in the given order.
    pub fn from_polygons(regions: Vec<(String, MultiPolygon<f64>)>) -> Result<Self> {
        let mut envelopes = Vec::with_capacity(regions.len());
        for (index, (name, shape)) in regions.iter().enumerate() {
            let rect = shape.bounding_rect().ok_or_else(|| {
                OdError::InvalidRegions(format!("region '{}' has no coordinates", name))
            })?;
            envelopes.push(RegionEnvelope {
                index,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }

        Ok(Self {
            regions: regions
                .into_iter()
                .map(|(name, shape)| Region { name, shape })
                .collect(),
            tree: RTree::bulk_load(envelopes),
        })
    }

    /// Parse a GeoJSON `FeatureCollection`, naming each region by the
    /// `name_property` property or, failing that, the feature id.
    pub fn from_geojson_str(json: &str, name_property: &str) -> Result<Self> {
        let collection = match json.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection,
            _ => {
                return Err(OdError::InvalidRegions(
                    "expected a FeatureCollection".into(),
                ))
            }
        };

        let mut regions = Vec::with_capacity(collection.features.len());
        for (position, feature) in collection.features.into_iter().enumerate() {
            let name = feature_name(&feature, name_property).ok_or_else(|| {
                OdError::InvalidRegions(format!(
                    "feature {} has neither a '{}' property nor an id",
                    position, name_property
                ))
            })?;
            let geometry = feature.geometry.ok_or_else(|| {
                OdError::InvalidRegions(format!("region '{}' has no geometry", name))
            })?;
            let shape = match geo::Geometry::<f64>::try_from(geometry)? {
                geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
                geo::Geometry::MultiPolygon(multi) => multi,
                _ => {
                    return Err(OdError::InvalidRegions(format!(
                        "region '{}' is not a polygon",
                        name
                    )))
                }
            };
            regions.push((name, shape));
        }

        info!("[Regions] Loaded {} regions", regions.len());
        Self::from_polygons(regions)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Name of the first region (in load order) strictly containing the point.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&str> {
        let point = Point::new(lon, lat);
        let mut candidates: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .map(|e| e.index)
            .collect();
        candidates.sort_unstable();

        candidates
            .into_iter()
            .map(|i| &self.regions[i])
            .find(|region| region.shape.contains(&point))
            .map(|region| region.name.as_str())
    }

    /// Annotate every trip with its origin and destination regions, in trip order.
    pub fn assign_regions(&self, trips: &[OdTrip]) -> Vec<RegionAssignment> {
        trips
            .iter()
            .map(|trip| RegionAssignment {
                vehicle_id: trip.vehicle_id.clone(),
                pickup_time: trip.pickup_time,
                origin_region: self.locate(trip.pickup_lon, trip.pickup_lat).map(str::to_owned),
                destination_region: self
                    .locate(trip.dropoff_lon, trip.dropoff_lat)
                    .map(str::to_owned),
            })
            .collect()
    }

    /// Trips whose endpoints both fall in a region, with their pickup hour.
    fn located_pairs<'a>(
        &'a self,
        trips: &'a [OdTrip],
    ) -> impl Iterator<Item = (u32, &'a str, &'a str)> + 'a {
        trips.iter().filter_map(move |trip| {
            let origin = self.locate(trip.pickup_lon, trip.pickup_lat)?;
            let destination = self.locate(trip.dropoff_lon, trip.dropoff_lat)?;
            Some((trip.pickup_hour(), origin, destination))
        })
    }

    /// Trip counts per (origin, destination), sorted by pair.
    pub fn od_region_counts(&self, trips: &[OdTrip]) -> Vec<RegionPairCount> {
        let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for (_, origin, destination) in self.located_pairs(trips) {
            *counts.entry((origin, destination)).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|((origin, destination), count)| RegionPairCount {
                origin_region: origin.to_string(),
                destination_region: destination.to_string(),
                count,
            })
            .collect()
    }

    /// Trip counts per (pickup hour, origin, destination), sorted by that key.
    pub fn hourly_region_demand(&self, trips: &[OdTrip]) -> Vec<HourlyRegionDemand> {
        let mut counts: BTreeMap<(u32, &str, &str), usize> = BTreeMap::new();
        for key in self.located_pairs(trips) {
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|((hour, origin, destination), demand)| HourlyRegionDemand {
                hour,
                origin_region: origin.to_string(),
                destination_region: destination.to_string(),
                demand,
            })
            .collect()
    }

    /// Hourly region demand grouped by hour, with the hour's total.
    /// Hours without any located trip are absent.
    pub fn demand_by_hour(&self, trips: &[OdTrip]) -> Vec<HourlyDemand> {
        let mut by_hour: BTreeMap<u32, HourlyDemand> = BTreeMap::new();
        for row in self.hourly_region_demand(trips) {
            let entry = by_hour.entry(row.hour).or_insert_with(|| HourlyDemand {
                hour: row.hour,
                total_demand: 0,
                pairs: Vec::new(),
            });
            entry.total_demand += row.demand;
            entry.pairs.push(RegionPairCount {
                origin_region: row.origin_region,
                destination_region: row.destination_region,
                count: row.demand,
            });
        }
        by_hour.into_values().collect()
    }
}

fn feature_name(feature: &Feature, name_property: &str) -> Option<String> {
    match feature.property(name_property) {
        Some(serde_json::Value::String(s)) => return Some(s.clone()),
        Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
        _ => {}
    }
    match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    }
}
