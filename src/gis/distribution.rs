//! Per-zone distribution of a phase's measure
//!
//! For every zone the aggregate is clipped to the zone boundary and measured
//! by kind: area for polygons, length for lines, count for points. The
//! per-kind shares are then combined with equal weight per present kind:
//!
//! ```text
//! share_k(z)      = m_k(z) / Σ_z m_k(z)
//! proportion(z)   = (1 / K) · Σ_k share_k(z)      K = kinds with in-zone measure
//! ```
//!
//! Units are never added together, and normalising by the in-zone total keeps
//! the proportions summing to 1.0 even when part of an asset lies outside the
//! partition.

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, EuclideanLength, Intersects};
use serde::Serialize;

use crate::error::GisError;

use super::aggregate::AggregatedGeometry;
use super::intersect::ReferenceArea;

/// Measures below this are treated as zero (boolean-op slivers)
pub const MEASURE_EPSILON: f64 = 1e-9;

/// Raw measure of the aggregate inside one zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KindMeasures {
    pub area: f64,
    pub length: f64,
    pub points: usize,
}

impl KindMeasures {
    fn is_zero(&self) -> bool {
        self.area < MEASURE_EPSILON && self.length < MEASURE_EPSILON && self.points == 0
    }
}

/// Zone id -> proportion of the phase's measure
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ZoneDistribution {
    proportions: BTreeMap<String, f64>,
}

impl ZoneDistribution {
    pub fn from_map(proportions: BTreeMap<String, f64>) -> Self {
        Self { proportions }
    }

    pub fn get(&self, zone_id: &str) -> Option<f64> {
        self.proportions.get(zone_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.proportions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Zone ids with a nonzero share
    pub fn zone_ids(&self) -> Vec<&str> {
        self.iter().filter(|(_, p)| *p > 0.0).map(|(z, _)| z).collect()
    }

    pub fn len(&self) -> usize {
        self.proportions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proportions.is_empty()
    }

    /// Sum of all proportions: 1.0 with measure, 0.0 without
    pub fn total(&self) -> f64 {
        self.proportions.values().sum()
    }
}

/// Measure the aggregate inside each zone. Zones with no measure are omitted.
pub fn measure_zones(
    aggregate: &AggregatedGeometry,
    zones: &[&ReferenceArea],
) -> Result<BTreeMap<String, KindMeasures>, GisError> {
    let mut measures = BTreeMap::new();

    for zone in zones {
        let area = aggregate
            .polygons
            .as_ref()
            .map_or(0.0, |p| zone.boundary.intersection(p).unsigned_area());
        let length = aggregate
            .lines
            .as_ref()
            .map_or(0.0, |l| zone.boundary.clip(l, false).euclidean_length());
        let points = aggregate
            .points
            .as_ref()
            .map_or(0, |p| p.iter().filter(|pt| zone.boundary.intersects(*pt)).count());

        if !area.is_finite() || !length.is_finite() {
            return Err(GisError::InvalidGeometry(format!(
                "non-finite measure inside zone {}",
                zone.name
            )));
        }

        let measure = KindMeasures { area, length, points };
        if !measure.is_zero() {
            measures.insert(zone.id.clone(), measure);
        }
    }

    Ok(measures)
}

/// Combine per-zone measures into proportions summing to 1.0
pub fn combine(measures: &BTreeMap<String, KindMeasures>) -> ZoneDistribution {
    let total_area: f64 = measures.values().map(|m| m.area).sum();
    let total_length: f64 = measures.values().map(|m| m.length).sum();
    let total_points: usize = measures.values().map(|m| m.points).sum();

    let has_area = total_area >= MEASURE_EPSILON;
    let has_length = total_length >= MEASURE_EPSILON;
    let has_points = total_points > 0;

    let present = [has_area, has_length, has_points].iter().filter(|p| **p).count();
    if present == 0 {
        return ZoneDistribution::default();
    }

    let proportions = measures
        .iter()
        .map(|(zone_id, m)| {
            let mut sum = 0.0;
            if has_area {
                sum += m.area / total_area;
            }
            if has_length {
                sum += m.length / total_length;
            }
            if has_points {
                sum += m.points as f64 / total_points as f64;
            }
            (zone_id.clone(), sum / present as f64)
        })
        .filter(|(_, p)| *p > 0.0)
        .collect();

    ZoneDistribution::from_map(proportions)
}

/// Measure and combine in one step
pub fn distribute(
    aggregate: &AggregatedGeometry,
    zones: &[&ReferenceArea],
) -> Result<ZoneDistribution, GisError> {
    if aggregate.is_empty() {
        return Ok(ZoneDistribution::default());
    }
    let measures = measure_zones(aggregate, zones)?;
    Ok(combine(&measures))
}

/// Currency share of a budget, rounded half away from zero to whole cents
pub fn apportion_cents(total_cents: i64, proportion: f64) -> i64 {
    (total_cents as f64 * proportion).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::aggregate::aggregate;
    use crate::gis::intersect::intersecting;
    use geo::{line_string, point, polygon, Geometry, MultiPolygon};

    fn zone(id: &str, x0: f64, size: f64) -> ReferenceArea {
        ReferenceArea::new(
            id,
            id,
            MultiPolygon::new(vec![polygon![
                (x: x0, y: 0.0),
                (x: x0 + size, y: 0.0),
                (x: x0 + size, y: size),
                (x: x0, y: size),
            ]]),
        )
    }

    fn zones() -> Vec<ReferenceArea> {
        vec![zone("zone-1", 0.0, 10.0), zone("zone-2", 10.0, 10.0)]
    }

    fn run(geoms: &[Geometry<f64>]) -> ZoneDistribution {
        let agg = aggregate(geoms);
        let zones = zones();
        let touched = intersecting(&agg, &zones);
        distribute(&agg, &touched).unwrap()
    }

    #[test]
    fn test_single_point_goes_to_one_zone() {
        let dist = run(&[Geometry::Point(point!(x: 2.0, y: 2.0))]);
        assert_eq!(dist.len(), 1);
        assert_eq!(dist.get("zone-1"), Some(1.0));
    }

    #[test]
    fn test_points_split_by_count() {
        let dist = run(&[
            Geometry::Point(point!(x: 2.0, y: 2.0)),
            Geometry::Point(point!(x: 12.0, y: 2.0)),
        ]);
        assert_eq!(dist.get("zone-1"), Some(0.5));
        assert_eq!(dist.get("zone-2"), Some(0.5));
    }

    #[test]
    fn test_polygon_split_by_area() {
        let dist = run(&[Geometry::Polygon(polygon![
            (x: 3.0, y: 0.0),
            (x: 13.0, y: 0.0),
            (x: 13.0, y: 10.0),
            (x: 3.0, y: 10.0),
        ])]);
        assert!((dist.get("zone-1").unwrap() - 0.7).abs() < 1e-6);
        assert!((dist.get("zone-2").unwrap() - 0.3).abs() < 1e-6);
        assert!((dist.total() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_line_split_by_length() {
        let dist = run(&[Geometry::LineString(line_string![(x: 8.0, y: 5.0), (x: 16.0, y: 5.0)])]);
        assert!((dist.get("zone-1").unwrap() - 0.25).abs() < 1e-6);
        assert!((dist.get("zone-2").unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_kinds_weigh_equally() {
        // polygon wholly in zone-1, point wholly in zone-2
        let dist = run(&[
            Geometry::Polygon(polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0)]),
            Geometry::Point(point!(x: 15.0, y: 5.0)),
        ]);
        assert!((dist.get("zone-1").unwrap() - 0.5).abs() < 1e-9);
        assert!((dist.get("zone-2").unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_part_outside_partition_still_sums_to_one() {
        let dist = run(&[Geometry::LineString(line_string![(x: 5.0, y: 5.0), (x: 5.0, y: 50.0)])]);
        assert_eq!(dist.len(), 1);
        assert!((dist.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_geometry_is_zero() {
        let dist = run(&[]);
        assert!(dist.is_empty());
        assert_eq!(dist.total(), 0.0);
    }

    #[test]
    fn test_apportion_rounds_to_cents() {
        assert_eq!(apportion_cents(25_000_000, 0.5), 12_500_000);
        assert_eq!(apportion_cents(100, 1.0 / 3.0), 33);
        assert_eq!(apportion_cents(5, 0.5), 3);
        assert_eq!(apportion_cents(0, 0.7), 0);
    }
}
