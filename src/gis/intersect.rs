//! Zone and district attribution
//!
//! Zones use "intersects": an asset may straddle several zones and each one
//! gets a share. Districts use "contains": a district is attributed when its
//! boundary wholly contains at least one member geometry.

use geo::{BoundingRect, Contains, Geometry, Intersects, MultiPolygon, Rect};

use super::aggregate::AggregatedGeometry;

/// A named reference polygon: a zone or a political district
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceArea {
    pub id: String,
    pub name: String,
    pub boundary: MultiPolygon<f64>,
}

impl ReferenceArea {
    pub fn new(id: impl Into<String>, name: impl Into<String>, boundary: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            boundary,
        }
    }

    fn intersects_aggregate(&self, aggregate: &AggregatedGeometry) -> bool {
        aggregate.polygons.as_ref().is_some_and(|p| self.boundary.intersects(p))
            || aggregate.lines.as_ref().is_some_and(|l| self.boundary.intersects(l))
            || aggregate.points.as_ref().is_some_and(|p| self.boundary.intersects(p))
    }

    fn contains_member(&self, member: &Geometry<f64>) -> bool {
        match member {
            Geometry::Polygon(polygon) => self.boundary.contains(polygon),
            Geometry::LineString(line) => self.boundary.contains(line),
            Geometry::Point(point) => self.boundary.contains(point),
            _ => false,
        }
    }
}

/// Cheap rejection before the exact predicate
fn envelopes_overlap(area: &ReferenceArea, envelope: Option<Rect<f64>>) -> bool {
    match (area.boundary.bounding_rect(), envelope) {
        (Some(a), Some(b)) => a.intersects(&b),
        _ => false,
    }
}

/// Reference areas whose boundary intersects any part of the aggregate.
/// Touching no area is valid and returns an empty list.
pub fn intersecting<'a>(
    aggregate: &AggregatedGeometry,
    areas: &'a [ReferenceArea],
) -> Vec<&'a ReferenceArea> {
    if aggregate.is_empty() {
        return Vec::new();
    }
    let envelope = aggregate.to_collection().bounding_rect();

    areas
        .iter()
        .filter(|area| envelopes_overlap(area, envelope))
        .filter(|area| area.intersects_aggregate(aggregate))
        .collect()
}

/// Reference areas that wholly contain at least one member geometry
pub fn containing<'a>(
    aggregate: &AggregatedGeometry,
    areas: &'a [ReferenceArea],
) -> Vec<&'a ReferenceArea> {
    if aggregate.is_empty() {
        return Vec::new();
    }
    let members = aggregate.members();
    let envelope = aggregate.to_collection().bounding_rect();

    areas
        .iter()
        .filter(|area| envelopes_overlap(area, envelope))
        .filter(|area| members.iter().any(|m| area.contains_member(m)))
        .collect()
}
