//! Geometry aggregation by topological kind
//!
//! A phase's assets are grouped into polygons, lines and points and each
//! group is merged into a single multi-geometry, so the expensive spatial
//! predicates later run once per zone per kind instead of once per asset.

use geo::{
    BooleanOps, Geometry, GeometryCollection, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde::Serialize;

/// Kind of measure a geometry contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Polygon,
    Line,
    Point,
}

impl GeometryKind {
    /// Classify a stored geometry by its topological type.
    /// Collections return `None`; their members are classified one by one.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryKind::Line)
            }
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryKind::Point),
            Geometry::GeometryCollection(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Polygon => "polygon",
            GeometryKind::Line => "line",
            GeometryKind::Point => "point",
        }
    }
}

/// One merged geometry per kind. A kind with no assets is `None`, never an
/// empty-but-present geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedGeometry {
    pub polygons: Option<MultiPolygon<f64>>,
    pub lines: Option<MultiLineString<f64>>,
    pub points: Option<MultiPoint<f64>>,
}

impl AggregatedGeometry {
    /// No geometry of any kind
    pub fn is_empty(&self) -> bool {
        self.polygons.is_none() && self.lines.is_none() && self.points.is_none()
    }

    /// Kinds that are present
    pub fn kinds(&self) -> Vec<GeometryKind> {
        let mut kinds = Vec::new();
        if self.polygons.is_some() {
            kinds.push(GeometryKind::Polygon);
        }
        if self.lines.is_some() {
            kinds.push(GeometryKind::Line);
        }
        if self.points.is_some() {
            kinds.push(GeometryKind::Point);
        }
        kinds
    }

    /// The individual member geometries: each polygon, each line, each point
    pub fn members(&self) -> Vec<Geometry<f64>> {
        let mut members = Vec::new();
        if let Some(polygons) = &self.polygons {
            members.extend(polygons.iter().cloned().map(Geometry::Polygon));
        }
        if let Some(lines) = &self.lines {
            members.extend(lines.iter().cloned().map(Geometry::LineString));
        }
        if let Some(points) = &self.points {
            members.extend(points.iter().copied().map(Geometry::Point));
        }
        members
    }

    /// The whole set as one heterogeneous collection
    pub fn to_collection(&self) -> GeometryCollection<f64> {
        let mut parts = Vec::new();
        if let Some(polygons) = &self.polygons {
            parts.push(Geometry::MultiPolygon(polygons.clone()));
        }
        if let Some(lines) = &self.lines {
            parts.push(Geometry::MultiLineString(lines.clone()));
        }
        if let Some(points) = &self.points {
            parts.push(Geometry::MultiPoint(points.clone()));
        }
        GeometryCollection::new_from(parts)
    }
}

#[derive(Default)]
struct Buckets {
    polygons: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    points: Vec<Point<f64>>,
}

impl Buckets {
    fn push(&mut self, geometry: &Geometry<f64>) {
        match geometry {
            Geometry::Polygon(p) => self.polygons.push(p.clone()),
            Geometry::MultiPolygon(mp) => self.polygons.extend(mp.iter().cloned()),
            Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
            Geometry::Line(l) => self.lines.push(LineString::from(vec![l.start, l.end])),
            Geometry::LineString(ls) => self.lines.push(ls.clone()),
            Geometry::MultiLineString(mls) => self.lines.extend(mls.iter().cloned()),
            Geometry::Point(p) => self.points.push(*p),
            Geometry::MultiPoint(mp) => self.points.extend(mp.iter().copied()),
            Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| self.push(g)),
        }
    }
}

/// Group geometries by kind and merge each group
pub fn aggregate<'a, I>(geometries: I) -> AggregatedGeometry
where
    I: IntoIterator<Item = &'a Geometry<f64>>,
{
    let mut buckets = Buckets::default();
    for geometry in geometries {
        buckets.push(geometry);
    }

    AggregatedGeometry {
        polygons: union_polygons(buckets.polygons),
        lines: merge_lines(buckets.lines),
        points: merge_points(buckets.points),
    }
}

/// Dissolve overlapping polygons so shared area is counted once
fn union_polygons(polygons: Vec<Polygon<f64>>) -> Option<MultiPolygon<f64>> {
    let mut iter = polygons.into_iter();
    let first = MultiPolygon::new(vec![iter.next()?]);
    Some(iter.fold(first, |acc, polygon| {
        acc.union(&MultiPolygon::new(vec![polygon]))
    }))
}

/// Identical lines collapse to one; distinct lines are kept as drawn and
/// their overlaps are dissolved per zone when clipped
fn merge_lines(mut lines: Vec<LineString<f64>>) -> Option<MultiLineString<f64>> {
    if lines.is_empty() {
        return None;
    }
    let mut merged: Vec<LineString<f64>> = Vec::with_capacity(lines.len());
    for line in lines.drain(..) {
        if !merged.contains(&line) {
            merged.push(line);
        }
    }
    Some(MultiLineString::new(merged))
}

/// Coincident points collapse to one
fn merge_points(mut points: Vec<Point<f64>>) -> Option<MultiPoint<f64>> {
    if points.is_empty() {
        return None;
    }
    points.sort_by(|a, b| a.x().total_cmp(&b.x()).then(a.y().total_cmp(&b.y())));
    points.dedup();
    Some(MultiPoint::new(points))
}
