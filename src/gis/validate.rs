//! Geometry validity checks
//!
//! Boolean operations on invalid input give meaningless measures, so every
//! geometry is checked before it is stored or aggregated.

use geo::algorithm::line_intersection::line_intersection;
use geo::{Area, Contains, Coord, Geometry, Line, LineString, Polygon};

use crate::error::GisError;

use super::codec::type_name;
use super::distribution::MEASURE_EPSILON;

/// Validate a geometry, returning the first problem found
pub fn validate(geometry: &Geometry<f64>) -> Result<(), GisError> {
    match geometry {
        Geometry::Point(point) => check_coord(point.0),
        Geometry::MultiPoint(points) => {
            if points.0.is_empty() {
                return Err(empty("MultiPoint"));
            }
            points.iter().try_for_each(|p| check_coord(p.0))
        }
        Geometry::Line(line) => validate_line_string(&LineString::from(vec![line.start, line.end])),
        Geometry::LineString(line) => validate_line_string(line),
        Geometry::MultiLineString(lines) => {
            if lines.0.is_empty() {
                return Err(empty("MultiLineString"));
            }
            lines.iter().try_for_each(validate_line_string)
        }
        Geometry::Polygon(polygon) => validate_polygon(polygon),
        Geometry::MultiPolygon(polygons) => {
            if polygons.0.is_empty() {
                return Err(empty("MultiPolygon"));
            }
            polygons.iter().try_for_each(validate_polygon)
        }
        Geometry::Rect(rect) => validate_polygon(&rect.to_polygon()),
        Geometry::Triangle(triangle) => validate_polygon(&triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => {
            if collection.0.is_empty() {
                return Err(empty(type_name(geometry)));
            }
            collection.iter().try_for_each(validate)
        }
    }
}

fn empty(kind: &str) -> GisError {
    GisError::InvalidGeometry(format!("empty {}", kind))
}

fn check_coord(coord: Coord<f64>) -> Result<(), GisError> {
    if coord.x.is_finite() && coord.y.is_finite() {
        Ok(())
    } else {
        Err(GisError::InvalidGeometry(format!(
            "non-finite coordinate ({}, {})",
            coord.x, coord.y
        )))
    }
}

fn validate_line_string(line: &LineString<f64>) -> Result<(), GisError> {
    line.coords().try_for_each(|c| check_coord(*c))?;

    let distinct = distinct_coords(line);
    if distinct.len() < 2 {
        return Err(GisError::InvalidGeometry(
            "line needs at least two distinct points".into(),
        ));
    }
    Ok(())
}

fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), GisError> {
    validate_ring(polygon.exterior(), "exterior")?;
    for (i, ring) in polygon.interiors().iter().enumerate() {
        validate_ring(ring, &format!("interior {}", i))?;
    }
    validate_ring_layout(polygon)?;

    if polygon.unsigned_area() < MEASURE_EPSILON {
        return Err(GisError::InvalidGeometry("polygon has no area".into()));
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>, label: &str) -> Result<(), GisError> {
    ring.coords().try_for_each(|c| check_coord(*c))?;

    // closed ring: first == last, so four coords means three distinct corners
    let coords = distinct_coords(ring);
    if coords.len() < 4 {
        return Err(GisError::InvalidGeometry(format!(
            "{} ring needs at least three distinct corners",
            label
        )));
    }

    if ring_self_intersects(&coords) {
        return Err(GisError::InvalidGeometry(format!(
            "{} ring is self-intersecting",
            label
        )));
    }
    Ok(())
}

/// Holes must sit strictly inside the shell, apart from each other
fn validate_ring_layout(polygon: &Polygon<f64>) -> Result<(), GisError> {
    let interiors = polygon.interiors();
    if interiors.is_empty() {
        return Ok(());
    }

    let shell = Polygon::new(polygon.exterior().clone(), vec![]);
    let mut rings: Vec<&LineString<f64>> = vec![polygon.exterior()];
    rings.extend(interiors.iter());

    for i in 0..rings.len() {
        for j in (i + 1)..rings.len() {
            if rings_touch(rings[i], rings[j]) {
                return Err(GisError::InvalidGeometry(format!(
                    "{} crosses {}",
                    ring_label(i),
                    ring_label(j)
                )));
            }
        }
    }

    for (i, ring) in interiors.iter().enumerate() {
        if !shell.contains(ring) {
            return Err(GisError::InvalidGeometry(format!(
                "interior {} lies outside the exterior ring",
                i
            )));
        }
    }

    // no crossings, so one vertex decides whether a hole nests in another
    for (i, ring) in interiors.iter().enumerate() {
        for (j, other) in interiors.iter().enumerate() {
            if i == j {
                continue;
            }
            let nested = ring
                .0
                .first()
                .map(|c| Polygon::new(other.clone(), vec![]).contains(c))
                .unwrap_or(false);
            if nested {
                return Err(GisError::InvalidGeometry(format!(
                    "interior {} is nested inside interior {}",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

fn ring_label(index: usize) -> String {
    match index {
        0 => "exterior ring".to_string(),
        n => format!("interior {}", n - 1),
    }
}

/// True when any segment of one ring meets any segment of the other
fn rings_touch(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    a.lines()
        .any(|left| b.lines().any(|right| line_intersection(left, right).is_some()))
}

/// Coordinates with consecutive duplicates removed
fn distinct_coords(line: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = line.coords().copied().collect();
    coords.dedup();
    coords
}

/// True when two non-adjacent segments of a closed ring touch
fn ring_self_intersects(coords: &[Coord<f64>]) -> bool {
    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if line_intersection(segments[i], segments[j]).is_some() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string, point, polygon, MultiPoint};

    #[test]
    fn test_square_is_valid() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        assert!(validate(&Geometry::Polygon(square)).is_ok());
    }

    #[test]
    fn test_bowtie_is_self_intersecting() {
        let bowtie = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)];
        let err = validate(&Geometry::Polygon(bowtie)).unwrap_err();
        assert!(err.to_string().contains("self-intersecting"));
    }

    #[test]
    fn test_collapsed_polygon_rejected() {
        let flat = polygon![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 10.0, y: 0.0)];
        assert!(matches!(
            validate(&Geometry::Polygon(flat)),
            Err(GisError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_single_point_line_rejected() {
        let line = line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 1.0)];
        assert!(validate(&Geometry::LineString(line)).is_err());
    }

    #[test]
    fn test_nan_point_rejected() {
        let p = point!(x: f64::NAN, y: 0.0);
        assert!(validate(&Geometry::Point(p)).is_err());
    }

    #[test]
    fn test_empty_multipoint_rejected() {
        let empty: MultiPoint<f64> = MultiPoint::new(vec![]);
        assert!(validate(&Geometry::MultiPoint(empty)).is_err());
    }

    #[test]
    fn test_hole_inside_shell_is_valid() {
        let shell = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let hole = line_string![(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0), (x: 2.0, y: 2.0)];
        assert!(validate(&Geometry::Polygon(Polygon::new(shell, vec![hole]))).is_ok());
    }

    #[test]
    fn test_hole_crossing_shell_rejected() {
        let shell = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let hole = line_string![(x: 5.0, y: 2.0), (x: 15.0, y: 2.0), (x: 15.0, y: 8.0), (x: 5.0, y: 8.0), (x: 5.0, y: 2.0)];
        let err = validate(&Geometry::Polygon(Polygon::new(shell, vec![hole]))).unwrap_err();
        assert!(err.to_string().contains("crosses"), "{}", err);
    }

    #[test]
    fn test_hole_outside_shell_rejected() {
        let shell = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let hole = line_string![(x: 20.0, y: 2.0), (x: 24.0, y: 2.0), (x: 24.0, y: 4.0), (x: 20.0, y: 4.0), (x: 20.0, y: 2.0)];
        let err = validate(&Geometry::Polygon(Polygon::new(shell, vec![hole]))).unwrap_err();
        assert!(err.to_string().contains("outside"), "{}", err);
    }

    #[test]
    fn test_crossing_holes_rejected() {
        let shell = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let a = line_string![(x: 1.0, y: 1.0), (x: 5.0, y: 1.0), (x: 5.0, y: 5.0), (x: 1.0, y: 5.0), (x: 1.0, y: 1.0)];
        let b = line_string![(x: 3.0, y: 3.0), (x: 8.0, y: 3.0), (x: 8.0, y: 8.0), (x: 3.0, y: 8.0), (x: 3.0, y: 3.0)];
        let err = validate(&Geometry::Polygon(Polygon::new(shell, vec![a, b]))).unwrap_err();
        assert!(err.to_string().contains("interior 0 crosses interior 1"), "{}", err);
    }

    #[test]
    fn test_nested_holes_rejected() {
        let shell = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let outer = line_string![(x: 1.0, y: 1.0), (x: 9.0, y: 1.0), (x: 9.0, y: 9.0), (x: 1.0, y: 9.0), (x: 1.0, y: 1.0)];
        let inner = line_string![(x: 3.0, y: 3.0), (x: 5.0, y: 3.0), (x: 5.0, y: 5.0), (x: 3.0, y: 5.0), (x: 3.0, y: 3.0)];
        let err = validate(&Geometry::Polygon(Polygon::new(shell, vec![outer, inner]))).unwrap_err();
        assert!(err.to_string().contains("nested"), "{}", err);
    }

    #[test]
    fn test_repeated_vertices_are_tolerated() {
        let ring = line_string![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
            (x: 0.0, y: 0.0)
        ];
        let polygon = Polygon::new(ring, vec![]);
        assert!(validate(&Geometry::Polygon(polygon)).is_ok());
        assert!(check_coord(coord! { x: 1.0, y: 2.0 }).is_ok());
    }
}
