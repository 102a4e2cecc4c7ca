//! GeoJSON text <-> `geo` geometry conversion
//!
//! Asset geometries and reference boundaries are persisted as GeoJSON
//! geometry objects.

use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;

use crate::error::GisError;

/// Parse a GeoJSON geometry (or a Feature carrying one)
pub fn parse_geometry(text: &str) -> Result<Geometry<f64>, GisError> {
    let geojson: GeoJson = text.parse()?;

    let geometry = match geojson {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| GisError::InvalidGeometry("feature has no geometry".into()))?,
        GeoJson::FeatureCollection(_) => {
            return Err(GisError::InvalidInput(
                "expected a single geometry, got a FeatureCollection".into(),
            ))
        }
    };

    Ok(Geometry::<f64>::try_from(geometry)?)
}

/// Serialize a geometry as a GeoJSON geometry object
pub fn to_geojson_string(geometry: &Geometry<f64>) -> Result<String, GisError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(geometry));
    Ok(serde_json::to_string(&geometry)?)
}

/// Coerce a reference boundary into a MultiPolygon
pub fn into_boundary(geometry: Geometry<f64>) -> Result<MultiPolygon<f64>, GisError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        other => Err(GisError::InvalidGeometry(format!(
            "boundary must be a Polygon or MultiPolygon, got {}",
            type_name(&other)
        ))),
    }
}

/// Short topological type name, used in error messages
pub fn type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
