//! Reference polygons: zones and political districts
//!
//! Reference data is loaded once by administrative tooling and read on every
//! recomputation. Boundaries are decoded into [`ReferenceArea`]s for the
//! intersector.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::{Geometry, MultiPolygon};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::GisError;
use crate::gis::{codec, validate::validate, ReferenceArea};

/// Political district partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistrictKind {
    House,
    Senate,
    Commissioner,
}

impl DistrictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistrictKind::House => "house",
            DistrictKind::Senate => "senate",
            DistrictKind::Commissioner => "commissioner",
        }
    }
}

impl fmt::Display for DistrictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistrictKind {
    type Err = GisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house" => Ok(DistrictKind::House),
            "senate" => Ok(DistrictKind::Senate),
            "commissioner" => Ok(DistrictKind::Commissioner),
            other => Err(GisError::InvalidInput(format!("Invalid district kind: {}", other))),
        }
    }
}

/// Zone row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRow {
    pub id: String,
    pub name: String,
    pub boundary: String,
    pub equity_index: f64,
}

impl ZoneRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            boundary: row.get("boundary")?,
            equity_index: row.get("equity_index")?,
        })
    }
}

/// District row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictRow {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub boundary: String,
}

impl DistrictRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            name: row.get("name")?,
            boundary: row.get("boundary")?,
        })
    }
}

fn boundary_text(boundary: &MultiPolygon<f64>) -> Result<String, GisError> {
    let geometry = Geometry::MultiPolygon(boundary.clone());
    validate(&geometry)?;
    codec::to_geojson_string(&geometry)
}

fn to_area(id: String, name: String, boundary: &str) -> Result<ReferenceArea, GisError> {
    let boundary = codec::into_boundary(codec::parse_geometry(boundary)?)?;
    Ok(ReferenceArea::new(id, name, boundary))
}

// ============================================================================
// Zones
// ============================================================================

/// Insert a zone
pub fn insert_zone(
    conn: &Connection,
    name: &str,
    boundary: &MultiPolygon<f64>,
    equity_index: f64,
) -> Result<ZoneRow, GisError> {
    if !(0.0..=1.0).contains(&equity_index) {
        return Err(GisError::InvalidInput(format!(
            "Equity index must be between 0.0 and 1.0, got: {}",
            equity_index
        )));
    }

    let row = ZoneRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        boundary: boundary_text(boundary)?,
        equity_index,
    };

    conn.execute(
        "INSERT INTO zones (id, name, boundary, equity_index) VALUES (?1, ?2, ?3, ?4)",
        params![row.id, row.name, row.boundary, row.equity_index],
    ).map_err(|e| GisError::Database(format!("Failed to insert zone: {}", e)))?;

    debug!(zone = %row.name, "Inserted zone");
    Ok(row)
}

/// All zones by name
pub fn list_zones(conn: &Connection) -> Result<Vec<ZoneRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM zones ORDER BY name")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| ZoneRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Decoded zone boundaries
pub fn load_zone_areas(conn: &Connection) -> Result<Vec<ReferenceArea>, GisError> {
    list_zones(conn)?
        .into_iter()
        .map(|z| to_area(z.id, z.name, &z.boundary))
        .collect()
}

/// Zone id -> equity index, covering the whole partition
pub fn zone_equity_index(conn: &Connection) -> Result<BTreeMap<String, f64>, GisError> {
    Ok(list_zones(conn)?
        .into_iter()
        .map(|z| (z.id, z.equity_index))
        .collect())
}

// ============================================================================
// Districts
// ============================================================================

/// Insert a district
pub fn insert_district(
    conn: &Connection,
    kind: DistrictKind,
    name: &str,
    boundary: &MultiPolygon<f64>,
) -> Result<DistrictRow, GisError> {
    let row = DistrictRow {
        id: Uuid::new_v4().to_string(),
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        boundary: boundary_text(boundary)?,
    };

    conn.execute(
        "INSERT INTO districts (id, kind, name, boundary) VALUES (?1, ?2, ?3, ?4)",
        params![row.id, row.kind, row.name, row.boundary],
    ).map_err(|e| GisError::Database(format!("Failed to insert district: {}", e)))?;

    debug!(kind = %kind, district = %row.name, "Inserted district");
    Ok(row)
}

/// Districts, optionally of one kind
pub fn list_districts(conn: &Connection, kind: Option<DistrictKind>) -> Result<Vec<DistrictRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM districts WHERE (?1 IS NULL OR kind = ?1) ORDER BY kind, name")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![kind.map(|k| k.as_str())], |row| DistrictRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Decoded district boundaries of every kind
pub fn load_district_areas(conn: &Connection) -> Result<Vec<ReferenceArea>, GisError> {
    list_districts(conn, None)?
        .into_iter()
        .map(|d| to_area(d.id, d.name, &d.boundary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PlannerDb;
    use geo::polygon;

    fn square(x0: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: 0.0),
            (x: x0 + 10.0, y: 0.0),
            (x: x0 + 10.0, y: 10.0),
            (x: x0, y: 10.0),
        ]])
    }

    #[test]
    fn test_zones_round_trip_to_areas() {
        let db = PlannerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_zone(conn, "Zone 1", &square(0.0), 0.25)?;
            insert_zone(conn, "Zone 2", &square(10.0), 0.75)?;

            let areas = load_zone_areas(conn)?;
            assert_eq!(areas.len(), 2);
            assert_eq!(areas[0].name, "Zone 1");
            assert_eq!(areas[0].boundary, square(0.0));

            let equity = zone_equity_index(conn)?;
            assert_eq!(equity.get(&areas[1].id), Some(&0.75));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_equity_index_out_of_range() {
        let db = PlannerDb::open_in_memory().unwrap();
        let result = db.with_conn(|conn| insert_zone(conn, "Zone X", &square(0.0), 1.5));
        assert!(matches!(result, Err(GisError::InvalidInput(_))));
    }

    #[test]
    fn test_districts_filter_by_kind() {
        let db = PlannerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_district(conn, DistrictKind::House, "House 7", &square(0.0))?;
            insert_district(conn, DistrictKind::Senate, "Senate 2", &square(0.0))?;
            insert_district(conn, DistrictKind::Commissioner, "District 3", &square(10.0))?;

            assert_eq!(list_districts(conn, Some(DistrictKind::Senate))?.len(), 1);
            assert_eq!(list_districts(conn, None)?.len(), 3);
            assert_eq!(load_district_areas(conn)?.len(), 3);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_district_kind_parse() {
        assert_eq!("commissioner".parse::<DistrictKind>().unwrap(), DistrictKind::Commissioner);
        assert!("mayor".parse::<DistrictKind>().is_err());
    }
}
