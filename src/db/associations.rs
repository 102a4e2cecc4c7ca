//! Derived project <-> zone / district associations
//!
//! Each association records the phase whose geometry produced it. Adding is
//! idempotent and never removes anything; only clearing a phase does.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::GisError;

/// A zone or district linked to a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociatedArea {
    pub id: String,
    pub name: String,
    /// District kind; `None` for zones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Link zones to a project on behalf of a phase
pub fn add_project_zones(
    conn: &Connection,
    project_id: &str,
    phase_id: &str,
    zone_ids: &[&str],
) -> Result<usize, GisError> {
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO project_zones (project_id, zone_id, phase_id) VALUES (?1, ?2, ?3)")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let mut added = 0;
    for zone_id in zone_ids {
        added += stmt
            .execute(params![project_id, zone_id, phase_id])
            .map_err(|e| GisError::Database(format!("Failed to link zone: {}", e)))?;
    }
    Ok(added)
}

/// Link districts to a project on behalf of a phase
pub fn add_project_districts(
    conn: &Connection,
    project_id: &str,
    phase_id: &str,
    district_ids: &[&str],
) -> Result<usize, GisError> {
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO project_districts (project_id, district_id, phase_id) VALUES (?1, ?2, ?3)")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let mut added = 0;
    for district_id in district_ids {
        added += stmt
            .execute(params![project_id, district_id, phase_id])
            .map_err(|e| GisError::Database(format!("Failed to link district: {}", e)))?;
    }
    Ok(added)
}

/// Drop every association a phase produced. Returns (zones, districts) removed.
pub fn clear_phase_associations(conn: &Connection, phase_id: &str) -> Result<(usize, usize), GisError> {
    let zones = conn
        .execute("DELETE FROM project_zones WHERE phase_id = ?", params![phase_id])
        .map_err(|e| GisError::Database(format!("Failed to clear zone links: {}", e)))?;

    let districts = conn
        .execute("DELETE FROM project_districts WHERE phase_id = ?", params![phase_id])
        .map_err(|e| GisError::Database(format!("Failed to clear district links: {}", e)))?;

    Ok((zones, districts))
}

/// Distinct zones linked to a project through any phase
pub fn list_project_zones(conn: &Connection, project_id: &str) -> Result<Vec<AssociatedArea>, GisError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT DISTINCT z.id, z.name FROM project_zones pz
               JOIN zones z ON z.id = pz.zone_id
               WHERE pz.project_id = ?
               ORDER BY z.name"#,
        )
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok(AssociatedArea {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: None,
            })
        })
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Distinct districts linked to a project through any phase
pub fn list_project_districts(conn: &Connection, project_id: &str) -> Result<Vec<AssociatedArea>, GisError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT DISTINCT d.id, d.name, d.kind FROM project_districts pd
               JOIN districts d ON d.id = pd.district_id
               WHERE pd.project_id = ?
               ORDER BY d.kind, d.name"#,
        )
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok(AssociatedArea {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: Some(row.get(2)?),
            })
        })
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}
