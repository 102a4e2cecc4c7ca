//! Local asset storage

use geo::Geometry;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::current_timestamp;
use crate::error::GisError;
use crate::gis::codec;
use crate::gis::GeometryKind;

/// Local asset row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRow {
    pub id: String,
    pub phase_id: String,
    /// External asset identifier
    pub asset_id: Option<String>,
    pub asset_type: Option<String>,
    pub name: Option<String>,
    /// GeoJSON geometry text
    pub geometry: String,
    pub geometry_kind: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AssetRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            phase_id: row.get("phase_id")?,
            asset_id: row.get("asset_id")?,
            asset_type: row.get("asset_type")?,
            name: row.get("name")?,
            geometry: row.get("geometry")?,
            geometry_kind: row.get("geometry_kind")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Decode the stored geometry
    pub fn parse_geometry(&self) -> Result<Geometry<f64>, GisError> {
        codec::parse_geometry(&self.geometry)
    }
}

/// Input for creating an asset
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssetInput {
    pub phase_id: String,
    /// GeoJSON geometry object (or a Feature wrapping one)
    pub geometry: serde_json::Value,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Insert an asset with an already validated geometry
pub fn insert_asset(
    conn: &Connection,
    input: &CreateAssetInput,
    geometry: &Geometry<f64>,
    kind: GeometryKind,
) -> Result<AssetRow, GisError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let geometry_text = codec::to_geojson_string(geometry)?;

    conn.execute(
        r#"INSERT INTO local_assets
           (id, phase_id, asset_id, asset_type, name, geometry, geometry_kind, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
        params![
            id,
            input.phase_id,
            input.asset_id,
            input.asset_type,
            input.name,
            geometry_text,
            kind.as_str(),
            now,
        ],
    ).map_err(|e| GisError::Database(format!("Failed to insert asset: {}", e)))?;

    debug!(asset = %id, phase_id = %input.phase_id, kind = kind.as_str(), "Inserted asset");

    get_asset(conn, &id)?
        .ok_or_else(|| GisError::Internal(format!("Asset {} vanished after insert", id)))
}

/// Replace an asset's geometry. Returns false when the asset does not exist.
pub fn update_asset_geometry(
    conn: &Connection,
    id: &str,
    geometry: &Geometry<f64>,
    kind: GeometryKind,
) -> Result<bool, GisError> {
    let geometry_text = codec::to_geojson_string(geometry)?;

    let updated = conn
        .execute(
            "UPDATE local_assets SET geometry = ?1, geometry_kind = ?2, updated_at = ?3 WHERE id = ?4",
            params![geometry_text, kind.as_str(), current_timestamp(), id],
        )
        .map_err(|e| GisError::Database(format!("Failed to update asset: {}", e)))?;

    Ok(updated > 0)
}

/// Get an asset by ID
pub fn get_asset(conn: &Connection, id: &str) -> Result<Option<AssetRow>, GisError> {
    conn.query_row("SELECT * FROM local_assets WHERE id = ?", params![id], |row| AssetRow::from_row(row))
        .optional()
        .map_err(|e| GisError::Database(format!("Failed to get asset: {}", e)))
}

/// Delete an asset. Returns false when it did not exist.
pub fn delete_asset(conn: &Connection, id: &str) -> Result<bool, GisError> {
    let deleted = conn
        .execute("DELETE FROM local_assets WHERE id = ?", params![id])
        .map_err(|e| GisError::Database(format!("Failed to delete asset: {}", e)))?;

    Ok(deleted > 0)
}

/// All current assets of a phase
pub fn list_assets_for_phase(conn: &Connection, phase_id: &str) -> Result<Vec<AssetRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM local_assets WHERE phase_id = ? ORDER BY created_at, id")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![phase_id], |row| AssetRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// All current assets of a project, optionally leaving one phase out
pub fn list_assets_for_project(
    conn: &Connection,
    project_id: &str,
    exclude_phase: Option<&str>,
) -> Result<Vec<AssetRow>, GisError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT a.* FROM local_assets a
               JOIN phases p ON p.id = a.phase_id
               WHERE p.project_id = ?1 AND (?2 IS NULL OR a.phase_id <> ?2)
               ORDER BY p.sequence, a.created_at, a.id"#,
        )
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![project_id, exclude_phase], |row| AssetRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Number of assets currently attached to a phase
pub fn count_assets_for_phase(conn: &Connection, phase_id: &str) -> Result<i64, GisError> {
    conn.query_row(
        "SELECT COUNT(*) FROM local_assets WHERE phase_id = ?",
        params![phase_id],
        |row| row.get(0),
    )
    .map_err(|e| GisError::Database(format!("Failed to count assets: {}", e)))
}
