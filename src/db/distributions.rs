//! Per (phase, zone) distribution rows

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::current_timestamp;
use crate::error::GisError;
use crate::gis::ZoneDistribution;

/// Distribution row joined with its zone name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionRow {
    pub phase_id: String,
    pub zone_id: String,
    pub zone_name: String,
    pub proportion: f64,
    pub updated_at: String,
}

impl DistributionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            phase_id: row.get("phase_id")?,
            zone_id: row.get("zone_id")?,
            zone_name: row.get("zone_name")?,
            proportion: row.get("proportion")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Insert or update one row
pub fn upsert_distribution(
    conn: &Connection,
    phase_id: &str,
    zone_id: &str,
    proportion: f64,
) -> Result<(), GisError> {
    let proportion = proportion.clamp(0.0, 1.0);

    conn.execute(
        r#"INSERT INTO phase_zone_distributions (phase_id, zone_id, proportion, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (phase_id, zone_id) DO UPDATE SET
               proportion = excluded.proportion,
               updated_at = excluded.updated_at"#,
        params![phase_id, zone_id, proportion, current_timestamp()],
    ).map_err(|e| GisError::Database(format!("Failed to upsert distribution: {}", e)))?;

    Ok(())
}

/// Write a phase's full distribution. Existing rows for zones missing from
/// `distribution` are kept and set to 0.0.
pub fn replace_phase_distribution(
    conn: &Connection,
    phase_id: &str,
    distribution: &ZoneDistribution,
) -> Result<(), GisError> {
    let zeroed = zero_distributions_for_phase(conn, phase_id)?;

    for (zone_id, proportion) in distribution.iter() {
        upsert_distribution(conn, phase_id, zone_id, proportion)?;
    }

    debug!(
        phase_id = %phase_id,
        zones = distribution.len(),
        previous_rows = zeroed,
        "Wrote phase distribution"
    );
    Ok(())
}

/// Reset every row of a phase to 0.0
pub fn zero_distributions_for_phase(conn: &Connection, phase_id: &str) -> Result<usize, GisError> {
    conn.execute(
        "UPDATE phase_zone_distributions SET proportion = 0, updated_at = ?1 WHERE phase_id = ?2",
        params![current_timestamp(), phase_id],
    )
    .map_err(|e| GisError::Database(format!("Failed to reset distributions: {}", e)))
}

/// Remove every row of a phase
pub fn delete_distributions_for_phase(conn: &Connection, phase_id: &str) -> Result<usize, GisError> {
    conn.execute(
        "DELETE FROM phase_zone_distributions WHERE phase_id = ?",
        params![phase_id],
    )
    .map_err(|e| GisError::Database(format!("Failed to delete distributions: {}", e)))
}

/// Rows of a phase by zone name
pub fn list_distributions(conn: &Connection, phase_id: &str) -> Result<Vec<DistributionRow>, GisError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT d.phase_id, d.zone_id, z.name AS zone_name, d.proportion, d.updated_at
               FROM phase_zone_distributions d
               JOIN zones z ON z.id = d.zone_id
               WHERE d.phase_id = ?
               ORDER BY z.name"#,
        )
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![phase_id], |row| DistributionRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}
