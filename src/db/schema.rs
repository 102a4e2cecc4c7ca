//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::GisError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), GisError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, GisError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| GisError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .map_err(|e| GisError::Database(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), GisError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| GisError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| GisError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), GisError> {
    conn.execute_batch(PLANNING_SCHEMA)
        .map_err(|e| GisError::Database(format!("Failed to create planning tables: {}", e)))?;

    conn.execute_batch(REFERENCE_SCHEMA)
        .map_err(|e| GisError::Database(format!("Failed to create reference tables: {}", e)))?;

    conn.execute_batch(DERIVED_SCHEMA)
        .map_err(|e| GisError::Database(format!("Failed to create derived tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| GisError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), GisError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Projects, phases, funding and the assets users draw
const PLANNING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS phases (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    phase_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'unscheduled',
    estimated_bid_quarter TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (project_id, sequence),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- Currency in whole cents
CREATE TABLE IF NOT EXISTS funding_streams (
    id TEXT PRIMARY KEY NOT NULL,
    phase_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    budget_cents INTEGER NOT NULL DEFAULT 0 CHECK (budget_cents >= 0),
    actual_cost_cents INTEGER CHECK (actual_cost_cents IS NULL OR actual_cost_cents >= 0),
    funding_secured INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (phase_id) REFERENCES phases(id) ON DELETE CASCADE
);

-- Geometry is GeoJSON geometry text in the planner's projected CRS
CREATE TABLE IF NOT EXISTS local_assets (
    id TEXT PRIMARY KEY NOT NULL,
    phase_id TEXT NOT NULL,
    asset_id TEXT,
    asset_type TEXT,
    name TEXT,
    geometry TEXT NOT NULL,
    geometry_kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (phase_id) REFERENCES phases(id) ON DELETE CASCADE
);
"#;

/// Zones and political districts
const REFERENCE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    boundary TEXT NOT NULL,
    equity_index REAL NOT NULL DEFAULT 0 CHECK (equity_index >= 0 AND equity_index <= 1)
);

CREATE TABLE IF NOT EXISTS districts (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    boundary TEXT NOT NULL,
    UNIQUE (kind, name)
);
"#;

/// Everything the GIS orchestrator writes
const DERIVED_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS phase_zone_distributions (
    phase_id TEXT NOT NULL,
    zone_id TEXT NOT NULL,
    proportion REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (phase_id, zone_id),
    FOREIGN KEY (phase_id) REFERENCES phases(id) ON DELETE CASCADE,
    FOREIGN KEY (zone_id) REFERENCES zones(id) ON DELETE CASCADE
);

-- phase_id records which phase's geometry produced the association
CREATE TABLE IF NOT EXISTS project_zones (
    project_id TEXT NOT NULL,
    zone_id TEXT NOT NULL,
    phase_id TEXT NOT NULL,
    PRIMARY KEY (project_id, zone_id, phase_id),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (zone_id) REFERENCES zones(id) ON DELETE CASCADE,
    FOREIGN KEY (phase_id) REFERENCES phases(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_districts (
    project_id TEXT NOT NULL,
    district_id TEXT NOT NULL,
    phase_id TEXT NOT NULL,
    PRIMARY KEY (project_id, district_id, phase_id),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (district_id) REFERENCES districts(id) ON DELETE CASCADE,
    FOREIGN KEY (phase_id) REFERENCES phases(id) ON DELETE CASCADE
);

-- Manual scores are integers entered by staff; the two derived scores are
-- written only by the orchestrator
CREATE TABLE IF NOT EXISTS project_scores (
    project_id TEXT PRIMARY KEY NOT NULL,
    core_mission_score INTEGER,
    operations_impact_score INTEGER,
    sustainability_score INTEGER,
    ease_score INTEGER,
    geographic_distance_score REAL,
    social_equity_score REAL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- Expected to hold exactly one row
CREATE TABLE IF NOT EXISTS score_weights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    core_mission_score REAL NOT NULL,
    operations_impact_score REAL NOT NULL,
    sustainability_score REAL NOT NULL,
    ease_score REAL NOT NULL,
    geographic_distance_score REAL NOT NULL,
    social_equity_score REAL NOT NULL
);
"#;

/// Indexes
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_phases_project ON phases(project_id);
CREATE INDEX IF NOT EXISTS idx_funding_phase ON funding_streams(phase_id);
CREATE INDEX IF NOT EXISTS idx_assets_phase ON local_assets(phase_id);
CREATE INDEX IF NOT EXISTS idx_distributions_zone ON phase_zone_distributions(zone_id);
CREATE INDEX IF NOT EXISTS idx_project_zones_phase ON project_zones(phase_id);
CREATE INDEX IF NOT EXISTS idx_project_districts_phase ON project_districts(phase_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for table in [
            "projects", "phases", "funding_streams", "local_assets", "zones", "districts",
            "phase_zone_distributions", "project_zones", "project_districts",
            "project_scores", "score_weights",
        ] {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(n, 1, "missing table {}", table);
        }
    }
}
