//! SQLite storage for planning data and derived GIS state
//!
//! ## Tables
//!
//! - `projects`, `phases`, `funding_streams` - planning records
//! - `local_assets` - user-drawn geometries, one Phase each
//! - `zones`, `districts` - reference polygons
//! - `phase_zone_distributions` - per (phase, zone) proportion
//! - `project_zones`, `project_districts` - derived associations, tagged with
//!   the phase that produced them
//! - `project_scores`, `score_weights` - score fields and the global weights
//!
//! Repository functions take `&Connection` so they run the same way on a
//! plain connection or inside a `Transaction`.

pub mod schema;
pub mod projects;
pub mod assets;
pub mod reference;
pub mod distributions;
pub mod associations;
pub mod scores;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::error::GisError;

/// Planner database
pub struct PlannerDb {
    conn: Mutex<Connection>,
}

impl PlannerDb {
    /// Open or create the planner database at `path`
    pub fn open(path: &Path) -> Result<Self, GisError> {
        info!("Opening SQLite database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| GisError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| GisError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, GisError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| GisError::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, GisError> {
        // cascades from phases to assets, funding and distributions depend on this
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| GisError::Database(format!("Failed to enable foreign keys: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, GisError>
    where
        F: FnOnce(&Connection) -> Result<T, GisError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| GisError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, GisError>
    where
        F: FnOnce(&mut Connection) -> Result<T, GisError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| GisError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` in one transaction: committed on `Ok`, rolled back on `Err`.
    ///
    /// The connection lock is held for the whole closure, so two mutations
    /// of the same phase can never interleave their recomputations.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, GisError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, GisError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| GisError::Database(format!("Failed to begin transaction: {}", e)))?;

            // dropping an uncommitted Transaction rolls it back
            let value = f(&tx)?;

            tx.commit()
                .map_err(|e| GisError::Database(format!("Failed to commit: {}", e)))?;
            Ok(value)
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, GisError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, GisError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                project_count: count("projects")?,
                phase_count: count("phases")?,
                asset_count: count("local_assets")?,
                zone_count: count("zones")?,
                district_count: count("districts")?,
                distribution_count: count("phase_zone_distributions")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub project_count: u64,
    pub phase_count: u64,
    pub asset_count: u64,
    pub zone_count: u64,
    pub district_count: u64,
    pub distribution_count: u64,
}

/// Current time as an RFC 3339 string
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// Re-exports
pub use assets::{AssetRow, CreateAssetInput};
pub use distributions::DistributionRow;
pub use projects::{FundingStreamRow, PhaseRow, ProjectRow};
pub use reference::{DistrictKind, DistrictRow, ZoneRow};
pub use scores::ScoreRow;
