//! Projects, phases and funding streams

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::current_timestamp;
use super::scores;
use crate::error::GisError;

// ============================================================================
// Constants
// ============================================================================

/// Phase type constants
pub mod phase_types {
    pub const FEASIBILITY: &str = "feasibility";
    pub const DESIGN: &str = "design";
    pub const ENGINEERING: &str = "engineering";
    pub const CONSTRUCTION: &str = "construction";
    pub const IMPLEMENTATION: &str = "implementation";

    pub const ALL: [&str; 5] = [FEASIBILITY, DESIGN, ENGINEERING, CONSTRUCTION, IMPLEMENTATION];

    pub fn is_valid(phase_type: &str) -> bool {
        ALL.contains(&phase_type)
    }
}

/// Phase status constants
pub mod phase_statuses {
    pub const UNSCHEDULED: &str = "unscheduled";
    pub const IN_PROGRESS: &str = "in-progress";
    pub const DONE: &str = "done";

    pub const ALL: [&str; 3] = [UNSCHEDULED, IN_PROGRESS, DONE];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}

/// Estimated bid quarter constants
pub mod bid_quarters {
    pub const ALL: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

    pub fn is_valid(quarter: &str) -> bool {
        ALL.contains(&quarter)
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Project row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Phase row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRow {
    pub id: String,
    pub project_id: String,
    pub sequence: i64,
    pub phase_type: String,
    pub status: String,
    pub estimated_bid_quarter: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PhaseRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            sequence: row.get("sequence")?,
            phase_type: row.get("phase_type")?,
            status: row.get("status")?,
            estimated_bid_quarter: row.get("estimated_bid_quarter")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Funding stream row; amounts in cents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingStreamRow {
    pub id: String,
    pub phase_id: String,
    pub year: i32,
    pub budget_cents: i64,
    pub actual_cost_cents: Option<i64>,
    pub funding_secured: bool,
    pub created_at: String,
}

impl FundingStreamRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            phase_id: row.get("phase_id")?,
            year: row.get("year")?,
            budget_cents: row.get("budget_cents")?,
            actual_cost_cents: row.get("actual_cost_cents")?,
            funding_secured: row.get("funding_secured")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// Input for creating a phase
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePhaseInput {
    pub project_id: String,
    pub phase_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub estimated_bid_quarter: Option<String>,
}

fn default_status() -> String {
    phase_statuses::UNSCHEDULED.to_string()
}

/// Input for adding a funding stream to a phase
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFundingInput {
    pub phase_id: String,
    pub year: i32,
    #[serde(default)]
    pub budget_cents: i64,
    #[serde(default)]
    pub actual_cost_cents: Option<i64>,
    #[serde(default)]
    pub funding_secured: bool,
}

// ============================================================================
// Projects
// ============================================================================

/// Create a project together with its (all-null) score row
pub fn create_project(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<ProjectRow, GisError> {
    if name.trim().is_empty() {
        return Err(GisError::InvalidInput("Project name must not be empty".into()));
    }

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    conn.execute(
        "INSERT INTO projects (id, name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, name, description, now],
    ).map_err(|e| GisError::Database(format!("Failed to create project: {}", e)))?;

    scores::ensure_score_row(conn, &id)?;

    debug!(project_id = %id, "Created project");

    get_project(conn, &id)?
        .ok_or_else(|| GisError::Internal(format!("Project {} vanished after insert", id)))
}

/// Get a project by ID
pub fn get_project(conn: &Connection, id: &str) -> Result<Option<ProjectRow>, GisError> {
    conn.query_row("SELECT * FROM projects WHERE id = ?", params![id], |row| ProjectRow::from_row(row))
        .optional()
        .map_err(|e| GisError::Database(format!("Failed to get project: {}", e)))
}

/// All projects, oldest first
pub fn list_projects(conn: &Connection) -> Result<Vec<ProjectRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM projects ORDER BY created_at, id")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| ProjectRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

// ============================================================================
// Phases
// ============================================================================

/// Create a phase; its sequence is one past the project's highest
pub fn create_phase(conn: &Connection, input: &CreatePhaseInput) -> Result<PhaseRow, GisError> {
    if !phase_types::is_valid(&input.phase_type) {
        return Err(GisError::InvalidInput(format!(
            "Invalid phase type: {}",
            input.phase_type
        )));
    }

    if !phase_statuses::is_valid(&input.status) {
        return Err(GisError::InvalidInput(format!(
            "Invalid phase status: {}",
            input.status
        )));
    }

    if let Some(quarter) = &input.estimated_bid_quarter {
        if !bid_quarters::is_valid(quarter) {
            return Err(GisError::InvalidInput(format!(
                "Invalid bid quarter: {}",
                quarter
            )));
        }
    }

    if get_project(conn, &input.project_id)?.is_none() {
        return Err(GisError::NotFound(format!("Project {}", input.project_id)));
    }

    let sequence: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM phases WHERE project_id = ?",
            params![input.project_id],
            |row| row.get(0),
        )
        .map_err(|e| GisError::Database(format!("Failed to compute phase sequence: {}", e)))?;

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    conn.execute(
        r#"INSERT INTO phases
           (id, project_id, sequence, phase_type, status, estimated_bid_quarter, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
        params![
            id,
            input.project_id,
            sequence,
            input.phase_type,
            input.status,
            input.estimated_bid_quarter,
            now,
        ],
    ).map_err(|e| GisError::Database(format!("Failed to create phase: {}", e)))?;

    debug!(phase_id = %id, project_id = %input.project_id, sequence, "Created phase");

    get_phase(conn, &id)?
        .ok_or_else(|| GisError::Internal(format!("Phase {} vanished after insert", id)))
}

/// Get a phase by ID
pub fn get_phase(conn: &Connection, id: &str) -> Result<Option<PhaseRow>, GisError> {
    conn.query_row("SELECT * FROM phases WHERE id = ?", params![id], |row| PhaseRow::from_row(row))
        .optional()
        .map_err(|e| GisError::Database(format!("Failed to get phase: {}", e)))
}

/// Phases of a project in sequence order
pub fn list_phases(conn: &Connection, project_id: &str) -> Result<Vec<PhaseRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM phases WHERE project_id = ? ORDER BY sequence")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![project_id], |row| PhaseRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Every phase id, grouped by project and in sequence order
pub fn list_all_phase_ids(conn: &Connection) -> Result<Vec<String>, GisError> {
    let mut stmt = conn
        .prepare("SELECT id FROM phases ORDER BY project_id, sequence")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let ids = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(ids)
}

/// Delete a phase row. Funding streams, assets and distributions cascade.
pub fn delete_phase(conn: &Connection, id: &str) -> Result<bool, GisError> {
    let deleted = conn
        .execute("DELETE FROM phases WHERE id = ?", params![id])
        .map_err(|e| GisError::Database(format!("Failed to delete phase: {}", e)))?;

    Ok(deleted > 0)
}

// ============================================================================
// Funding
// ============================================================================

/// Add a funding stream to a phase
pub fn add_funding_stream(
    conn: &Connection,
    input: &CreateFundingInput,
) -> Result<FundingStreamRow, GisError> {
    if input.budget_cents < 0 {
        return Err(GisError::InvalidInput(format!(
            "Budget must not be negative, got: {}",
            input.budget_cents
        )));
    }

    if input.actual_cost_cents.is_some_and(|c| c < 0) {
        return Err(GisError::InvalidInput("Actual cost must not be negative".into()));
    }

    if get_phase(conn, &input.phase_id)?.is_none() {
        return Err(GisError::NotFound(format!("Phase {}", input.phase_id)));
    }

    let id = Uuid::new_v4().to_string();

    conn.execute(
        r#"INSERT INTO funding_streams
           (id, phase_id, year, budget_cents, actual_cost_cents, funding_secured, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            id,
            input.phase_id,
            input.year,
            input.budget_cents,
            input.actual_cost_cents,
            input.funding_secured,
            current_timestamp(),
        ],
    ).map_err(|e| GisError::Database(format!("Failed to add funding stream: {}", e)))?;

    debug!(phase_id = %input.phase_id, budget_cents = input.budget_cents, "Added funding stream");

    conn.query_row("SELECT * FROM funding_streams WHERE id = ?", params![id], |row| {
        FundingStreamRow::from_row(row)
    })
    .map_err(|e| GisError::Database(format!("Failed to read funding stream: {}", e)))
}

/// Funding streams of a phase, by year
pub fn list_funding_streams(conn: &Connection, phase_id: &str) -> Result<Vec<FundingStreamRow>, GisError> {
    let mut stmt = conn
        .prepare("SELECT * FROM funding_streams WHERE phase_id = ? ORDER BY year, created_at")
        .map_err(|e| GisError::Database(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![phase_id], |row| FundingStreamRow::from_row(row))
        .map_err(|e| GisError::Database(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GisError::Database(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Sum of the phase's funding budgets in cents (0 with no streams)
pub fn total_budget_cents(conn: &Connection, phase_id: &str) -> Result<i64, GisError> {
    conn.query_row(
        "SELECT COALESCE(SUM(budget_cents), 0) FROM funding_streams WHERE phase_id = ?",
        params![phase_id],
        |row| row.get(0),
    )
    .map_err(|e| GisError::Database(format!("Failed to sum budget: {}", e)))
}
