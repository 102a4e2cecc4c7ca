//! Project scores and the global score weights

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::current_timestamp;
use crate::error::GisError;
use crate::gis::{DerivedScores, ScoreCard, ScoreField, ScoreWeights};

/// Bounds for staff-entered scores
pub const MANUAL_SCORE_MIN: i64 = 0;
pub const MANUAL_SCORE_MAX: i64 = 5;

/// Project score row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub project_id: String,
    pub core_mission_score: Option<i64>,
    pub operations_impact_score: Option<i64>,
    pub sustainability_score: Option<i64>,
    pub ease_score: Option<i64>,
    pub geographic_distance_score: Option<f64>,
    pub social_equity_score: Option<f64>,
    pub updated_at: String,
}

impl ScoreRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            project_id: row.get("project_id")?,
            core_mission_score: row.get("core_mission_score")?,
            operations_impact_score: row.get("operations_impact_score")?,
            sustainability_score: row.get("sustainability_score")?,
            ease_score: row.get("ease_score")?,
            geographic_distance_score: row.get("geographic_distance_score")?,
            social_equity_score: row.get("social_equity_score")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn to_card(&self) -> ScoreCard {
        ScoreCard {
            core_mission: self.core_mission_score.map(|s| s as f64),
            operations_impact: self.operations_impact_score.map(|s| s as f64),
            sustainability: self.sustainability_score.map(|s| s as f64),
            ease: self.ease_score.map(|s| s as f64),
            geographic_distance: self.geographic_distance_score,
            social_equity: self.social_equity_score,
        }
    }
}

/// Staff-entered scores; `None` leaves the field unscored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualScores {
    #[serde(default)]
    pub core_mission: Option<i64>,
    #[serde(default)]
    pub operations_impact: Option<i64>,
    #[serde(default)]
    pub sustainability: Option<i64>,
    #[serde(default)]
    pub ease: Option<i64>,
}

// ============================================================================
// Score row
// ============================================================================

/// Create the project's score row if it does not exist yet
pub fn ensure_score_row(conn: &Connection, project_id: &str) -> Result<(), GisError> {
    conn.execute(
        "INSERT OR IGNORE INTO project_scores (project_id, updated_at) VALUES (?1, ?2)",
        params![project_id, current_timestamp()],
    ).map_err(|e| GisError::Database(format!("Failed to create score row: {}", e)))?;
    Ok(())
}

/// Get a project's score row
pub fn get_scores(conn: &Connection, project_id: &str) -> Result<Option<ScoreRow>, GisError> {
    conn.query_row(
        "SELECT * FROM project_scores WHERE project_id = ?",
        params![project_id],
        |row| ScoreRow::from_row(row),
    )
    .optional()
    .map_err(|e| GisError::Database(format!("Failed to get scores: {}", e)))
}

/// Set the four staff-entered scores
pub fn set_manual_scores(conn: &Connection, project_id: &str, scores: &ManualScores) -> Result<(), GisError> {
    let fields = [
        ("core_mission", scores.core_mission),
        ("operations_impact", scores.operations_impact),
        ("sustainability", scores.sustainability),
        ("ease", scores.ease),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            if !(MANUAL_SCORE_MIN..=MANUAL_SCORE_MAX).contains(&v) {
                return Err(GisError::InvalidInput(format!(
                    "{} score must be between {} and {}, got: {}",
                    name, MANUAL_SCORE_MIN, MANUAL_SCORE_MAX, v
                )));
            }
        }
    }

    ensure_score_row(conn, project_id)?;
    conn.execute(
        r#"UPDATE project_scores SET
               core_mission_score = ?1,
               operations_impact_score = ?2,
               sustainability_score = ?3,
               ease_score = ?4,
               updated_at = ?5
           WHERE project_id = ?6"#,
        params![
            scores.core_mission,
            scores.operations_impact,
            scores.sustainability,
            scores.ease,
            current_timestamp(),
            project_id,
        ],
    ).map_err(|e| GisError::Database(format!("Failed to set manual scores: {}", e)))?;

    Ok(())
}

/// Write the two geometry-derived scores
pub fn set_derived_scores(conn: &Connection, project_id: &str, derived: &DerivedScores) -> Result<(), GisError> {
    ensure_score_row(conn, project_id)?;
    conn.execute(
        r#"UPDATE project_scores SET
               geographic_distance_score = ?1,
               social_equity_score = ?2,
               updated_at = ?3
           WHERE project_id = ?4"#,
        params![
            derived.geographic_distance_score,
            derived.social_equity_score,
            current_timestamp(),
            project_id,
        ],
    ).map_err(|e| GisError::Database(format!("Failed to set derived scores: {}", e)))?;

    debug!(
        project_id = %project_id,
        geographic = derived.geographic_distance_score,
        equity = derived.social_equity_score,
        "Updated derived scores"
    );
    Ok(())
}

// ============================================================================
// Weights
// ============================================================================

fn validate_weights(weights: &ScoreWeights) -> Result<(), GisError> {
    for field in ScoreField::ALL {
        let w = weights.get(field);
        if !(0.0..=1.0).contains(&w) {
            return Err(GisError::InvalidInput(format!(
                "Weight for {} must be between 0.0 and 1.0, got: {}",
                field.column(),
                w
            )));
        }
    }
    Ok(())
}

fn count_weight_rows(conn: &Connection) -> Result<usize, GisError> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM score_weights", [], |row| row.get(0))
        .map_err(|e| GisError::Database(format!("Failed to count weights: {}", e)))?;
    Ok(n as usize)
}

/// Insert a weights row unconditionally
pub fn insert_score_weights(conn: &Connection, weights: &ScoreWeights) -> Result<(), GisError> {
    validate_weights(weights)?;

    conn.execute(
        r#"INSERT INTO score_weights
           (core_mission_score, operations_impact_score, sustainability_score,
            ease_score, geographic_distance_score, social_equity_score)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            weights.core_mission,
            weights.operations_impact,
            weights.sustainability,
            weights.ease,
            weights.geographic_distance,
            weights.social_equity,
        ],
    ).map_err(|e| GisError::Database(format!("Failed to insert weights: {}", e)))?;

    Ok(())
}

/// Make `weights` the one and only weights row
pub fn set_score_weights(conn: &Connection, weights: &ScoreWeights) -> Result<(), GisError> {
    validate_weights(weights)?;
    delete_score_weights(conn)?;
    insert_score_weights(conn, weights)
}

/// Remove all weights rows
pub fn delete_score_weights(conn: &Connection) -> Result<usize, GisError> {
    conn.execute("DELETE FROM score_weights", [])
        .map_err(|e| GisError::Database(format!("Failed to delete weights: {}", e)))
}

/// Load the global weights; anything other than exactly one row is an error
pub fn load_score_weights(conn: &Connection) -> Result<ScoreWeights, GisError> {
    let found = count_weight_rows(conn)?;
    if found != 1 {
        return Err(GisError::ScoreWeights { found });
    }

    conn.query_row("SELECT * FROM score_weights", [], |row| {
        Ok(ScoreWeights {
            core_mission: row.get("core_mission_score")?,
            operations_impact: row.get("operations_impact_score")?,
            sustainability: row.get("sustainability_score")?,
            ease: row.get("ease_score")?,
            geographic_distance: row.get("geographic_distance_score")?,
            social_equity: row.get("social_equity_score")?,
        })
    })
    .map_err(|e| GisError::Database(format!("Failed to read weights: {}", e)))
}

/// Weighted total for a project.
///
/// The weights are checked first, so a missing or duplicated weights row is
/// reported even for a project with unscored fields.
pub fn total_score(conn: &Connection, project_id: &str) -> Result<f64, GisError> {
    let weights = load_score_weights(conn)?;
    let row = get_scores(conn, project_id)?
        .ok_or_else(|| GisError::NotFound(format!("Scores for project {}", project_id)))?;

    Ok(crate::gis::total_score(&row.to_card(), &weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::projects;
    use crate::db::PlannerDb;

    fn fixture_weights() -> ScoreWeights {
        ScoreWeights {
            core_mission: 0.7,
            operations_impact: 0.8,
            sustainability: 0.2,
            ease: 0.6,
            geographic_distance: 0.5,
            social_equity: 0.4,
        }
    }

    #[test]
    fn test_weights_singleton_errors() {
        let db = PlannerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let project = projects::create_project(conn, "Dam", None)?;

            assert!(matches!(
                total_score(conn, &project.id),
                Err(GisError::ScoreWeights { found: 0 })
            ));

            insert_score_weights(conn, &fixture_weights())?;
            insert_score_weights(conn, &fixture_weights())?;
            assert!(matches!(
                load_score_weights(conn),
                Err(GisError::ScoreWeights { found: 2 })
            ));

            set_score_weights(conn, &fixture_weights())?;
            assert_eq!(load_score_weights(conn)?, fixture_weights());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_total_score_from_rows() {
        let db = PlannerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            set_score_weights(conn, &fixture_weights())?;
            let project = projects::create_project(conn, "Dam", None)?;

            // fresh projects have no scores at all
            assert_eq!(total_score(conn, &project.id)?, 0.0);

            set_manual_scores(conn, &project.id, &ManualScores {
                core_mission: Some(3),
                operations_impact: Some(1),
                sustainability: Some(5),
                ease: Some(4),
            })?;
            assert_eq!(total_score(conn, &project.id)?, 0.0);

            set_derived_scores(conn, &project.id, &DerivedScores {
                geographic_distance_score: 2.5,
                social_equity_score: 1.0,
            })?;
            let expected = (3.0 * 0.7 + 1.0 * 0.8 + 5.0 * 0.2 + 4.0 * 0.6 + 2.5 * 0.5 + 1.0 * 0.4) / 3.2;
            assert!((total_score(conn, &project.id)? - expected).abs() < 1e-9);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_manual_score_bounds() {
        let db = PlannerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let project = projects::create_project(conn, "Dam", None)?;
            let result = set_manual_scores(conn, &project.id, &ManualScores {
                ease: Some(6),
                ..Default::default()
            });
            assert!(matches!(result, Err(GisError::InvalidInput(_))));

            let result = set_score_weights(conn, &ScoreWeights { ease: 1.5, ..fixture_weights() });
            assert!(matches!(result, Err(GisError::InvalidInput(_))));
            Ok(())
        })
        .unwrap();
    }
}
