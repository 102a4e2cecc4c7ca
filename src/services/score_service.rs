//! Score service - staff scores, global weights and the weighted total

use std::sync::Arc;

use serde::Serialize;

use crate::db::associations::{self, AssociatedArea};
use crate::db::scores::{self, ManualScores};
use crate::db::{projects, PlannerDb, ScoreRow};
use crate::error::GisError;
use crate::gis::ScoreWeights;

use super::events::{EventBus, PlannerEvent};

/// Scores, total and derived associations of one project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectScoreReport {
    pub project_id: String,
    pub scores: ScoreRow,
    pub total_score: f64,
    pub zones: Vec<AssociatedArea>,
    pub districts: Vec<AssociatedArea>,
}

/// Score service for business logic
pub struct ScoreService {
    db: Arc<PlannerDb>,
    events: Arc<EventBus>,
}

impl ScoreService {
    /// Create a new score service
    pub fn new(db: Arc<PlannerDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn get(&self, project_id: &str) -> Result<Option<ScoreRow>, GisError> {
        self.db.with_conn(|conn| scores::get_scores(conn, project_id))
    }

    /// Set the four staff-entered scores of a project
    pub fn set_manual(&self, project_id: &str, manual: &ManualScores) -> Result<ScoreRow, GisError> {
        let row = self.db.transaction(|tx| {
            if projects::get_project(tx, project_id)?.is_none() {
                return Err(GisError::NotFound(format!("Project {}", project_id)));
            }
            scores::set_manual_scores(tx, project_id, manual)?;
            scores::get_scores(tx, project_id)?
                .ok_or_else(|| GisError::Internal(format!("Score row missing for {}", project_id)))
        })?;

        self.events.emit(PlannerEvent::ScoresUpdated {
            project_id: project_id.to_string(),
        });
        Ok(row)
    }

    /// Replace the global weights with a single row
    pub fn set_weights(&self, weights: &ScoreWeights) -> Result<(), GisError> {
        self.db.transaction(|tx| scores::set_score_weights(tx, weights))?;
        self.events.emit(PlannerEvent::WeightsUpdated);
        Ok(())
    }

    pub fn weights(&self) -> Result<ScoreWeights, GisError> {
        self.db.with_conn(scores::load_score_weights)
    }

    /// Weight-normalised total; 0 while any field is unscored
    pub fn total_score(&self, project_id: &str) -> Result<f64, GisError> {
        self.db.with_conn(|conn| scores::total_score(conn, project_id))
    }

    pub fn report(&self, project_id: &str) -> Result<ProjectScoreReport, GisError> {
        self.db.with_conn(|conn| {
            let row = scores::get_scores(conn, project_id)?
                .ok_or_else(|| GisError::NotFound(format!("Project {}", project_id)))?;

            Ok(ProjectScoreReport {
                project_id: project_id.to_string(),
                total_score: scores::total_score(conn, project_id)?,
                zones: associations::list_project_zones(conn, project_id)?,
                districts: associations::list_project_districts(conn, project_id)?,
                scores: row,
            })
        })
    }
}
