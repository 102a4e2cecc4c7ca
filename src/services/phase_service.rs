//! Phase service - projects, phases, funding and phase-level GIS reporting

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::projects::{CreateFundingInput, CreatePhaseInput};
use crate::db::{distributions, projects, DistributionRow, FundingStreamRow, PhaseRow, PlannerDb, ProjectRow};
use crate::error::GisError;
use crate::gis::distribution::apportion_cents;

use super::events::{EventBus, PlannerEvent};
use super::gis_service::{GisOrchestrator, GisTrigger, PhaseGisOutcome};

/// Budget and distribution report for one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: PhaseRow,
    pub funding: Vec<FundingStreamRow>,
    pub total_budget_cents: i64,
    pub distributions: Vec<DistributionRow>,
    /// Zone name -> cents
    pub cost_by_zone: BTreeMap<String, i64>,
}

/// Summary of a full backfill
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecomputeSummary {
    pub recomputed: usize,
    pub failed: Vec<(String, String)>,
}

/// Phase service for business logic
pub struct PhaseService {
    db: Arc<PlannerDb>,
    events: Arc<EventBus>,
    gis: Arc<GisOrchestrator>,
}

impl PhaseService {
    /// Create a new phase service
    pub fn new(db: Arc<PlannerDb>, events: Arc<EventBus>, gis: Arc<GisOrchestrator>) -> Self {
        Self { db, events, gis }
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Create a project and its score row
    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<ProjectRow, GisError> {
        self.db.transaction(|tx| projects::create_project(tx, name, description))
    }

    pub fn get_project(&self, id: &str) -> Result<Option<ProjectRow>, GisError> {
        self.db.with_conn(|conn| projects::get_project(conn, id))
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRow>, GisError> {
        self.db.with_conn(projects::list_projects)
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Create a phase at the end of its project's sequence
    pub fn create_phase(&self, input: CreatePhaseInput) -> Result<PhaseRow, GisError> {
        let phase = self.db.transaction(|tx| projects::create_phase(tx, &input))?;

        self.events.emit(PlannerEvent::PhaseCreated {
            id: phase.id.clone(),
            project_id: phase.project_id.clone(),
        });

        Ok(phase)
    }

    pub fn get_phase(&self, id: &str) -> Result<Option<PhaseRow>, GisError> {
        self.db.with_conn(|conn| projects::get_phase(conn, id))
    }

    pub fn list_phases(&self, project_id: &str) -> Result<Vec<PhaseRow>, GisError> {
        self.db.with_conn(|conn| projects::list_phases(conn, project_id))
    }

    /// Delete a phase. Its derived GIS state is cleared first, inside the
    /// same transaction, then the row is removed and the cascade runs.
    pub fn delete_phase(&self, id: &str) -> Result<bool, GisError> {
        let deleted = self.db.transaction(|tx| {
            let Some(phase) = projects::get_phase(tx, id)? else {
                return Ok(None);
            };

            self.gis.sync_phase(tx, id, GisTrigger::PhaseDeleted)?;
            projects::delete_phase(tx, id)?;
            Ok(Some(phase))
        })?;

        let Some(phase) = deleted else {
            return Ok(false);
        };

        self.events.emit(PlannerEvent::PhaseGisCleared { phase_id: phase.id.clone() });
        self.events.emit(PlannerEvent::ScoresUpdated { project_id: phase.project_id.clone() });
        self.events.emit(PlannerEvent::PhaseDeleted {
            id: phase.id,
            project_id: phase.project_id,
        });

        Ok(true)
    }

    // =========================================================================
    // Funding
    // =========================================================================

    pub fn add_funding(&self, input: CreateFundingInput) -> Result<FundingStreamRow, GisError> {
        self.db.transaction(|tx| projects::add_funding_stream(tx, &input))
    }

    /// Sum of the phase's funding streams, in cents
    pub fn total_budget_cents(&self, phase_id: &str) -> Result<i64, GisError> {
        self.db.with_conn(|conn| projects::total_budget_cents(conn, phase_id))
    }

    // =========================================================================
    // Distribution reporting
    // =========================================================================

    /// Recorded distribution rows of a phase
    pub fn distributions(&self, phase_id: &str) -> Result<Vec<DistributionRow>, GisError> {
        self.db.with_conn(|conn| distributions::list_distributions(conn, phase_id))
    }

    /// Zone name -> budget share in cents, for every recorded distribution row
    pub fn cost_by_zone(&self, phase_id: &str) -> Result<BTreeMap<String, i64>, GisError> {
        self.db.with_conn(|conn| {
            let total = projects::total_budget_cents(conn, phase_id)?;
            let rows = distributions::list_distributions(conn, phase_id)?;
            Ok(apportion(total, &rows))
        })
    }

    /// Phase, funding, distributions and per-zone cost in one read
    pub fn report(&self, phase_id: &str) -> Result<PhaseReport, GisError> {
        self.db.with_conn(|conn| {
            let phase = projects::get_phase(conn, phase_id)?
                .ok_or_else(|| GisError::NotFound(format!("Phase {}", phase_id)))?;
            let funding = projects::list_funding_streams(conn, phase_id)?;
            let total_budget_cents = funding.iter().map(|f| f.budget_cents).sum();
            let distributions = distributions::list_distributions(conn, phase_id)?;
            let cost_by_zone = apportion(total_budget_cents, &distributions);

            Ok(PhaseReport {
                phase,
                funding,
                total_budget_cents,
                distributions,
                cost_by_zone,
            })
        })
    }

    // =========================================================================
    // Backfill
    // =========================================================================

    /// Recompute one phase in its own transaction
    pub fn recompute(&self, phase_id: &str) -> Result<PhaseGisOutcome, GisError> {
        let outcome = self.db.transaction(|tx| self.gis.sync_phase(tx, phase_id, GisTrigger::Recompute))?;

        self.events.emit(PlannerEvent::PhaseGisRecomputed {
            phase_id: outcome.phase_id.clone(),
            zones: outcome.zone_ids.len(),
            districts: outcome.district_ids.len(),
        });

        Ok(outcome)
    }

    /// Recompute every phase, one at a time. A failing phase is rolled back
    /// and reported; the rest still run.
    pub fn recompute_all(&self) -> Result<RecomputeSummary, GisError> {
        let phase_ids = self.db.with_conn(projects::list_all_phase_ids)?;
        let mut summary = RecomputeSummary::default();

        for phase_id in phase_ids {
            match self.recompute(&phase_id) {
                Ok(_) => summary.recomputed += 1,
                Err(e) => {
                    warn!(phase_id = %phase_id, error = %e, "Phase recompute failed");
                    summary.failed.push((phase_id, e.to_string()));
                }
            }
        }

        info!(
            recomputed = summary.recomputed,
            failed = summary.failed.len(),
            "Backfill finished"
        );
        Ok(summary)
    }
}

fn apportion(total_cents: i64, rows: &[DistributionRow]) -> BTreeMap<String, i64> {
    rows.iter()
        .map(|row| (row.zone_name.clone(), apportion_cents(total_cents, row.proportion)))
        .collect()
}
