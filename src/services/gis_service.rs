//! Phase GIS orchestrator
//!
//! The single entry point that keeps a phase's derived GIS state in step with
//! its assets. Callers invoke [`GisOrchestrator::sync_phase`] on the same
//! connection (normally a `Transaction`) that performed the mutation, so the
//! derived rows commit or roll back together with it.
//!
//! ```text
//!            asset saved / deleted (assets remain) / recompute
//!   EMPTY ──────────────────────────────────────────────▶ COMPUTED ─┐
//!     ▲                                                      │  ▲    │
//!     │      last asset deleted / phase deleted              │  └────┘
//!     └──────────────────────────────────────────────────────┘
//! ```
//!
//! Every recomputation starts from the full current asset set of the phase;
//! nothing is carried over between calls.

use std::collections::BTreeMap;

use geo::Geometry;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{assets, associations, distributions, projects, reference, scores, AssetRow, PhaseRow};
use crate::error::GisError;
use crate::gis::{
    aggregate, containing, derive_scores, distribute, intersecting, validate::validate,
    AggregatedGeometry, DerivedScores, ReferenceArea, ScoringPolicy, ZoneDistribution,
};

/// What caused the sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GisTrigger {
    /// An asset of the phase was created or its geometry changed
    AssetSaved,
    /// An asset of the phase was removed (already gone from the table)
    AssetDeleted,
    /// The phase is about to be deleted; runs before the row goes
    PhaseDeleted,
    /// Administrative backfill
    Recompute,
}

/// Derived-data state of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseGisState {
    Empty,
    Computed,
}

/// Result of one sync
#[derive(Debug, Clone, Serialize)]
pub struct PhaseGisOutcome {
    pub phase_id: String,
    pub project_id: String,
    pub state: PhaseGisState,
    pub distribution: ZoneDistribution,
    /// Zones whose boundary intersects the phase's geometry
    pub zone_ids: Vec<String>,
    /// Districts containing at least one member geometry
    pub district_ids: Vec<String>,
    /// Project-level derived scores after the sync
    pub scores: DerivedScores,
}

/// Zones, districts and equity indices, loaded once per sync
struct ReferenceSet {
    zones: Vec<ReferenceArea>,
    districts: Vec<ReferenceArea>,
    equity_index: BTreeMap<String, f64>,
}

impl ReferenceSet {
    fn load(conn: &Connection) -> Result<Self, GisError> {
        Ok(Self {
            zones: reference::load_zone_areas(conn)?,
            districts: reference::load_district_areas(conn)?,
            equity_index: reference::zone_equity_index(conn)?,
        })
    }
}

/// Phase/project GIS orchestrator
#[derive(Debug, Clone, Default)]
pub struct GisOrchestrator {
    policy: ScoringPolicy,
}

impl GisOrchestrator {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    /// Bring a phase's derived state up to date with its current assets
    pub fn sync_phase(
        &self,
        conn: &Connection,
        phase_id: &str,
        trigger: GisTrigger,
    ) -> Result<PhaseGisOutcome, GisError> {
        let phase = projects::get_phase(conn, phase_id)?
            .ok_or_else(|| GisError::NotFound(format!("Phase {}", phase_id)))?;

        let clear = match trigger {
            GisTrigger::PhaseDeleted => true,
            GisTrigger::AssetDeleted => assets::count_assets_for_phase(conn, phase_id)? == 0,
            GisTrigger::AssetSaved | GisTrigger::Recompute => false,
        };

        let references = ReferenceSet::load(conn)?;

        if clear {
            debug!(phase_id = %phase_id, ?trigger, "Clearing phase GIS state");
            self.clear_phase(conn, &phase, &references)
        } else {
            debug!(phase_id = %phase_id, ?trigger, "Recomputing phase GIS state");
            self.recompute_phase(conn, &phase, &references)
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Full recomputation from the phase's current assets
    fn recompute_phase(
        &self,
        conn: &Connection,
        phase: &PhaseRow,
        references: &ReferenceSet,
    ) -> Result<PhaseGisOutcome, GisError> {
        let geometries = load_geometries(&assets::list_assets_for_phase(conn, &phase.id)?)?;
        let aggregated = aggregate(&geometries);

        let touched = intersecting(&aggregated, &references.zones);
        if !aggregated.is_empty() && touched.is_empty() {
            warn!(phase_id = %phase.id, "Phase geometry lies outside every zone");
        }

        let distribution = distribute(&aggregated, &touched)?;
        distributions::replace_phase_distribution(conn, &phase.id, &distribution)?;

        let zone_ids: Vec<String> = touched.iter().map(|z| z.id.clone()).collect();
        let district_ids: Vec<String> = containing(&aggregated, &references.districts)
            .iter()
            .map(|d| d.id.clone())
            .collect();

        associations::add_project_zones(conn, &phase.project_id, &phase.id, &as_strs(&zone_ids))?;
        associations::add_project_districts(conn, &phase.project_id, &phase.id, &as_strs(&district_ids))?;

        let scores = self.rescore_project(conn, &phase.project_id, None, references)?;

        let state = if aggregated.is_empty() {
            PhaseGisState::Empty
        } else {
            PhaseGisState::Computed
        };

        debug!(
            phase_id = %phase.id,
            assets = geometries.len(),
            zones = zone_ids.len(),
            districts = district_ids.len(),
            "Phase GIS recomputed"
        );

        Ok(PhaseGisOutcome {
            phase_id: phase.id.clone(),
            project_id: phase.project_id.clone(),
            state,
            distribution,
            zone_ids,
            district_ids,
            scores,
        })
    }

    /// Drop everything the phase contributed and rescore the project without it
    fn clear_phase(
        &self,
        conn: &Connection,
        phase: &PhaseRow,
        references: &ReferenceSet,
    ) -> Result<PhaseGisOutcome, GisError> {
        let rows = distributions::delete_distributions_for_phase(conn, &phase.id)?;
        let (zones, districts) = associations::clear_phase_associations(conn, &phase.id)?;
        let scores = self.rescore_project(conn, &phase.project_id, Some(&phase.id), references)?;

        debug!(
            phase_id = %phase.id,
            distribution_rows = rows,
            zone_links = zones,
            district_links = districts,
            "Phase GIS cleared"
        );

        Ok(PhaseGisOutcome {
            phase_id: phase.id.clone(),
            project_id: phase.project_id.clone(),
            state: PhaseGisState::Empty,
            distribution: ZoneDistribution::default(),
            zone_ids: Vec::new(),
            district_ids: Vec::new(),
            scores,
        })
    }

    /// Derive the project's two scores from the assets of all its phases
    fn rescore_project(
        &self,
        conn: &Connection,
        project_id: &str,
        exclude_phase: Option<&str>,
        references: &ReferenceSet,
    ) -> Result<DerivedScores, GisError> {
        let rows = assets::list_assets_for_project(conn, project_id, exclude_phase)?;
        let aggregated: AggregatedGeometry = aggregate(&load_geometries(&rows)?);

        let touched = intersecting(&aggregated, &references.zones);
        let distribution = distribute(&aggregated, &touched)?;
        let derived = derive_scores(&distribution, &references.equity_index, self.policy);

        scores::set_derived_scores(conn, project_id, &derived)?;
        Ok(derived)
    }
}

/// Decode and re-check stored geometries; a bad row fails the whole sync
fn load_geometries(rows: &[AssetRow]) -> Result<Vec<Geometry<f64>>, GisError> {
    rows.iter()
        .map(|row| {
            let geometry = row.parse_geometry()?;
            validate(&geometry).map_err(|e| {
                GisError::InvalidGeometry(format!("asset {}: {}", row.id, e))
            })?;
            Ok(geometry)
        })
        .collect()
}

fn as_strs(ids: &[String]) -> Vec<&str> {
    ids.iter().map(String::as_str).collect()
}
