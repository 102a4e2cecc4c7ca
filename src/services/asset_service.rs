//! Asset service - the mutation path for user-drawn geometry
//!
//! Every mutation runs in one transaction together with the orchestrator's
//! recomputation of the owning phase. Events go out only after commit.

use std::sync::Arc;

use geo::Geometry;
use serde::Serialize;

use crate::db::{assets, projects, AssetRow, CreateAssetInput, PlannerDb};
use crate::error::GisError;
use crate::gis::{codec, validate::validate, GeometryKind};

use super::events::{EventBus, PlannerEvent};
use super::gis_service::{GisOrchestrator, GisTrigger, PhaseGisOutcome, PhaseGisState};

/// An asset mutation together with the phase state it produced
#[derive(Debug, Clone, Serialize)]
pub struct AssetMutation {
    pub asset: AssetRow,
    pub gis: PhaseGisOutcome,
}

/// Asset service for business logic
pub struct AssetService {
    db: Arc<PlannerDb>,
    events: Arc<EventBus>,
    gis: Arc<GisOrchestrator>,
}

impl AssetService {
    /// Create a new asset service
    pub fn new(db: Arc<PlannerDb>, events: Arc<EventBus>, gis: Arc<GisOrchestrator>) -> Self {
        Self { db, events, gis }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get an asset by ID
    pub fn get(&self, id: &str) -> Result<Option<AssetRow>, GisError> {
        self.db.with_conn(|conn| assets::get_asset(conn, id))
    }

    /// Current assets of a phase
    pub fn list_for_phase(&self, phase_id: &str) -> Result<Vec<AssetRow>, GisError> {
        self.db.with_conn(|conn| assets::list_assets_for_phase(conn, phase_id))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create an asset and recompute its phase
    pub fn create(&self, input: CreateAssetInput) -> Result<AssetMutation, GisError> {
        let (geometry, kind) = self.validate_geometry(&input.geometry)?;

        let mutation = self.db.transaction(|tx| {
            if projects::get_phase(tx, &input.phase_id)?.is_none() {
                return Err(GisError::NotFound(format!("Phase {}", input.phase_id)));
            }

            let asset = assets::insert_asset(tx, &input, &geometry, kind)?;
            let gis = self.gis.sync_phase(tx, &asset.phase_id, GisTrigger::AssetSaved)?;
            Ok(AssetMutation { asset, gis })
        })?;

        self.events.emit(PlannerEvent::AssetCreated {
            id: mutation.asset.id.clone(),
            phase_id: mutation.asset.phase_id.clone(),
        });
        self.emit_gis(&mutation.gis);

        Ok(mutation)
    }

    /// Replace an asset's geometry and recompute its phase
    pub fn update_geometry(&self, id: &str, geometry: &serde_json::Value) -> Result<AssetMutation, GisError> {
        let (geometry, kind) = self.validate_geometry(geometry)?;

        let mutation = self.db.transaction(|tx| {
            if !assets::update_asset_geometry(tx, id, &geometry, kind)? {
                return Err(GisError::NotFound(format!("Asset {}", id)));
            }

            let asset = assets::get_asset(tx, id)?
                .ok_or_else(|| GisError::NotFound(format!("Asset {}", id)))?;
            let gis = self.gis.sync_phase(tx, &asset.phase_id, GisTrigger::AssetSaved)?;
            Ok(AssetMutation { asset, gis })
        })?;

        self.events.emit(PlannerEvent::AssetUpdated {
            id: mutation.asset.id.clone(),
            phase_id: mutation.asset.phase_id.clone(),
        });
        self.emit_gis(&mutation.gis);

        Ok(mutation)
    }

    /// Delete an asset and recompute (or clear) its phase.
    /// Returns `None` when the asset does not exist.
    pub fn delete(&self, id: &str) -> Result<Option<PhaseGisOutcome>, GisError> {
        let outcome = self.db.transaction(|tx| {
            let Some(asset) = assets::get_asset(tx, id)? else {
                return Ok(None);
            };

            assets::delete_asset(tx, id)?;
            let gis = self.gis.sync_phase(tx, &asset.phase_id, GisTrigger::AssetDeleted)?;
            Ok(Some(gis))
        })?;

        if let Some(gis) = &outcome {
            self.events.emit(PlannerEvent::AssetDeleted {
                id: id.to_string(),
                phase_id: gis.phase_id.clone(),
            });
            self.emit_gis(gis);
        }

        Ok(outcome)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn emit_gis(&self, outcome: &PhaseGisOutcome) {
        match outcome.state {
            PhaseGisState::Computed => self.events.emit(PlannerEvent::PhaseGisRecomputed {
                phase_id: outcome.phase_id.clone(),
                zones: outcome.zone_ids.len(),
                districts: outcome.district_ids.len(),
            }),
            PhaseGisState::Empty => self.events.emit(PlannerEvent::PhaseGisCleared {
                phase_id: outcome.phase_id.clone(),
            }),
        }
        self.events.emit(PlannerEvent::ScoresUpdated {
            project_id: outcome.project_id.clone(),
        });
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Decode a GeoJSON geometry and check it is a single valid point, line
    /// or polygon (or a multi of one kind)
    fn validate_geometry(&self, value: &serde_json::Value) -> Result<(Geometry<f64>, GeometryKind), GisError> {
        if value.is_null() {
            return Err(GisError::InvalidInput("geometry is required".into()));
        }

        let geometry = codec::parse_geometry(&value.to_string())?;
        let kind = GeometryKind::of(&geometry).ok_or_else(|| {
            GisError::InvalidGeometry(format!(
                "an asset must be a single kind of geometry, got {}",
                codec::type_name(&geometry)
            ))
        })?;
        validate(&geometry)?;

        Ok((geometry, kind))
    }
}
