//! Service layer for cip-gis
//!
//! Services sit between callers (the CLI, a web layer) and the repositories.
//! Each one wraps database operations with:
//! - Input validation
//! - Transaction boundaries
//! - The synchronous GIS recomputation every asset mutation requires
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! Callers (CLI, web handlers)
//!     ↓
//! Service Layer ──▶ GisOrchestrator (same transaction)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod gis_service;
pub mod asset_service;
pub mod phase_service;
pub mod score_service;

// Re-exports
pub use asset_service::{AssetMutation, AssetService};
pub use events::{spawn_logging_listener, EventBus, EventListener, PlannerEvent};
pub use gis_service::{GisOrchestrator, GisTrigger, PhaseGisOutcome, PhaseGisState};
pub use phase_service::{PhaseReport, PhaseService, RecomputeSummary};
pub use score_service::{ProjectScoreReport, ScoreService};

use crate::db::PlannerDb;
use crate::gis::ScoringPolicy;
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds all services over one shared database and event bus.
pub struct Services {
    pub assets: Arc<AssetService>,
    pub phases: Arc<PhaseService>,
    pub scores: Arc<ScoreService>,
    pub gis: Arc<GisOrchestrator>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<PlannerDb>, policy: ScoringPolicy) -> Self {
        let events = Arc::new(EventBus::new());
        let gis = Arc::new(GisOrchestrator::new(policy));

        Self {
            assets: Arc::new(AssetService::new(db.clone(), events.clone(), gis.clone())),
            phases: Arc::new(PhaseService::new(db.clone(), events.clone(), gis.clone())),
            scores: Arc::new(ScoreService::new(db, events.clone())),
            gis,
            events,
        }
    }
}
