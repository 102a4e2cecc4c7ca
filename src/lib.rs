//! CIP GIS - geospatial attribution engine for capital-improvement planning
//!
//! Keeps each project phase's geographic footprint attributed to the fixed
//! partition of zones and to the political districts, and derives from it:
//!
//! - a per-zone distribution of the phase (proportions summing to 1.0), used
//!   to apportion the phase budget across zones
//! - the project's zone and district associations
//! - two project score fields: geographic distance and social equity
//!
//! ## Layout
//!
//! - [`gis`] - pure geometry engine (aggregate, intersect, distribute, score)
//! - [`db`] - SQLite repositories
//! - [`services`] - validation, transactions, and the orchestrator that runs
//!   on every asset mutation
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/cip-gis/
//! ├── planner.db      # SQLite (WAL)
//! └── config.toml     # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod gis;
pub mod services;

pub use config::Config;
pub use db::PlannerDb;
pub use error::GisError;
pub use services::Services;
