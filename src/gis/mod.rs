//! Geospatial attribution engine
//!
//! Pure computation over `geo` geometries, no database access. The service
//! layer feeds it the current assets of a phase and persists what it returns.
//!
//! ## Pipeline
//!
//! ```text
//! stored GeoJSON ──codec──▶ geo::Geometry
//!                               │
//!                          aggregate      one union per kind (polygon / line / point)
//!                               │
//!                          intersect      zones that intersect, districts that contain
//!                               │
//!                          distribution   per-zone proportion, sums to 1.0
//!                               │
//!                          scoring        geographic distance + social equity
//! ```
//!
//! All geometries are in the one projected coordinate system the planner
//! stores, so areas and lengths are plain planar measures.

pub mod codec;
pub mod validate;
pub mod aggregate;
pub mod intersect;
pub mod distribution;
pub mod scoring;

pub use aggregate::{aggregate, AggregatedGeometry, GeometryKind};
pub use distribution::{distribute, KindMeasures, ZoneDistribution, MEASURE_EPSILON};
pub use intersect::{containing, intersecting, ReferenceArea};
pub use scoring::{derive_scores, total_score, DerivedScores, ScoreCard, ScoreField, ScoreWeights, ScoringPolicy};
