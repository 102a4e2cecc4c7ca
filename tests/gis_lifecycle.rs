//! Integration tests for the asset -> distribution -> score lifecycle
//!
//! Runs the service layer against an on-disk database with a three-zone
//! partition and one district of each kind:
//!
//! ```text
//!  y=10 ┌──────────┬──────────┬──────────┐
//!       │  Zone 1  │  Zone 2  │  Zone 3  │
//!       │ eq 0.8   │ eq 0.4   │ eq 0.0   │
//!  y=0  └──────────┴──────────┴──────────┘
//!       x=0        10         20         30
//!
//!  House 1: x 0..15   Senate 1: x 0..30   Commissioner 1: x 10..30
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use geo::{polygon, Geometry, MultiPolygon};
use serde_json::json;
use tempfile::TempDir;
use tokio::time::{timeout, Duration};

use cip_gis::db::projects::{phase_types, CreateFundingInput, CreatePhaseInput};
use cip_gis::db::reference::{self, DistrictKind};
use cip_gis::db::scores::ManualScores;
use cip_gis::db::{assets, CreateAssetInput, PlannerDb};
use cip_gis::gis::{DerivedScores, GeometryKind, ScoreWeights, ScoringPolicy};
use cip_gis::services::{PhaseGisState, PlannerEvent};
use cip_gis::{GisError, Services};

const TOLERANCE: f64 = 1e-6;

struct Fixture {
    _dir: TempDir,
    db: Arc<PlannerDb>,
    services: Services,
    project_id: String,
    phase_id: String,
}

fn rect(x0: f64, x1: f64, y0: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
    ]])
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(PlannerDb::open(&dir.path().join("planner.db")).unwrap());

    db.with_conn(|conn| {
        reference::insert_zone(conn, "Zone 1", &rect(0.0, 10.0, 0.0, 10.0), 0.8)?;
        reference::insert_zone(conn, "Zone 2", &rect(10.0, 20.0, 0.0, 10.0), 0.4)?;
        reference::insert_zone(conn, "Zone 3", &rect(20.0, 30.0, 0.0, 10.0), 0.0)?;
        reference::insert_district(conn, DistrictKind::House, "House 1", &rect(0.0, 15.0, 0.0, 10.0))?;
        reference::insert_district(conn, DistrictKind::Senate, "Senate 1", &rect(0.0, 30.0, 0.0, 10.0))?;
        reference::insert_district(conn, DistrictKind::Commissioner, "Commissioner 1", &rect(10.0, 30.0, 0.0, 10.0))?;
        Ok(())
    })
    .unwrap();

    let services = Services::new(db.clone(), ScoringPolicy::default());
    let project = services.phases.create_project("Forest Trail", Some("Trail and trailheads")).unwrap();
    let phase = new_phase(&services, &project.id);

    Fixture {
        _dir: dir,
        db,
        services,
        project_id: project.id,
        phase_id: phase,
    }
}

fn new_phase(services: &Services, project_id: &str) -> String {
    services
        .phases
        .create_phase(CreatePhaseInput {
            project_id: project_id.to_string(),
            phase_type: phase_types::CONSTRUCTION.into(),
            status: "unscheduled".into(),
            estimated_bid_quarter: Some("Q2".into()),
        })
        .unwrap()
        .id
}

fn point(x: f64, y: f64) -> serde_json::Value {
    json!({"type": "Point", "coordinates": [x, y]})
}

fn line(from: [f64; 2], to: [f64; 2]) -> serde_json::Value {
    json!({"type": "LineString", "coordinates": [from, to]})
}

fn square(x0: f64, x1: f64, y0: f64, y1: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
    })
}

fn add(f: &Fixture, phase_id: &str, geometry: serde_json::Value) -> String {
    f.services
        .assets
        .create(CreateAssetInput {
            phase_id: phase_id.to_string(),
            geometry,
            asset_id: None,
            asset_type: Some("trail".into()),
            name: None,
        })
        .unwrap()
        .asset
        .id
}

/// (zone name, proportion) for every recorded row
fn rows(f: &Fixture, phase_id: &str) -> Vec<(String, f64)> {
    f.services
        .phases
        .distributions(phase_id)
        .unwrap()
        .into_iter()
        .map(|r| (r.zone_name, r.proportion))
        .collect()
}

fn nonzero_zones(f: &Fixture, phase_id: &str) -> BTreeSet<String> {
    rows(f, phase_id)
        .into_iter()
        .filter(|(_, p)| *p > 0.0)
        .map(|(z, _)| z)
        .collect()
}

fn sum(rows: &[(String, f64)]) -> f64 {
    rows.iter().map(|(_, p)| p).sum()
}

fn derived(f: &Fixture) -> DerivedScores {
    let row = f.services.scores.get(&f.project_id).unwrap().unwrap();
    DerivedScores {
        geographic_distance_score: row.geographic_distance_score.unwrap_or_default(),
        social_equity_score: row.social_equity_score.unwrap_or_default(),
    }
}

#[test]
fn test_point_in_one_zone_then_second_zone() {
    let f = fixture();

    add(&f, &f.phase_id, point(5.0, 5.0));
    assert_eq!(rows(&f, &f.phase_id), vec![("Zone 1".to_string(), 1.0)]);

    add(&f, &f.phase_id, point(15.0, 5.0));
    assert_eq!(
        rows(&f, &f.phase_id),
        vec![("Zone 1".to_string(), 0.5), ("Zone 2".to_string(), 0.5)]
    );
}

#[test]
fn test_polygon_split_seventy_thirty() {
    let f = fixture();

    add(&f, &f.phase_id, square(3.0, 13.0, 0.0, 10.0));

    let rows = rows(&f, &f.phase_id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "Zone 1");
    assert!((rows[0].1 - 0.7).abs() < TOLERANCE);
    assert_eq!(rows[1].0, "Zone 2");
    assert!((rows[1].1 - 0.3).abs() < TOLERANCE);
    assert!((sum(&rows) - 1.0).abs() < TOLERANCE);
}

#[test]
fn test_mixed_kinds_sum_to_one_and_coverage_only_grows() {
    let f = fixture();

    add(&f, &f.phase_id, point(5.0, 5.0));
    let first = nonzero_zones(&f, &f.phase_id);

    add(&f, &f.phase_id, line([5.0, 5.0], [15.0, 5.0]));
    let second = nonzero_zones(&f, &f.phase_id);
    assert!((sum(&rows(&f, &f.phase_id)) - 1.0).abs() < TOLERANCE);

    add(&f, &f.phase_id, square(22.0, 28.0, 2.0, 8.0));
    let third = nonzero_zones(&f, &f.phase_id);

    assert!(first.is_subset(&second));
    assert!(second.is_subset(&third));
    assert_eq!(third.len(), 3);

    // point, line and polygon each carry a third of the weight
    let rows = rows(&f, &f.phase_id);
    assert!((rows[0].1 - 0.5).abs() < TOLERANCE);
    assert!((rows[1].1 - 1.0 / 6.0).abs() < TOLERANCE);
    assert!((rows[2].1 - 1.0 / 3.0).abs() < TOLERANCE);
    assert!((sum(&rows) - 1.0).abs() < TOLERANCE);
}

#[test]
fn test_cost_by_zone_apportions_budget() {
    let f = fixture();

    for (year, cents) in [(2026, 1_000_000), (2027, 333)] {
        f.services
            .phases
            .add_funding(CreateFundingInput {
                phase_id: f.phase_id.clone(),
                year,
                budget_cents: cents,
                actual_cost_cents: None,
                funding_secured: true,
            })
            .unwrap();
    }
    add(&f, &f.phase_id, square(3.0, 13.0, 0.0, 10.0));

    let total = f.services.phases.total_budget_cents(&f.phase_id).unwrap();
    assert_eq!(total, 1_000_333);

    let cost = f.services.phases.cost_by_zone(&f.phase_id).unwrap();
    for (zone, proportion) in rows(&f, &f.phase_id) {
        assert_eq!(cost[&zone], (total as f64 * proportion).round() as i64);
    }
    assert_eq!(cost["Zone 1"], 700_233);

    let report = f.services.phases.report(&f.phase_id).unwrap();
    assert_eq!(report.total_budget_cents, total);
    assert_eq!(report.cost_by_zone, cost);
}

#[test]
fn test_recompute_is_idempotent() {
    let f = fixture();
    add(&f, &f.phase_id, square(3.0, 13.0, 0.0, 10.0));
    add(&f, &f.phase_id, point(25.0, 5.0));

    let before_rows = rows(&f, &f.phase_id);
    let before_scores = derived(&f);

    f.services.phases.recompute(&f.phase_id).unwrap();
    f.services.phases.recompute(&f.phase_id).unwrap();

    assert_eq!(rows(&f, &f.phase_id), before_rows);
    assert_eq!(derived(&f), before_scores);
}

#[test]
fn test_deleting_last_asset_empties_phase() {
    let f = fixture();
    let first = add(&f, &f.phase_id, point(5.0, 5.0));
    let second = add(&f, &f.phase_id, point(15.0, 5.0));

    let outcome = f.services.assets.delete(&first).unwrap().unwrap();
    assert_eq!(outcome.state, PhaseGisState::Computed);
    assert_eq!(nonzero_zones(&f, &f.phase_id), BTreeSet::from(["Zone 2".to_string()]));

    let outcome = f.services.assets.delete(&second).unwrap().unwrap();
    assert_eq!(outcome.state, PhaseGisState::Empty);
    assert!(rows(&f, &f.phase_id).is_empty());
    assert_eq!(derived(&f), DerivedScores::ZERO);

    assert!(f.services.assets.delete(&second).unwrap().is_none());
}

#[test]
fn test_phase_delete_cascades_and_rescores_remaining_phases() {
    let f = fixture();
    let other_phase = new_phase(&f.services, &f.project_id);

    add(&f, &f.phase_id, point(5.0, 5.0));
    add(&f, &other_phase, point(25.0, 5.0));

    assert!(f.services.phases.delete_phase(&f.phase_id).unwrap());
    assert!(rows(&f, &f.phase_id).is_empty());
    assert!(f.services.phases.get_phase(&f.phase_id).unwrap().is_none());
    assert!(f.services.assets.list_for_phase(&f.phase_id).unwrap().is_empty());

    // only Zone 3 (equity 0.0) remains attributed
    let report = f.services.scores.report(&f.project_id);
    assert!(matches!(report, Err(GisError::ScoreWeights { found: 0 })));
    let scores = derived(&f);
    assert!((scores.geographic_distance_score - 5.0 / 3.0).abs() < TOLERANCE);
    assert_eq!(scores.social_equity_score, 0.0);

    assert!(f.services.phases.delete_phase(&other_phase).unwrap());
    assert_eq!(derived(&f), DerivedScores::ZERO);
    assert!(!f.services.phases.delete_phase(&other_phase).unwrap());

    let stats = f.db.stats().unwrap();
    assert_eq!(stats.phase_count, 0);
    assert_eq!(stats.asset_count, 0);
    assert_eq!(stats.distribution_count, 0);
}

#[test]
fn test_moved_asset_zeroes_old_zone_and_keeps_association() {
    let f = fixture();
    let id = add(&f, &f.phase_id, point(5.0, 5.0));

    let mutation = f.services.assets.update_geometry(&id, &point(25.0, 5.0)).unwrap();
    assert_eq!(mutation.gis.zone_ids.len(), 1);

    assert_eq!(
        rows(&f, &f.phase_id),
        vec![("Zone 1".to_string(), 0.0), ("Zone 3".to_string(), 1.0)]
    );

    f.services.scores.set_weights(&ScoreWeights::default()).unwrap();
    let report = f.services.scores.report(&f.project_id).unwrap();
    let zones: Vec<&str> = report.zones.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(zones, vec!["Zone 1", "Zone 3"]);
}

#[test]
fn test_districts_use_containment() {
    let f = fixture();
    f.services.scores.set_weights(&ScoreWeights::default()).unwrap();

    // straddles Zone 1/2 and House 1's eastern edge: only Senate 1 contains it
    add(&f, &f.phase_id, line([5.0, 5.0], [18.0, 5.0]));
    let report = f.services.scores.report(&f.project_id).unwrap();
    let names: Vec<&str> = report.districts.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Senate 1"]);

    add(&f, &f.phase_id, point(12.0, 5.0));
    let report = f.services.scores.report(&f.project_id).unwrap();
    let names: Vec<&str> = report.districts.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Commissioner 1", "House 1", "Senate 1"]);
}

#[test]
fn test_asset_outside_partition_is_not_an_error() {
    let f = fixture();
    let mutation = f
        .services
        .assets
        .create(CreateAssetInput {
            phase_id: f.phase_id.clone(),
            geometry: point(-50.0, -50.0),
            asset_id: None,
            asset_type: None,
            name: None,
        })
        .unwrap();

    assert!(mutation.gis.zone_ids.is_empty());
    assert!(mutation.gis.district_ids.is_empty());
    assert!(rows(&f, &f.phase_id).is_empty());
    assert_eq!(derived(&f), DerivedScores::ZERO);
}

#[test]
fn test_invalid_geometry_is_rejected() {
    let f = fixture();
    let bowtie = json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0], [0.0, 0.0]]]
    });

    let result = f.services.assets.create(CreateAssetInput {
        phase_id: f.phase_id.clone(),
        geometry: bowtie,
        asset_id: None,
        asset_type: None,
        name: None,
    });
    assert!(matches!(result, Err(GisError::InvalidGeometry(_))));
    assert!(f.services.assets.list_for_phase(&f.phase_id).unwrap().is_empty());
}

#[test]
fn test_hole_escaping_its_shell_is_rejected() {
    let f = fixture();
    add(&f, &f.phase_id, square(1.0, 3.0, 1.0, 3.0));

    // shell is all Zone 1, the "hole" reaches into Zone 2
    let escaping_hole = json!({
        "type": "Polygon",
        "coordinates": [
            [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
            [[5.0, 2.0], [15.0, 2.0], [15.0, 8.0], [5.0, 8.0], [5.0, 2.0]]
        ]
    });

    let result = f.services.assets.create(CreateAssetInput {
        phase_id: f.phase_id.clone(),
        geometry: escaping_hole,
        asset_id: None,
        asset_type: None,
        name: None,
    });
    assert!(matches!(result, Err(GisError::InvalidGeometry(_))));

    assert_eq!(f.services.assets.list_for_phase(&f.phase_id).unwrap().len(), 1);
    assert_eq!(nonzero_zones(&f, &f.phase_id), BTreeSet::from(["Zone 1".to_string()]));
}

#[test]
fn test_failed_recompute_rolls_back_the_mutation() {
    let f = fixture();

    // a bad row that bypassed validation
    let bowtie = Geometry::Polygon(polygon![
        (x: 0.0, y: 0.0), (x: 10.0, y: 10.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0),
    ]);
    f.db.with_conn(|conn| {
        let input = CreateAssetInput {
            phase_id: f.phase_id.clone(),
            geometry: serde_json::Value::Null,
            asset_id: None,
            asset_type: None,
            name: None,
        };
        assets::insert_asset(conn, &input, &bowtie, GeometryKind::Polygon)
    })
    .unwrap();

    let result = f.services.assets.create(CreateAssetInput {
        phase_id: f.phase_id.clone(),
        geometry: point(5.0, 5.0),
        asset_id: None,
        asset_type: None,
        name: None,
    });
    assert!(matches!(result, Err(GisError::InvalidGeometry(_))));

    assert_eq!(f.services.assets.list_for_phase(&f.phase_id).unwrap().len(), 1);
    assert!(rows(&f, &f.phase_id).is_empty());
}

#[test]
fn test_total_score_uses_weights_and_derived_fields() {
    let f = fixture();
    f.services
        .scores
        .set_weights(&ScoreWeights {
            core_mission: 0.7,
            operations_impact: 0.8,
            sustainability: 0.2,
            ease: 0.6,
            geographic_distance: 0.5,
            social_equity: 0.4,
        })
        .unwrap();

    // nothing derived yet and no manual scores
    assert_eq!(f.services.scores.total_score(&f.project_id).unwrap(), 0.0);

    f.services
        .scores
        .set_manual(&f.project_id, &ManualScores {
            core_mission: Some(3),
            operations_impact: Some(1),
            sustainability: Some(5),
            ease: Some(4),
        })
        .unwrap();
    add(&f, &f.phase_id, point(5.0, 5.0));

    let scores = derived(&f);
    assert!((scores.geographic_distance_score - 5.0 / 3.0).abs() < TOLERANCE);
    assert!((scores.social_equity_score - 4.0).abs() < TOLERANCE);

    let expected = (3.0 * 0.7
        + 1.0 * 0.8
        + 5.0 * 0.2
        + 4.0 * 0.6
        + scores.geographic_distance_score * 0.5
        + scores.social_equity_score * 0.4)
        / 3.2;
    let total = f.services.scores.total_score(&f.project_id).unwrap();
    assert!((total - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_events_follow_commit() {
    let f = fixture();
    let mut receiver = f.services.events.subscribe();

    let id = add(&f, &f.phase_id, point(5.0, 5.0));

    let mut next = || {
        let event = receiver.try_recv();
        event.expect("event missing")
    };
    assert_eq!(next(), PlannerEvent::AssetCreated { id, phase_id: f.phase_id.clone() });
    assert_eq!(
        next(),
        PlannerEvent::PhaseGisRecomputed { phase_id: f.phase_id.clone(), zones: 1, districts: 2 }
    );
    assert_eq!(next(), PlannerEvent::ScoresUpdated { project_id: f.project_id.clone() });

    // nothing else was queued
    assert!(timeout(Duration::from_millis(20), receiver.recv()).await.is_err());
}
