//! Project scoring
//!
//! Two of the six project score fields are derived from geometry; the other
//! four are entered by staff. The total is the weight-normalised sum of all
//! six and is 0 whenever any field is still unscored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::distribution::ZoneDistribution;

/// Scale for the derived scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub max_score: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self { max_score: 5.0 }
    }
}

/// The geometry-derived score fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedScores {
    pub geographic_distance_score: f64,
    pub social_equity_score: f64,
}

impl DerivedScores {
    pub const ZERO: DerivedScores = DerivedScores {
        geographic_distance_score: 0.0,
        social_equity_score: 0.0,
    };
}

/// Derive both scores from a project's zone distribution.
///
/// - geographic distance: share of the partition's zones the project reaches
/// - social equity: distribution-weighted mean of the zones' equity index
///
/// `equity_index` maps every zone id in the partition to its index in [0, 1];
/// its length is the partition size.
pub fn derive_scores(
    distribution: &ZoneDistribution,
    equity_index: &BTreeMap<String, f64>,
    policy: ScoringPolicy,
) -> DerivedScores {
    if distribution.is_empty() || equity_index.is_empty() {
        return DerivedScores::ZERO;
    }

    let reached = distribution
        .iter()
        .filter(|(zone_id, p)| *p > 0.0 && equity_index.contains_key(*zone_id))
        .count();
    let geographic = policy.max_score * reached as f64 / equity_index.len() as f64;

    let equity: f64 = distribution
        .iter()
        .map(|(zone_id, p)| p * equity_index.get(zone_id).copied().unwrap_or(0.0))
        .sum();

    DerivedScores {
        geographic_distance_score: geographic,
        social_equity_score: policy.max_score * equity,
    }
}

/// Every field that feeds the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreField {
    CoreMission,
    OperationsImpact,
    Sustainability,
    Ease,
    GeographicDistance,
    SocialEquity,
}

impl ScoreField {
    pub const ALL: [ScoreField; 6] = [
        ScoreField::CoreMission,
        ScoreField::OperationsImpact,
        ScoreField::Sustainability,
        ScoreField::Ease,
        ScoreField::GeographicDistance,
        ScoreField::SocialEquity,
    ];

    /// Column name shared by `project_scores` and `score_weights`
    pub fn column(&self) -> &'static str {
        match self {
            ScoreField::CoreMission => "core_mission_score",
            ScoreField::OperationsImpact => "operations_impact_score",
            ScoreField::Sustainability => "sustainability_score",
            ScoreField::Ease => "ease_score",
            ScoreField::GeographicDistance => "geographic_distance_score",
            ScoreField::SocialEquity => "social_equity_score",
        }
    }
}

/// One project's six score values; `None` means not yet scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreCard {
    pub core_mission: Option<f64>,
    pub operations_impact: Option<f64>,
    pub sustainability: Option<f64>,
    pub ease: Option<f64>,
    pub geographic_distance: Option<f64>,
    pub social_equity: Option<f64>,
}

impl ScoreCard {
    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::CoreMission => self.core_mission,
            ScoreField::OperationsImpact => self.operations_impact,
            ScoreField::Sustainability => self.sustainability,
            ScoreField::Ease => self.ease,
            ScoreField::GeographicDistance => self.geographic_distance,
            ScoreField::SocialEquity => self.social_equity,
        }
    }
}

/// Global weight per score field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub core_mission: f64,
    pub operations_impact: f64,
    pub sustainability: f64,
    pub ease: f64,
    pub geographic_distance: f64,
    pub social_equity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            core_mission: 1.0,
            operations_impact: 1.0,
            sustainability: 1.0,
            ease: 1.0,
            geographic_distance: 1.0,
            social_equity: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, field: ScoreField) -> f64 {
        match field {
            ScoreField::CoreMission => self.core_mission,
            ScoreField::OperationsImpact => self.operations_impact,
            ScoreField::Sustainability => self.sustainability,
            ScoreField::Ease => self.ease,
            ScoreField::GeographicDistance => self.geographic_distance,
            ScoreField::SocialEquity => self.social_equity,
        }
    }
}

/// Σ(score × weight) / Σ(weight); 0 if any field is unscored or all weights are 0
pub fn total_score(card: &ScoreCard, weights: &ScoreWeights) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;

    for field in ScoreField::ALL {
        let Some(score) = card.get(field) else {
            return 0.0;
        };
        let weight = weights.get(field);
        weighted += score * weight;
        weight_sum += weight;
    }

    if weight_sum <= 0.0 {
        return 0.0;
    }
    weighted / weight_sum
}
