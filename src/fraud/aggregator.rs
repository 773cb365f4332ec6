//! Risk aggregation
//!
//! Runs the detectors concurrently and folds their partial scores into one
//! 0-100 composite. Weights are applied in integer basis points so rounding is
//! exactly round-half-up: `round(v*0.40 + d*0.35 + r*0.25)`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::detectors::{DuplicateDetector, ReputationDetector, VelocityDetector};
use super::model::{RiskAssessment, RiskInput};
use crate::config::RiskSettings;
use crate::signal_store::SignalStore;

/// Weight for the velocity detector (0-1)
const WEIGHT_VELOCITY: f64 = 0.40;

/// Weight for the duplicate-action detector (0-1)
const WEIGHT_DUPLICATE: f64 = 0.35;

/// Weight for the device/IP reputation detector (0-1)
const WEIGHT_REPUTATION: f64 = 0.25;

/// Largest accepted weight for a single detector
const MAX_WEIGHT: f64 = 1.0;

const BASIS_POINTS: i64 = 10_000;

const MAX_RISK_SCORE: i32 = 100;
const MIN_RISK_SCORE: i32 = 0;

/// Composite score weights
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RiskWeights {
    pub velocity: f64,
    pub duplicate: f64,
    pub reputation: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            velocity: WEIGHT_VELOCITY,
            duplicate: WEIGHT_DUPLICATE,
            reputation: WEIGHT_REPUTATION,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("velocity", self.velocity),
            ("duplicate", self.duplicate),
            ("reputation", self.reputation),
        ] {
            if !weight.is_finite() || !(0.0..=MAX_WEIGHT).contains(&weight) {
                return Err(format!(
                    "Risk weight '{}' must be within 0..={}, got {}",
                    name, MAX_WEIGHT, weight
                ));
            }
        }
        Ok(())
    }

    fn to_basis_points(weight: f64) -> i64 {
        (weight * BASIS_POINTS as f64).round() as i64
    }

    /// Weighted, round-half-up, clamped composite of the three detector scores
    pub fn composite(&self, velocity: i32, duplicate: i32, reputation: i32) -> i32 {
        let weighted = [
            (velocity, self.velocity),
            (duplicate, self.duplicate),
            (reputation, self.reputation),
        ]
        .into_iter()
        .fold(0i64, |acc, (score, weight)| {
            acc.saturating_add(i64::from(score.max(0)).saturating_mul(Self::to_basis_points(weight)))
        });

        let rounded = weighted.saturating_add(BASIS_POINTS / 2) / BASIS_POINTS;
        rounded.clamp(i64::from(MIN_RISK_SCORE), i64::from(MAX_RISK_SCORE)) as i32
    }
}

/// Runs every detector for an input and combines the results
#[derive(Clone)]
pub struct RiskAggregator {
    velocity: VelocityDetector,
    duplicate: DuplicateDetector,
    reputation: ReputationDetector,
    weights: RiskWeights,
}

impl RiskAggregator {
    pub fn new(store: Arc<dyn SignalStore>, settings: &RiskSettings) -> Self {
        Self {
            velocity: VelocityDetector::new(store.clone(), settings),
            duplicate: DuplicateDetector::new(store.clone(), settings),
            reputation: ReputationDetector::new(store, settings),
            weights: settings.weights,
        }
    }

    pub fn weights(&self) -> RiskWeights {
        self.weights
    }

    /// Evaluate all detectors concurrently and wait for every one of them
    pub async fn assess(&self, input: &RiskInput) -> RiskAssessment {
        let (velocity, duplicate, reputation) = tokio::join!(
            self.velocity.evaluate(input),
            self.duplicate.evaluate(input),
            self.reputation.evaluate(input),
        );

        let risk_score = self
            .weights
            .composite(velocity.score, duplicate.score, reputation.score);

        let signals = vec![velocity, duplicate, reputation];
        let reason = signals
            .iter()
            .map(|s| s.reason.as_str())
            .collect::<Vec<_>>()
            .join(";");

        RiskAssessment {
            risk_score,
            reason,
            signals,
        }
    }
}
