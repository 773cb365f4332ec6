//! Fraud models and data structures

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Review status of a fraud alert
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "alert_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,   // Awaiting admin review
    Reviewed,  // Looked at, no verdict recorded
    Safe,      // False positive
    Suspended, // Actor suspended
}

/// Persisted record of a flagged evaluation
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct FraudAlert {
    pub id: Uuid,
    pub actor_id: Option<String>,
    pub action_id: Option<String>, // e.g. order id
    pub network_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub risk_score: i32, // 0-100
    pub reason: String,  // ';'-joined detector reasons
    pub status: AlertStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Action being scored. Every field is optional; detectors skip what they can't evaluate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskInput {
    pub actor_id: Option<String>,
    pub action_id: Option<String>,
    pub network_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Treat blank strings the same as missing ones
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RiskInput {
    pub fn actor(&self) -> Option<&str> {
        non_blank(&self.actor_id)
    }

    pub fn action(&self) -> Option<&str> {
        non_blank(&self.action_id)
    }

    pub fn network_address(&self) -> Option<&str> {
        non_blank(&self.network_address)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        non_blank(&self.device_fingerprint)
    }
}

/// Which detector produced a signal
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Velocity,
    Duplicate,
    Reputation,
}

/// Partial score from a single detector
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DetectorSignal {
    pub detector: DetectorKind,
    pub score: i32,
    pub reason: String,
}

impl DetectorSignal {
    pub fn new(detector: DetectorKind, score: i32, reason: impl Into<String>) -> Self {
        Self {
            detector,
            score,
            reason: reason.into(),
        }
    }
}

/// Composite score before any alerting policy is applied
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub risk_score: i32,
    pub reason: String,
    pub signals: Vec<DetectorSignal>,
}

/// Result returned to the request-monitoring caller
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RiskEvaluation {
    pub flagged: bool,
    pub risk_score: i32,
    pub reason: String,
    pub alert_id: Option<Uuid>,
    /// Whether an account suspension was dispatched
    pub suspension_requested: bool,
    pub signals: Vec<DetectorSignal>,
}

/// Admin verdict on an alert
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMark {
    Safe,
    Reviewed,
    Suspended,
}

impl From<ReviewMark> for AlertStatus {
    fn from(mark: ReviewMark) -> Self {
        match mark {
            ReviewMark::Safe => AlertStatus::Safe,
            ReviewMark::Reviewed => AlertStatus::Reviewed,
            ReviewMark::Suspended => AlertStatus::Suspended,
        }
    }
}

/// Request DTO for reviewing an alert
#[derive(Debug, Deserialize)]
pub struct ReviewAlertRequest {
    pub mark: ReviewMark,
}

/// Query parameters for listing alerts
#[derive(Debug, Deserialize, Default)]
pub struct ListAlertsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListAlertsQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Normalized (page, page_size), 1-based page
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE);
        (page, page_size)
    }
}

/// One page of alerts, newest first
#[derive(Debug, Serialize)]
pub struct AlertPage {
    pub items: Vec<FraudAlert>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fields_are_absent() {
        let input = RiskInput {
            actor_id: Some("  ".to_string()),
            action_id: Some("o1".to_string()),
            network_address: Some(String::new()),
            device_fingerprint: None,
            metadata: None,
        };
        assert_eq!(input.actor(), None);
        assert_eq!(input.action(), Some("o1"));
        assert_eq!(input.network_address(), None);
        assert_eq!(input.fingerprint(), None);
    }

    #[test]
    fn test_list_alerts_query_defaults_and_clamps() {
        assert_eq!(ListAlertsQuery::default().resolve(), (1, 20));
        assert_eq!(
            ListAlertsQuery {
                page: Some(0),
                page_size: Some(1000)
            }
            .resolve(),
            (1, 100)
        );
        assert_eq!(
            ListAlertsQuery {
                page: Some(3),
                page_size: Some(0)
            }
            .resolve(),
            (3, 1)
        );
    }

    #[test]
    fn test_review_mark_maps_to_status() {
        assert_eq!(AlertStatus::from(ReviewMark::Safe), AlertStatus::Safe);
        assert_eq!(AlertStatus::from(ReviewMark::Reviewed), AlertStatus::Reviewed);
        assert_eq!(
            AlertStatus::from(ReviewMark::Suspended),
            AlertStatus::Suspended
        );
    }

    #[test]
    fn test_review_mark_rejects_pending() {
        let parsed: Result<ReviewAlertRequest, _> =
            serde_json::from_str(r#"{"mark":"pending"}"#);
        assert!(parsed.is_err());

        let parsed: ReviewAlertRequest = serde_json::from_str(r#"{"mark":"safe"}"#).unwrap();
        assert_eq!(parsed.mark, ReviewMark::Safe);
    }
}
