//! Dispute models and data structures

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Dispute lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "dispute_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,         // Filed by the complainant
    Escalated,    // Complainant asked for admin attention
    Resolved,     // Admin decided for the complainant
    Rejected,     // Admin dismissed the complaint
    AutoResolved, // Respondent never answered within the grace window
}

impl DisputeStatus {
    pub const ALL: [DisputeStatus; 5] = [
        DisputeStatus::Open,
        DisputeStatus::Escalated,
        DisputeStatus::Resolved,
        DisputeStatus::Rejected,
        DisputeStatus::AutoResolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::Escalated => "ESCALATED",
            DisputeStatus::Resolved => "RESOLVED",
            DisputeStatus::Rejected => "REJECTED",
            DisputeStatus::AutoResolved => "AUTO_RESOLVED",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispute model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Dispute {
    pub id: Uuid,
    pub transaction_id: String,
    pub complainant_id: String,
    pub respondent_id: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub escalation_reason: Option<String>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Oldest first
    #[sqlx(skip)]
    #[serde(default)]
    pub evidences: Vec<Evidence>,
}

impl Dispute {
    /// Whether the respondent has submitted any evidence
    pub fn respondent_has_evidence(&self) -> bool {
        self.evidences
            .iter()
            .any(|e| e.submitted_by == self.respondent_id)
    }
}

/// Evidence attached to a dispute
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Evidence {
    pub id: Uuid,
    pub dispute_id: Uuid,
    pub submitted_by: String,
    pub file_url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for opening a dispute
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDisputeRequest {
    #[validate(length(min = 1, max = 255))]
    pub transaction_id: String,
    #[validate(length(min = 1, max = 255))]
    pub complainant_id: String,
    #[validate(length(min = 1, max = 255))]
    pub respondent_id: String,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// Request DTO for submitting evidence
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitEvidenceRequest {
    #[validate(length(min = 1, max = 255))]
    pub submitted_by: String,
    #[validate(length(min = 1, max = 2048))]
    pub file_url: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// Request DTO for escalating a dispute
#[derive(Debug, Deserialize, Validate)]
pub struct EscalateDisputeRequest {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// Request DTO for an admin status/note update
#[derive(Debug, Deserialize, Validate, Default)]
pub struct AdminUpdateDisputeRequest {
    pub status: Option<DisputeStatus>,
    #[validate(length(max = 2000))]
    pub resolution_note: Option<String>,
}

/// Query parameters for listing disputes
#[derive(Debug, Deserialize, Default)]
pub struct ListDisputesQuery {
    pub status: Option<DisputeStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListDisputesQuery {
    /// Normalized (page, page_size), 1-based page
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).clamp(1, 100);
        (page, page_size)
    }
}

/// One page of disputes, newest first. Evidences are not loaded.
#[derive(Debug, Serialize)]
pub struct DisputePage {
    pub items: Vec<Dispute>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&DisputeStatus::AutoResolved).unwrap(),
            r#""AUTO_RESOLVED""#
        );
        let parsed: DisputeStatus = serde_json::from_str(r#""ESCALATED""#).unwrap();
        assert_eq!(parsed, DisputeStatus::Escalated);
        assert_eq!(DisputeStatus::Open.to_string(), "OPEN");
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateDisputeRequest {
            transaction_id: "t1".to_string(),
            complainant_id: "u1".to_string(),
            respondent_id: "u2".to_string(),
            reason: "item not received".to_string(),
        };
        assert!(ok.validate().is_ok());

        let missing = CreateDisputeRequest {
            transaction_id: String::new(),
            ..ok
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_list_disputes_query_resolve() {
        assert_eq!(ListDisputesQuery::default().resolve(), (1, 20));
        let query = ListDisputesQuery {
            status: None,
            page: Some(0),
            page_size: Some(500),
        };
        assert_eq!(query.resolve(), (1, 100));
    }
}
