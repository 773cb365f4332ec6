//! Dispute status transitions and the auto-resolution rule
//!
//! | From       | Allowed to                                   |
//! |------------|----------------------------------------------|
//! | OPEN       | ESCALATED, RESOLVED, REJECTED, AUTO_RESOLVED |
//! | ESCALATED  | RESOLVED, REJECTED                           |
//! | terminal   | none                                         |

use chrono::{DateTime, Duration, Utc};

use super::model::{Dispute, DisputeStatus};

impl DisputeStatus {
    /// Statuses reachable from `self` in one step
    pub fn allowed_transitions(&self) -> &'static [DisputeStatus] {
        match self {
            DisputeStatus::Open => &[
                DisputeStatus::Escalated,
                DisputeStatus::Resolved,
                DisputeStatus::Rejected,
                DisputeStatus::AutoResolved,
            ],
            DisputeStatus::Escalated => &[DisputeStatus::Resolved, DisputeStatus::Rejected],
            DisputeStatus::Resolved | DisputeStatus::Rejected | DisputeStatus::AutoResolved => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Evidence may only be appended while the dispute is still live
    pub fn accepts_evidence(&self) -> bool {
        !self.is_terminal()
    }
}

/// Pure lookup in the transition table
pub fn can_transition(from: DisputeStatus, to: DisputeStatus) -> bool {
    from.allowed_transitions().contains(&to)
}

/// True iff the dispute is OPEN, at least `auto_resolve_days` old at `now`,
/// and the respondent has not submitted any evidence.
pub fn should_auto_resolve(dispute: &Dispute, now: DateTime<Utc>, auto_resolve_days: i64) -> bool {
    if dispute.status != DisputeStatus::Open {
        return false;
    }

    let elapsed = now - dispute.created_at;
    elapsed >= Duration::days(auto_resolve_days) && !dispute.respondent_has_evidence()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispute::model::Evidence;
    use uuid::Uuid;

    fn dispute_created_at(created_at: DateTime<Utc>) -> Dispute {
        Dispute {
            id: Uuid::new_v4(),
            transaction_id: "t1".to_string(),
            complainant_id: "u1".to_string(),
            respondent_id: "u2".to_string(),
            reason: "item not received".to_string(),
            status: DisputeStatus::Open,
            escalation_reason: None,
            resolution_note: None,
            created_at,
            updated_at: created_at,
            evidences: vec![],
        }
    }

    fn evidence_from(dispute: &Dispute, submitted_by: &str) -> Evidence {
        Evidence {
            id: Uuid::new_v4(),
            dispute_id: dispute.id,
            submitted_by: submitted_by.to_string(),
            file_url: "proof.jpg".to_string(),
            description: None,
            created_at: dispute.created_at,
        }
    }

    #[test]
    fn test_transition_table() {
        use DisputeStatus::*;

        assert!(can_transition(Open, Escalated));
        assert!(can_transition(Open, Resolved));
        assert!(can_transition(Open, Rejected));
        assert!(can_transition(Open, AutoResolved));
        assert!(can_transition(Escalated, Resolved));
        assert!(can_transition(Escalated, Rejected));

        assert!(!can_transition(Resolved, Open));
        assert!(!can_transition(Escalated, AutoResolved));
        assert!(!can_transition(Escalated, Open));
        assert!(!can_transition(Open, Open));
    }

    #[test]
    fn test_terminal_states_never_transition() {
        for from in [
            DisputeStatus::Resolved,
            DisputeStatus::Rejected,
            DisputeStatus::AutoResolved,
        ] {
            assert!(from.is_terminal());
            assert!(!from.accepts_evidence());
            for to in DisputeStatus::ALL {
                assert!(!can_transition(from, to), "{} -> {} must be illegal", from, to);
            }
        }
        assert!(DisputeStatus::Open.accepts_evidence());
        assert!(DisputeStatus::Escalated.accepts_evidence());
    }

    #[test]
    fn test_auto_resolve_after_grace_window() {
        let now = Utc::now();
        let dispute = dispute_created_at(now - Duration::days(3));
        assert!(should_auto_resolve(&dispute, now, 3));
    }

    #[test]
    fn test_auto_resolve_blocked_by_respondent_evidence() {
        let now = Utc::now();
        let mut dispute = dispute_created_at(now - Duration::days(3));
        let evidence = evidence_from(&dispute, "u2");
        dispute.evidences.push(evidence);
        assert!(!should_auto_resolve(&dispute, now, 3));
    }

    #[test]
    fn test_complainant_evidence_does_not_block() {
        let now = Utc::now();
        let mut dispute = dispute_created_at(now - Duration::days(5));
        let evidence = evidence_from(&dispute, "u1");
        dispute.evidences.push(evidence);
        assert!(should_auto_resolve(&dispute, now, 3));
    }

    #[test]
    fn test_auto_resolve_too_early() {
        let now = Utc::now();
        // 2.9 days = 4176 minutes
        let dispute = dispute_created_at(now - Duration::minutes(4176));
        assert!(!should_auto_resolve(&dispute, now, 3));

        let mut with_evidence = dispute.clone();
        let evidence = evidence_from(&dispute, "u2");
        with_evidence.evidences.push(evidence);
        assert!(!should_auto_resolve(&with_evidence, now, 3));
    }

    #[test]
    fn test_auto_resolve_only_for_open() {
        let now = Utc::now();
        let mut dispute = dispute_created_at(now - Duration::days(10));
        dispute.status = DisputeStatus::Escalated;
        assert!(!should_auto_resolve(&dispute, now, 3));
    }
}
