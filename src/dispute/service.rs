//! Dispute service layer - filing, evidence, escalation, admin review and auto-resolution

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    AdminUpdateDisputeRequest, CreateDisputeRequest, Dispute, DisputePage, DisputeStatus,
    EscalateDisputeRequest, Evidence, ListDisputesQuery, SubmitEvidenceRequest,
};
use super::repository::{DisputeRepository, EvidenceAppend, StatusChange};
use super::state_machine::{can_transition, should_auto_resolve};
use crate::clock::Clock;
use crate::config::DisputeSettings;
use crate::error::{ServiceError, ServiceResult};

/// Statuses an admin may set directly
const ADMIN_STATUSES: [DisputeStatus; 2] = [DisputeStatus::Resolved, DisputeStatus::Rejected];

/// Dispute service
pub struct DisputeService {
    repo: Arc<dyn DisputeRepository>,
    clock: Arc<dyn Clock>,
    auto_resolve_days: i64,
    /// Held for the duration of one sweep
    sweep_lock: Mutex<()>,
}

impl DisputeService {
    /// Create new dispute service instance
    pub fn new(
        repo: Arc<dyn DisputeRepository>,
        clock: Arc<dyn Clock>,
        settings: &DisputeSettings,
    ) -> Self {
        Self {
            repo,
            clock,
            auto_resolve_days: settings.auto_resolve_days,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Open a new dispute in OPEN status
    pub async fn create_dispute(&self, request: CreateDisputeRequest) -> ServiceResult<Dispute> {
        request.validate()?;

        let transaction_id = required("transaction_id", &request.transaction_id)?;
        let complainant_id = required("complainant_id", &request.complainant_id)?;
        let respondent_id = required("respondent_id", &request.respondent_id)?;
        let reason = required("reason", &request.reason)?;

        if complainant_id == respondent_id {
            return Err(ServiceError::Validation(
                "Complainant and respondent must be different users".to_string(),
            ));
        }

        let now = self.clock.now();
        let dispute = Dispute {
            id: Uuid::new_v4(),
            transaction_id,
            complainant_id,
            respondent_id,
            reason,
            status: DisputeStatus::Open,
            escalation_reason: None,
            resolution_note: None,
            created_at: now,
            updated_at: now,
            evidences: Vec::new(),
        };

        let dispute = self.repo.insert(&dispute).await?;

        tracing::info!(
            dispute_id = %dispute.id,
            transaction_id = %dispute.transaction_id,
            complainant = %dispute.complainant_id,
            respondent = %dispute.respondent_id,
            "Dispute opened"
        );

        Ok(dispute)
    }

    /// Get a dispute with its evidences
    pub async fn get_dispute(&self, id: Uuid) -> ServiceResult<Option<Dispute>> {
        self.repo.get(id).await
    }

    /// List disputes, newest first
    pub async fn list_disputes(&self, query: ListDisputesQuery) -> ServiceResult<DisputePage> {
        let (page, page_size) = query.resolve();
        let offset = i64::from(page - 1) * i64::from(page_size);

        let (items, total) = self
            .repo
            .list(query.status, offset, i64::from(page_size))
            .await?;

        Ok(DisputePage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Attach evidence to a dispute that is still OPEN or ESCALATED
    pub async fn submit_evidence(
        &self,
        dispute_id: Uuid,
        request: SubmitEvidenceRequest,
    ) -> ServiceResult<Evidence> {
        request.validate()?;

        let evidence = Evidence {
            id: Uuid::new_v4(),
            dispute_id,
            submitted_by: required("submitted_by", &request.submitted_by)?,
            file_url: required("file_url", &request.file_url)?,
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: self.clock.now(),
        };

        match self.repo.append_evidence(&evidence).await? {
            EvidenceAppend::Appended(evidence) => {
                tracing::info!(
                    dispute_id = %dispute_id,
                    evidence_id = %evidence.id,
                    submitted_by = %evidence.submitted_by,
                    "Evidence submitted"
                );
                Ok(evidence)
            }
            EvidenceAppend::Closed(status) => Err(ServiceError::DisputeClosed {
                id: dispute_id,
                status,
            }),
            EvidenceAppend::NotFound => Err(dispute_not_found(dispute_id)),
        }
    }

    /// Escalate an OPEN dispute. Only the complainant may escalate.
    pub async fn escalate_dispute(
        &self,
        dispute_id: Uuid,
        requesting_user: &str,
        request: EscalateDisputeRequest,
    ) -> ServiceResult<Dispute> {
        let requesting_user = required("requesting_user", requesting_user)?;
        request.validate()?;
        let reason = required("reason", &request.reason)?;

        let dispute = self
            .repo
            .get(dispute_id)
            .await?
            .ok_or_else(|| dispute_not_found(dispute_id))?;

        if dispute.complainant_id != requesting_user {
            return Err(ServiceError::Forbidden(
                "Only the complainant can escalate this dispute".to_string(),
            ));
        }

        self.apply_transition(
            dispute,
            DisputeStatus::Escalated,
            Some(reason),
            None,
        )
        .await
    }

    /// Admin status change and/or resolution note.
    ///
    /// Admins only decide disputes (RESOLVED or REJECTED). Escalation belongs
    /// to the complainant and AUTO_RESOLVED to the sweep.
    pub async fn admin_update_dispute(
        &self,
        dispute_id: Uuid,
        request: AdminUpdateDisputeRequest,
    ) -> ServiceResult<Dispute> {
        request.validate()?;

        if let Some(status) = request.status {
            if !ADMIN_STATUSES.contains(&status) {
                return Err(ServiceError::Validation(format!(
                    "Admins may only set status RESOLVED or REJECTED, got {}",
                    status
                )));
            }
        }

        let note = request
            .resolution_note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        if request.status.is_none() && note.is_none() {
            return Err(ServiceError::Validation(
                "Either status or resolution_note must be provided".to_string(),
            ));
        }

        let dispute = self
            .repo
            .get(dispute_id)
            .await?
            .ok_or_else(|| dispute_not_found(dispute_id))?;

        match request.status {
            Some(next) => self.apply_transition(dispute, next, None, note).await,
            None => {
                let note = note.unwrap_or_default();
                let updated = self
                    .repo
                    .update_note(dispute_id, &note, self.clock.now())
                    .await?
                    .ok_or_else(|| dispute_not_found(dispute_id))?;

                tracing::info!(dispute_id = %dispute_id, "Dispute resolution note updated");
                Ok(updated)
            }
        }
    }

    /// Check the transition table, then compare-and-set on the status just read
    async fn apply_transition(
        &self,
        dispute: Dispute,
        next: DisputeStatus,
        escalation_reason: Option<String>,
        resolution_note: Option<String>,
    ) -> ServiceResult<Dispute> {
        let from = dispute.status;
        if !can_transition(from, next) {
            return Err(ServiceError::IllegalTransition { from, to: next });
        }

        let change = StatusChange {
            expected: from,
            next,
            escalation_reason,
            resolution_note,
            at: self.clock.now(),
        };

        let updated = self.repo.transition(dispute.id, change).await?.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "Dispute {} was modified concurrently",
                dispute.id
            ))
        })?;

        tracing::info!(
            dispute_id = %updated.id,
            from = %from,
            to = %updated.status,
            "Dispute status changed"
        );

        Ok(updated)
    }

    /// Auto-resolve every OPEN dispute whose respondent stayed silent past the
    /// grace window. Returns how many disputes this call moved to AUTO_RESOLVED.
    ///
    /// Overlapping calls do not run concurrently: a call that finds a sweep in
    /// progress returns 0 immediately. Per-dispute write failures are skipped;
    /// if every attempted write failed, the last error is returned.
    pub async fn auto_resolve_sweep(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            tracing::debug!("Auto-resolve sweep already running, skipping");
            return Ok(0);
        };

        let open = self.repo.find_open().await?;
        let cutoff = now - Duration::days(self.auto_resolve_days);
        let note = format!(
            "Auto-resolved: respondent submitted no evidence within {} days",
            self.auto_resolve_days
        );

        let mut resolved = 0;
        let mut failed = 0;
        let mut last_error = None;
        for dispute in open {
            if !should_auto_resolve(&dispute, now, self.auto_resolve_days) {
                continue;
            }

            // The repository re-checks the whole rule at write time
            match self
                .repo
                .auto_resolve_if_silent(dispute.id, cutoff, &note, now)
                .await
            {
                Ok(Some(_)) => {
                    resolved += 1;
                    tracing::info!(
                        dispute_id = %dispute.id,
                        respondent = %dispute.respondent_id,
                        "Dispute auto-resolved"
                    );
                }
                Ok(None) => {
                    tracing::debug!(dispute_id = %dispute.id, "Dispute no longer eligible for auto-resolve");
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(dispute_id = %dispute.id, error = %e, "Failed to auto-resolve dispute");
                    last_error = Some(e);
                }
            }
        }

        if failed > 0 {
            tracing::error!(resolved, failed, "Auto-resolve sweep finished with failures");
        } else if resolved > 0 {
            tracing::info!(resolved, "Auto-resolve sweep finished");
        }

        // Nothing went through: surface the failure to the scheduler
        match last_error {
            Some(e) if resolved == 0 => Err(e),
            _ => Ok(resolved),
        }
    }

    /// Sweep using the service clock
    pub async fn auto_resolve_now(&self) -> ServiceResult<usize> {
        self.auto_resolve_sweep(self.clock.now()).await
    }
}

fn required(field: &str, value: &str) -> ServiceResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn dispute_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Dispute {} not found", id))
}
