//! Fraud service layer - risk evaluation, alert ledger and blacklist administration

use std::sync::Arc;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::aggregator::RiskAggregator;
use super::detectors::IP_BLACKLIST_KEY;
use super::model::{
    AlertPage, AlertStatus, FraudAlert, ListAlertsQuery, ReviewAlertRequest, RiskEvaluation,
    RiskInput,
};
use super::repository::AlertRepository;
use super::suspension::AccountSuspender;
use crate::clock::Clock;
use crate::config::RiskSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::signal_store::SignalStore;

/// Fraud service: the only writer of the alert ledger
pub struct FraudService {
    aggregator: RiskAggregator,
    store: Arc<dyn SignalStore>,
    alerts: Arc<dyn AlertRepository>,
    suspender: Arc<dyn AccountSuspender>,
    clock: Arc<dyn Clock>,
    flag_threshold: i32,
    suspend_threshold: i32,
    background: TaskTracker,
}

impl FraudService {
    /// Create new fraud service instance
    pub fn new(
        store: Arc<dyn SignalStore>,
        alerts: Arc<dyn AlertRepository>,
        suspender: Arc<dyn AccountSuspender>,
        clock: Arc<dyn Clock>,
        settings: &RiskSettings,
    ) -> Self {
        Self {
            aggregator: RiskAggregator::new(store.clone(), settings),
            store,
            alerts,
            suspender,
            clock,
            flag_threshold: i32::from(settings.flag_threshold),
            suspend_threshold: i32::from(settings.suspend_threshold),
            background: TaskTracker::new(),
        }
    }

    /// Score an inbound action, persist an alert when flagged and dispatch suspension for high risk.
    ///
    /// Suspension runs as a detached task after the alert is stored; its
    /// outcome is only logged and never reaches the caller.
    pub async fn evaluate_risk(&self, input: RiskInput) -> ServiceResult<RiskEvaluation> {
        let assessment = self.aggregator.assess(&input).await;
        let risk_score = assessment.risk_score;

        tracing::debug!(
            actor = ?input.actor(),
            risk_score,
            reason = %assessment.reason,
            "Risk evaluated"
        );

        if risk_score < self.flag_threshold {
            return Ok(RiskEvaluation {
                flagged: false,
                risk_score,
                reason: assessment.reason,
                alert_id: None,
                suspension_requested: false,
                signals: assessment.signals,
            });
        }

        let high_risk = risk_score >= self.suspend_threshold;
        let status = if high_risk {
            AlertStatus::Suspended
        } else {
            AlertStatus::Pending
        };

        let alert = FraudAlert {
            id: Uuid::new_v4(),
            actor_id: input.actor().map(str::to_string),
            action_id: input.action().map(str::to_string),
            network_address: input.network_address().map(str::to_string),
            device_fingerprint: input.fingerprint().map(str::to_string),
            risk_score,
            reason: assessment.reason.clone(),
            status,
            metadata: input.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            created_at: self.clock.now(),
            reviewed_at: None,
        };
        let alert = self.alerts.insert(&alert).await?;

        tracing::warn!(
            alert_id = %alert.id,
            actor = ?alert.actor_id,
            risk_score,
            reason = %alert.reason,
            "Fraud alert raised"
        );

        let suspension_requested = match (high_risk, input.actor()) {
            (true, Some(actor)) => {
                self.dispatch_suspension(actor.to_string(), alert.id);
                true
            }
            _ => false,
        };

        Ok(RiskEvaluation {
            flagged: true,
            risk_score,
            reason: assessment.reason,
            alert_id: Some(alert.id),
            suspension_requested,
            signals: assessment.signals,
        })
    }

    /// Fire-and-forget suspension; failures are logged only
    fn dispatch_suspension(&self, actor: String, alert_id: Uuid) {
        let suspender = self.suspender.clone();

        self.background.spawn(async move {
            match suspender.suspend_user(&actor).await {
                Ok(()) => {
                    tracing::warn!(actor = %actor, alert_id = %alert_id, "Account suspended");
                }
                Err(e) => {
                    tracing::error!(
                        actor = %actor,
                        alert_id = %alert_id,
                        error = %e,
                        "Account suspension failed"
                    );
                }
            }
        });
    }

    /// List alerts, newest first
    pub async fn list_alerts(&self, query: ListAlertsQuery) -> ServiceResult<AlertPage> {
        let (page, page_size) = query.resolve();
        let offset = i64::from(page - 1) * i64::from(page_size);

        let (items, total) = self.alerts.list(offset, i64::from(page_size)).await?;

        Ok(AlertPage {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn get_alert(&self, id: Uuid) -> ServiceResult<Option<FraudAlert>> {
        self.alerts.get(id).await
    }

    /// Record an admin verdict. Returns `None` for an unknown alert id.
    pub async fn review_alert(
        &self,
        id: Uuid,
        request: ReviewAlertRequest,
    ) -> ServiceResult<Option<FraudAlert>> {
        let status = AlertStatus::from(request.mark);
        let updated = self
            .alerts
            .update_status(id, status, self.clock.now())
            .await?;

        match &updated {
            Some(alert) => {
                tracing::info!(alert_id = %alert.id, status = ?alert.status, "Fraud alert reviewed")
            }
            None => tracing::debug!(alert_id = %id, "Review requested for unknown alert"),
        }

        Ok(updated)
    }

    /// Add an address to the blacklist. Returns whether it was new.
    pub async fn blacklist_ip(&self, ip: &str) -> ServiceResult<bool> {
        let ip = normalize_ip(ip)?;
        let added = self.store.add_member(IP_BLACKLIST_KEY, ip, None).await?;
        if added {
            tracing::info!(ip = %ip, "Address blacklisted");
        }
        Ok(added)
    }

    /// Remove an address from the blacklist. Returns whether it was present.
    pub async fn unblacklist_ip(&self, ip: &str) -> ServiceResult<bool> {
        let ip = normalize_ip(ip)?;
        let removed = self.store.remove_member(IP_BLACKLIST_KEY, ip).await?;
        if removed {
            tracing::info!(ip = %ip, "Address removed from blacklist");
        }
        Ok(removed)
    }

    /// Seed the blacklist. Returns how many addresses were new.
    pub async fn seed_blacklist(&self, ips: &[String]) -> ServiceResult<usize> {
        let mut added = 0;
        for ip in ips {
            if self.blacklist_ip(ip).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Wait for every suspension dispatched so far, then keep accepting new ones
    pub async fn wait_for_background_tasks(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Drain in-flight suspensions before exit
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
        tracing::info!("Fraud service background tasks drained");
    }
}

fn normalize_ip(ip: &str) -> ServiceResult<&str> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(ServiceError::Validation(
            "Network address must not be empty".to_string(),
        ));
    }
    Ok(ip)
}
