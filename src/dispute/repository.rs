//! Dispute and evidence persistence
//!
//! Status writes are compare-and-set on the expected current status, so two
//! writers racing on the same dispute cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{Dispute, DisputeStatus, Evidence};
use crate::error::ServiceResult;

/// A guarded status change
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Status the dispute must still have for the write to apply
    pub expected: DisputeStatus,
    pub next: DisputeStatus,
    /// `None` keeps the stored value
    pub escalation_reason: Option<String>,
    /// `None` keeps the stored value
    pub resolution_note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Outcome of an evidence append
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceAppend {
    Appended(Evidence),
    /// The dispute exists but no longer accepts evidence
    Closed(DisputeStatus),
    NotFound,
}

/// Storage for disputes and their evidences
#[async_trait]
pub trait DisputeRepository: Send + Sync {
    async fn insert(&self, dispute: &Dispute) -> ServiceResult<Dispute>;

    /// Dispute with its evidences, oldest evidence first
    async fn get(&self, id: Uuid) -> ServiceResult<Option<Dispute>>;

    /// Newest first, without evidences, plus the total matching count
    async fn list(
        &self,
        status: Option<DisputeStatus>,
        offset: i64,
        limit: i64,
    ) -> ServiceResult<(Vec<Dispute>, i64)>;

    /// Every OPEN dispute with its evidences
    async fn find_open(&self) -> ServiceResult<Vec<Dispute>>;

    /// Apply `change` only if the dispute still has `change.expected`.
    /// Returns `None` when the dispute is missing or its status moved on.
    async fn transition(&self, id: Uuid, change: StatusChange) -> ServiceResult<Option<Dispute>>;

    /// Move the dispute to AUTO_RESOLVED if, at the moment of the write, it is
    /// still OPEN, was created at or before `cutoff` and holds no evidence from
    /// the respondent. Returns `None` when any of those no longer holds.
    async fn auto_resolve_if_silent(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>>;

    async fn update_note(
        &self,
        id: Uuid,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>>;

    /// Append evidence atomically with respect to the dispute's status
    async fn append_evidence(&self, evidence: &Evidence) -> ServiceResult<EvidenceAppend>;
}

/// In-memory dispute table for tests and local runs
#[derive(Clone, Default)]
pub struct MemoryDisputeRepository {
    disputes: Arc<RwLock<HashMap<Uuid, Dispute>>>,
}

impl MemoryDisputeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisputeRepository for MemoryDisputeRepository {
    async fn insert(&self, dispute: &Dispute) -> ServiceResult<Dispute> {
        let mut disputes = self.disputes.write().await;
        disputes.insert(dispute.id, dispute.clone());
        Ok(dispute.clone())
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Option<Dispute>> {
        let disputes = self.disputes.read().await;
        Ok(disputes.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<DisputeStatus>,
        offset: i64,
        limit: i64,
    ) -> ServiceResult<(Vec<Dispute>, i64)> {
        let disputes = self.disputes.read().await;

        let mut matching: Vec<&Dispute> = disputes
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|d| Dispute {
                evidences: Vec::new(),
                ..d.clone()
            })
            .collect();

        Ok((items, total))
    }

    async fn find_open(&self) -> ServiceResult<Vec<Dispute>> {
        let disputes = self.disputes.read().await;
        let mut open: Vec<Dispute> = disputes
            .values()
            .filter(|d| d.status == DisputeStatus::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> ServiceResult<Option<Dispute>> {
        let mut disputes = self.disputes.write().await;

        let Some(dispute) = disputes.get_mut(&id) else {
            return Ok(None);
        };
        if dispute.status != change.expected {
            return Ok(None);
        }

        dispute.status = change.next;
        if let Some(reason) = change.escalation_reason {
            dispute.escalation_reason = Some(reason);
        }
        if let Some(note) = change.resolution_note {
            dispute.resolution_note = Some(note);
        }
        dispute.updated_at = change.at;

        Ok(Some(dispute.clone()))
    }

    async fn auto_resolve_if_silent(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>> {
        let mut disputes = self.disputes.write().await;

        let Some(dispute) = disputes.get_mut(&id) else {
            return Ok(None);
        };
        if dispute.status != DisputeStatus::Open
            || dispute.created_at > cutoff
            || dispute.respondent_has_evidence()
        {
            return Ok(None);
        }

        dispute.status = DisputeStatus::AutoResolved;
        dispute.resolution_note = Some(resolution_note.to_string());
        dispute.updated_at = at;

        Ok(Some(dispute.clone()))
    }

    async fn update_note(
        &self,
        id: Uuid,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>> {
        let mut disputes = self.disputes.write().await;

        Ok(disputes.get_mut(&id).map(|dispute| {
            dispute.resolution_note = Some(resolution_note.to_string());
            dispute.updated_at = at;
            dispute.clone()
        }))
    }

    async fn append_evidence(&self, evidence: &Evidence) -> ServiceResult<EvidenceAppend> {
        let mut disputes = self.disputes.write().await;

        let Some(dispute) = disputes.get_mut(&evidence.dispute_id) else {
            return Ok(EvidenceAppend::NotFound);
        };
        if !dispute.status.accepts_evidence() {
            return Ok(EvidenceAppend::Closed(dispute.status));
        }

        dispute.evidences.push(evidence.clone());
        dispute.updated_at = evidence.created_at;

        Ok(EvidenceAppend::Appended(evidence.clone()))
    }
}

/// PostgreSQL dispute table
#[derive(Clone)]
pub struct PgDisputeRepository {
    db_pool: PgPool,
}

impl PgDisputeRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn load_evidences(&self, dispute_ids: &[Uuid]) -> ServiceResult<Vec<Evidence>> {
        let evidences = sqlx::query_as::<_, Evidence>(
            r#"
            SELECT * FROM dispute_evidences
            WHERE dispute_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(dispute_ids)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(evidences)
    }

    async fn with_evidences(&self, mut dispute: Dispute) -> ServiceResult<Dispute> {
        dispute.evidences = self.load_evidences(&[dispute.id]).await?;
        Ok(dispute)
    }
}

#[async_trait]
impl DisputeRepository for PgDisputeRepository {
    async fn insert(&self, dispute: &Dispute) -> ServiceResult<Dispute> {
        let stored = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (
                id, transaction_id, complainant_id, respondent_id, reason, status,
                escalation_reason, resolution_note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(dispute.id)
        .bind(&dispute.transaction_id)
        .bind(&dispute.complainant_id)
        .bind(&dispute.respondent_id)
        .bind(&dispute.reason)
        .bind(dispute.status)
        .bind(&dispute.escalation_reason)
        .bind(&dispute.resolution_note)
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        match dispute {
            Some(d) => Ok(Some(self.with_evidences(d).await?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        status: Option<DisputeStatus>,
        offset: i64,
        limit: i64,
    ) -> ServiceResult<(Vec<Dispute>, i64)> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM disputes WHERE 1=1");
        if let Some(status) = status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        query_builder.push(" ORDER BY created_at DESC, id ASC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let items = query_builder
            .build_query_as::<Dispute>()
            .fetch_all(&self.db_pool)
            .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM disputes WHERE ($1::dispute_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.db_pool)
        .await?;

        Ok((items, total))
    }

    async fn find_open(&self) -> ServiceResult<Vec<Dispute>> {
        let mut disputes = sqlx::query_as::<_, Dispute>(
            "SELECT * FROM disputes WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(DisputeStatus::Open)
        .fetch_all(&self.db_pool)
        .await?;

        let ids: Vec<Uuid> = disputes.iter().map(|d| d.id).collect();
        let mut by_dispute: HashMap<Uuid, Vec<Evidence>> = HashMap::new();
        for evidence in self.load_evidences(&ids).await? {
            by_dispute
                .entry(evidence.dispute_id)
                .or_default()
                .push(evidence);
        }
        for dispute in &mut disputes {
            dispute.evidences = by_dispute.remove(&dispute.id).unwrap_or_default();
        }

        Ok(disputes)
    }

    async fn transition(&self, id: Uuid, change: StatusChange) -> ServiceResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = $1,
                escalation_reason = COALESCE($2, escalation_reason),
                resolution_note = COALESCE($3, resolution_note),
                updated_at = $4
            WHERE id = $5 AND status = $6
            RETURNING *
            "#,
        )
        .bind(change.next)
        .bind(change.escalation_reason)
        .bind(change.resolution_note)
        .bind(change.at)
        .bind(id)
        .bind(change.expected)
        .fetch_optional(&self.db_pool)
        .await?;

        match dispute {
            Some(d) => Ok(Some(self.with_evidences(d).await?)),
            None => Ok(None),
        }
    }

    async fn auto_resolve_if_silent(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>> {
        let mut tx = self.db_pool.begin().await?;

        // Same row lock as append_evidence, so evidence either lands first and
        // is seen below, or waits until this dispute is closed
        let locked: Option<(DisputeStatus,)> = sqlx::query_as(
            "SELECT status FROM disputes WHERE id = $1 AND created_at <= $2 FOR UPDATE",
        )
        .bind(id)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        if !matches!(locked, Some((DisputeStatus::Open,))) {
            return Ok(None);
        }

        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = $1, resolution_note = $2, updated_at = $3
            WHERE id = $4
              AND status = $5
              AND NOT EXISTS (
                  SELECT 1 FROM dispute_evidences e
                  WHERE e.dispute_id = disputes.id
                    AND e.submitted_by = disputes.respondent_id
              )
            RETURNING *
            "#,
        )
        .bind(DisputeStatus::AutoResolved)
        .bind(resolution_note)
        .bind(at)
        .bind(id)
        .bind(DisputeStatus::Open)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match dispute {
            Some(d) => Ok(Some(self.with_evidences(d).await?)),
            None => Ok(None),
        }
    }

    async fn update_note(
        &self,
        id: Uuid,
        resolution_note: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET resolution_note = $1, updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(resolution_note)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        match dispute {
            Some(d) => Ok(Some(self.with_evidences(d).await?)),
            None => Ok(None),
        }
    }

    async fn append_evidence(&self, evidence: &Evidence) -> ServiceResult<EvidenceAppend> {
        let mut tx = self.db_pool.begin().await?;

        // Lock the dispute row so a concurrent close can't interleave
        let status: Option<(DisputeStatus,)> =
            sqlx::query_as("SELECT status FROM disputes WHERE id = $1 FOR UPDATE")
                .bind(evidence.dispute_id)
                .fetch_optional(&mut *tx)
                .await?;

        let status = match status {
            Some((status,)) => status,
            None => return Ok(EvidenceAppend::NotFound),
        };
        if !status.accepts_evidence() {
            return Ok(EvidenceAppend::Closed(status));
        }

        let stored = sqlx::query_as::<_, Evidence>(
            r#"
            INSERT INTO dispute_evidences (
                id, dispute_id, submitted_by, file_url, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(evidence.id)
        .bind(evidence.dispute_id)
        .bind(&evidence.submitted_by)
        .bind(&evidence.file_url)
        .bind(&evidence.description)
        .bind(evidence.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE disputes SET updated_at = $1 WHERE id = $2")
            .bind(evidence.created_at)
            .bind(evidence.dispute_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(EvidenceAppend::Appended(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_dispute(created_at: DateTime<Utc>) -> Dispute {
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

    fn change(expected: DisputeStatus, next: DisputeStatus) -> StatusChange {
        StatusChange {
            expected,
            next,
            escalation_reason: None,
            resolution_note: Some("done".to_string()),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let repo = MemoryDisputeRepository::new();
        let dispute = repo.insert(&open_dispute(Utc::now())).await.unwrap();

        let first = repo
            .transition(dispute.id, change(DisputeStatus::Open, DisputeStatus::Resolved))
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, DisputeStatus::Resolved);

        // Second writer still expects OPEN and loses
        let second = repo
            .transition(dispute.id, change(DisputeStatus::Open, DisputeStatus::AutoResolved))
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = repo.get(dispute.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DisputeStatus::Resolved);
        assert_eq!(stored.resolution_note.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_append_evidence_respects_status() {
        let repo = MemoryDisputeRepository::new();
        let dispute = repo.insert(&open_dispute(Utc::now())).await.unwrap();

        let evidence = Evidence {
            id: Uuid::new_v4(),
            dispute_id: dispute.id,
            submitted_by: "u2".to_string(),
            file_url: "proof.jpg".to_string(),
            description: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            repo.append_evidence(&evidence).await.unwrap(),
            EvidenceAppend::Appended(_)
        ));

        repo.transition(dispute.id, change(DisputeStatus::Open, DisputeStatus::Rejected))
            .await
            .unwrap();
        assert_eq!(
            repo.append_evidence(&evidence).await.unwrap(),
            EvidenceAppend::Closed(DisputeStatus::Rejected)
        );

        let orphan = Evidence {
            dispute_id: Uuid::new_v4(),
            ..evidence
        };
        assert_eq!(
            repo.append_evidence(&orphan).await.unwrap(),
            EvidenceAppend::NotFound
        );
    }

    #[tokio::test]
    async fn test_auto_resolve_if_silent_rechecks_at_write() {
        let repo = MemoryDisputeRepository::new();
        let created = Utc::now() - Duration::days(4);
        let cutoff = Utc::now() - Duration::days(3);

        let silent = repo.insert(&open_dispute(created)).await.unwrap();
        let answered = repo.insert(&open_dispute(created)).await.unwrap();
        let recent = repo.insert(&open_dispute(Utc::now())).await.unwrap();

        repo.append_evidence(&Evidence {
            id: Uuid::new_v4(),
            dispute_id: answered.id,
            submitted_by: "u2".to_string(),
            file_url: "proof.jpg".to_string(),
            description: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let resolved = repo
            .auto_resolve_if_silent(silent.id, cutoff, "auto", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::AutoResolved);
        assert_eq!(resolved.resolution_note.as_deref(), Some("auto"));

        for id in [answered.id, recent.id, silent.id, Uuid::new_v4()] {
            assert!(repo
                .auto_resolve_if_silent(id, cutoff, "auto", Utc::now())
                .await
                .unwrap()
                .is_none());
        }
        let answered = repo.get(answered.id).await.unwrap().unwrap();
        assert_eq!(answered.status, DisputeStatus::Open);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let repo = MemoryDisputeRepository::new();
        let base = Utc::now();
        for i in 0..5 {
            repo.insert(&open_dispute(base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        let closed = repo.insert(&open_dispute(base)).await.unwrap();
        repo.transition(closed.id, change(DisputeStatus::Open, DisputeStatus::Rejected))
            .await
            .unwrap();

        let (all, total) = repo.list(None, 0, 100).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(all.len(), 6);

        let (open, total) = repo.list(Some(DisputeStatus::Open), 0, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(open.len(), 2);
        assert!(open[0].created_at >= open[1].created_at);

        assert_eq!(repo.find_open().await.unwrap().len(), 5);
    }
}
