//! Fraud alert persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{AlertStatus, FraudAlert};
use crate::error::ServiceResult;

/// Storage for fraud alerts. Alerts are never deleted here.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: &FraudAlert) -> ServiceResult<FraudAlert>;

    async fn get(&self, id: Uuid) -> ServiceResult<Option<FraudAlert>>;

    /// Newest first, plus the total number of alerts
    async fn list(&self, offset: i64, limit: i64) -> ServiceResult<(Vec<FraudAlert>, i64)>;

    /// Returns `None` when no alert has this id
    async fn update_status(
        &self,
        id: Uuid,
        status: AlertStatus,
        reviewed_at: DateTime<Utc>,
    ) -> ServiceResult<Option<FraudAlert>>;
}

/// In-memory alert ledger for tests and local runs
#[derive(Clone, Default)]
pub struct MemoryAlertRepository {
    alerts: Arc<RwLock<Vec<FraudAlert>>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, alert: &FraudAlert) -> ServiceResult<FraudAlert> {
        let mut alerts = self.alerts.write().await;
        alerts.push(alert.clone());
        Ok(alert.clone())
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Option<FraudAlert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> ServiceResult<(Vec<FraudAlert>, i64)> {
        let alerts = self.alerts.read().await;

        // Latest insert first among equal timestamps
        let mut ordered: Vec<&FraudAlert> = alerts.iter().rev().collect();
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let items = ordered
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((items, alerts.len() as i64))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AlertStatus,
        reviewed_at: DateTime<Utc>,
    ) -> ServiceResult<Option<FraudAlert>> {
        let mut alerts = self.alerts.write().await;

        Ok(alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            alert.status = status;
            alert.reviewed_at = Some(reviewed_at);
            alert.clone()
        }))
    }
}

/// PostgreSQL alert ledger
#[derive(Clone)]
pub struct PgAlertRepository {
    db_pool: PgPool,
}

impl PgAlertRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn insert(&self, alert: &FraudAlert) -> ServiceResult<FraudAlert> {
        let stored = sqlx::query_as::<_, FraudAlert>(
            r#"
            INSERT INTO fraud_alerts (
                id, actor_id, action_id, network_address, device_fingerprint,
                risk_score, reason, status, metadata, created_at, reviewed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(alert.id)
        .bind(&alert.actor_id)
        .bind(&alert.action_id)
        .bind(&alert.network_address)
        .bind(&alert.device_fingerprint)
        .bind(alert.risk_score)
        .bind(&alert.reason)
        .bind(alert.status)
        .bind(&alert.metadata)
        .bind(alert.created_at)
        .bind(alert.reviewed_at)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> ServiceResult<Option<FraudAlert>> {
        let alert = sqlx::query_as::<_, FraudAlert>("SELECT * FROM fraud_alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(alert)
    }

    async fn list(&self, offset: i64, limit: i64) -> ServiceResult<(Vec<FraudAlert>, i64)> {
        let items = sqlx::query_as::<_, FraudAlert>(
            r#"
            SELECT * FROM fraud_alerts
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fraud_alerts")
            .fetch_one(&self.db_pool)
            .await?;

        Ok((items, total))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AlertStatus,
        reviewed_at: DateTime<Utc>,
    ) -> ServiceResult<Option<FraudAlert>> {
        let alert = sqlx::query_as::<_, FraudAlert>(
            r#"
            UPDATE fraud_alerts
            SET status = $1, reviewed_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(reviewed_at)
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert_at(created_at: DateTime<Utc>) -> FraudAlert {
        FraudAlert {
            id: Uuid::new_v4(),
            actor_id: Some("u1".to_string()),
            action_id: None,
            network_address: None,
            device_fingerprint: None,
            risk_score: 30,
            reason: "velocity:40/min;duplicate:insufficient;ipfp:ok".to_string(),
            status: AlertStatus::Pending,
            metadata: serde_json::json!({}),
            created_at,
            reviewed_at: None,
        }
    }

    #[tokio::test]
    async fn test_memory_list_newest_first_with_paging() {
        let repo = MemoryAlertRepository::new();
        let base = Utc::now();

        let oldest = repo.insert(&alert_at(base)).await.unwrap();
        let middle = repo.insert(&alert_at(base + Duration::seconds(1))).await.unwrap();
        let newest = repo.insert(&alert_at(base + Duration::seconds(2))).await.unwrap();

        let (page, total) = repo.list(0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![newest.id, middle.id]
        );

        let (page, _) = repo.list(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, oldest.id);
    }

    #[tokio::test]
    async fn test_memory_update_status() {
        let repo = MemoryAlertRepository::new();
        let alert = repo.insert(&alert_at(Utc::now())).await.unwrap();
        let now = Utc::now();

        let updated = repo
            .update_status(alert.id, AlertStatus::Safe, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Safe);
        assert_eq!(updated.reviewed_at, Some(now));

        let missing = repo
            .update_status(Uuid::new_v4(), AlertStatus::Safe, now)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
