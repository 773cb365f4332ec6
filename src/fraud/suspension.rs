//! Account suspension collaborator
//!
//! Suspension is triggered by high-risk evaluations. It runs detached from the
//! evaluation call, so implementations may fail without affecting the caller.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{ServiceError, ServiceResult};

/// External action that suspends an account
#[async_trait]
pub trait AccountSuspender: Send + Sync {
    async fn suspend_user(&self, actor_id: &str) -> ServiceResult<()>;
}

/// Suspender for deployments without a user table: records the decision in the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlySuspender;

#[async_trait]
impl AccountSuspender for LogOnlySuspender {
    async fn suspend_user(&self, actor_id: &str) -> ServiceResult<()> {
        tracing::warn!(actor = %actor_id, "Suspension requested (log-only suspender)");
        Ok(())
    }
}

/// Flags the account in the shared `users` table
#[derive(Clone)]
pub struct PgAccountSuspender {
    db_pool: PgPool,
}

impl PgAccountSuspender {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AccountSuspender for PgAccountSuspender {
    async fn suspend_user(&self, actor_id: &str) -> ServiceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET suspended = TRUE, updated_at = NOW()
            WHERE id::text = $1
            "#,
        )
        .bind(actor_id)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", actor_id)));
        }

        Ok(())
    }
}
