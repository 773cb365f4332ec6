//! Application state shared by the health endpoint and background jobs

use sqlx::PgPool;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dispute::{
    DisputeRepository, DisputeService, MemoryDisputeRepository, PgDisputeRepository,
};
use crate::fraud::{
    AccountSuspender, AlertRepository, FraudService, LogOnlySuspender, MemoryAlertRepository,
    PgAccountSuspender, PgAlertRepository,
};
use crate::signal_store::{MemorySignalStore, SignalStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub fraud_service: Arc<FraudService>,
    pub dispute_service: Arc<DisputeService>,
    pub signal_store: Arc<MemorySignalStore>,
    /// `None` in in-memory mode
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire services against Postgres when a pool is given, in-memory repositories otherwise
    pub fn new(config: &Config, db_pool: Option<PgPool>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let signal_store = Arc::new(MemorySignalStore::with_clock(clock.clone()));

        let (alerts, disputes, suspender): (
            Arc<dyn AlertRepository>,
            Arc<dyn DisputeRepository>,
            Arc<dyn AccountSuspender>,
        ) = match &db_pool {
            Some(pool) => (
                Arc::new(PgAlertRepository::new(pool.clone())),
                Arc::new(PgDisputeRepository::new(pool.clone())),
                Arc::new(PgAccountSuspender::new(pool.clone())),
            ),
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory repositories");
                (
                    Arc::new(MemoryAlertRepository::new()),
                    Arc::new(MemoryDisputeRepository::new()),
                    Arc::new(LogOnlySuspender),
                )
            }
        };

        let store: Arc<dyn SignalStore> = signal_store.clone();
        let fraud_service = Arc::new(FraudService::new(
            store,
            alerts,
            suspender,
            clock.clone(),
            &config.risk,
        ));
        let dispute_service = Arc::new(DisputeService::new(disputes, clock, &config.dispute));

        Self {
            fraud_service,
            dispute_service,
            signal_store,
            db_pool,
        }
    }
}
