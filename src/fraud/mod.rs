//! Fraud domain module
//!
//! Contains detectors, the risk aggregator, the alert ledger and the service
//! that ties them together.

mod aggregator;
pub mod detectors;
mod model;
mod repository;
mod service;
mod suspension;

pub use aggregator::{RiskAggregator, RiskWeights};
pub use model::*;
pub use repository::{AlertRepository, MemoryAlertRepository, PgAlertRepository};
pub use service::FraudService;
pub use suspension::{AccountSuspender, LogOnlySuspender, PgAccountSuspender};
