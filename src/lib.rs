//! FraudWatch
//!
//! Fraud scoring for inbound actions and a dispute lifecycle with
//! time-based auto-resolution.

pub mod clock;
pub mod config;
pub mod db;
pub mod dispute;
pub mod error;
pub mod fraud;
pub mod health;
pub mod signal_store;
pub mod state;
