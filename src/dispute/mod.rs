//! Dispute domain module
//!
//! Contains the status model, the transition table, persistence and the
//! service that enforces both.

mod model;
mod repository;
mod service;
mod state_machine;
pub mod sweeper;

pub use model::*;
pub use repository::{
    DisputeRepository, EvidenceAppend, MemoryDisputeRepository, PgDisputeRepository, StatusChange,
};
pub use service::DisputeService;
pub use state_machine::{can_transition, should_auto_resolve};
