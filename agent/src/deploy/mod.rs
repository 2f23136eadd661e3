//! Deployment pipeline

pub mod fsm;
pub mod lease;
pub mod orchestrator;
pub mod version;
