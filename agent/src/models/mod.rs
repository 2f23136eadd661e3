//! Persisted data models

pub mod connector;
pub mod deployment;
