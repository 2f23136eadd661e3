//! mepbot library
//!
//! Chat-driven staging integration: trigger ingestion, branch extraction,
//! git integration, release tag calculation and the HTTP control surface.

pub mod app;
pub mod chat;
pub mod deploy;
pub mod errors;
pub mod extract;
pub mod filesys;
pub mod git;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
