pub mod connectors;
pub mod deployments;
pub mod document;
pub mod layout;
pub mod settings;
