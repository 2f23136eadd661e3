//! Wire models for the mepbot HTTP control surface.

pub mod models;
