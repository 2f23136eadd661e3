pub mod cache;
pub mod classifier;
pub mod extractor;
