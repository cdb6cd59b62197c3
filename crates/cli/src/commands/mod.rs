//! CLI command implementations

pub mod alerts;
pub mod fleet;
pub mod ingest;
pub mod systems;
