//! Memwatch server components
//!
//! The ingestion feed listener, the HTTP query boundary and the periodic
//! alert evaluation loop, wired together by the `memwatch-server` binary.

pub mod api;
pub mod config;
pub mod evaluator;
pub mod ingest;
