//! Application layer containing the reconciliation logic.
//!
//! `ReconciliationEngine` applies canonical payment events to the order
//! aggregate through conditional store writes. `Ingestor` turns engine results
//! into provider acknowledgments, and `RetryWorker` drains secondary effects
//! that failed after their primary transition committed.

pub mod config;
pub mod engine;
pub mod ingest;
pub mod worker;
