// Data processing pipeline: ingestion, processing, merge, and storage

pub mod ingestion;
pub mod merge;
pub mod orchestrator;
pub mod processing;
pub mod storage;

// Re-export key types from each stage
pub use merge::MergeEngine;
pub use orchestrator::{FileReport, FileStatus, Orchestrator, RunSummary};
