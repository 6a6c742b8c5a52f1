// Pipeline processing: mapping, normalization, validation, and deduplication

pub mod batch;
pub mod dedupe;
pub mod mapper;
pub mod normalize;
pub mod quality_gate;

pub use batch::{BatchProcessor, BatchResult, PreparedBatch};
