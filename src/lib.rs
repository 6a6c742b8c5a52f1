pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::{IngestError, Result};
pub use pipeline::processing::quality_gate::render_report;
pub use pipeline::storage::{InMemoryStorage, SqliteStorage, Storage};
pub use pipeline::{Orchestrator, RunSummary};
pub use types::{SourceDescriptor, SupplierRef};
