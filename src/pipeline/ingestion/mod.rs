// Pipeline ingestion: source reading, header detection and import checkpoints

pub mod header;
pub mod progress;
pub mod reader;

pub use header::HeaderRule;
pub use progress::{fingerprint, Checkpoint, ImportProgress, ProgressStatus};
pub use reader::{open_source, MalformedLine, RowResult, SourceRows};
