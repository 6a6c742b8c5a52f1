use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{IngestError, Result};
use crate::types::{SourceDescriptor, SourceInput};

/// Lifecycle of one file within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProgressStatus::Pending),
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            "failed" => Ok(ProgressStatus::Failed),
            other => Err(format!("unknown progress status '{}'", other)),
        }
    }
}

/// Durable checkpoint for one `(run_id, filename)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub run_id: String,
    pub filename: String,
    /// Content hash of the source when the checkpoint was opened
    pub fingerprint: String,
    pub status: ProgressStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    /// Last committed source row; never decreases within a run
    pub watermark_row: usize,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ImportProgress {
    pub fn new(run_id: &str, filename: &str, fingerprint: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            filename: filename.to_string(),
            fingerprint: fingerprint.to_string(),
            status: ProgressStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            watermark_row: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// A checkpoint is resumable when its file is unchanged and its counters agree
    pub fn check(&self, fingerprint: &str) -> Result<()> {
        if self.fingerprint != fingerprint {
            return Err(IngestError::CorruptCheckpoint {
                file: self.filename.clone(),
                reason: "source content changed since the checkpoint was written".into(),
            });
        }
        if self.total_rows > 0 && self.processed_rows > self.total_rows {
            return Err(IngestError::CorruptCheckpoint {
                file: self.filename.clone(),
                reason: format!(
                    "processed {} rows of only {}",
                    self.processed_rows, self.total_rows
                ),
            });
        }
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }

    /// Move the watermark forward; smaller rows are ignored
    pub fn advance(&mut self, row: usize) {
        if row > self.watermark_row {
            self.watermark_row = row;
        }
        self.updated_at = Utc::now();
    }
}

/// Watermark update applied in the same transaction as a record's merge
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub run_id: String,
    pub filename: String,
    pub row: usize,
}

/// SHA-256 over the source content, used to detect a changed file on resume
pub fn fingerprint(descriptor: &SourceDescriptor) -> Result<String> {
    let mut hasher = Sha256::new();
    match &descriptor.input {
        SourceInput::Path(path) => {
            let mut file = std::fs::File::open(path)?;
            std::io::copy(&mut file, &mut hasher)?;
        }
        SourceInput::Bytes { data, .. } => hasher.update(data),
        SourceInput::Rows { headers, rows, .. } => {
            hasher.update(serde_json::to_vec(headers)?);
            hasher.update(serde_json::to_vec(rows)?);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SupplierRef;

    #[test]
    fn test_watermark_never_moves_back() {
        let mut progress = ImportProgress::new("run-1", "a.csv", "abc");
        progress.advance(51);
        progress.advance(12);
        assert_eq!(progress.watermark_row, 51);
    }

    #[test]
    fn test_changed_fingerprint_is_corrupt() {
        let progress = ImportProgress::new("run-1", "a.csv", "abc");
        assert!(progress.check("abc").is_ok());
        assert!(matches!(
            progress.check("def"),
            Err(IngestError::CorruptCheckpoint { .. })
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = SourceDescriptor {
            input: SourceInput::Bytes {
                name: "a.csv".into(),
                data: b"SKU,Name\nA1,Amp\n".to_vec(),
            },
            format: None,
            supplier: SupplierRef::new("s"),
            mapping_override: Default::default(),
        };
        let mut b = a.clone();
        b.input = SourceInput::Bytes {
            name: "a.csv".into(),
            data: b"SKU,Name\nA1,Amplifier\n".to_vec(),
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&a).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            ProgressStatus::Pending,
            ProgressStatus::InProgress,
            ProgressStatus::Completed,
            ProgressStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ProgressStatus>().unwrap(), status);
        }
        assert!("done".parse::<ProgressStatus>().is_err());
    }
}
