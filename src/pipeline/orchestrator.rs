use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::metrics;
use crate::pipeline::ingestion::{fingerprint, Checkpoint, ImportProgress, ProgressStatus};
use crate::pipeline::merge::MergeEngine;
use crate::pipeline::processing::batch::{BatchProcessor, BatchResult, PreparedBatch};
use crate::pipeline::processing::quality_gate::{IssueKind, ValidationIssue};
use crate::pipeline::storage::{MergeAction, PriceChange, Storage};
use crate::types::SourceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Completed,
    /// Already completed earlier in this run
    Skipped,
    Failed,
    /// Not started because the run was cancelled
    Cancelled,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Completed => "completed",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
            FileStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one source file within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub source_file: String,
    pub status: FileStatus,
    pub batch: Option<BatchResult>,
    /// First source row merged when a checkpoint was picked up
    pub resumed_from: Option<usize>,
    pub inserted: usize,
    pub updated: usize,
    pub price_changes: usize,
    pub merge_errors: Vec<ValidationIssue>,
    pub error: Option<String>,
}

impl FileReport {
    fn empty(source_file: &str, status: FileStatus) -> Self {
        Self {
            source_file: source_file.to_string(),
            status,
            batch: None,
            resumed_from: None,
            inserted: 0,
            updated: 0,
            price_changes: 0,
            merge_errors: Vec::new(),
            error: None,
        }
    }

    /// A started file that could not finish; `batch` holds the cause as its error
    fn failed(source_file: &str, supplier_id: &str, err: &IngestError) -> Self {
        let mut report = Self::empty(source_file, FileStatus::Failed);
        report.error = Some(err.to_string());
        report.batch = Some(BatchResult::failed(source_file, supplier_id, err.to_string()));
        report
    }
}

/// Aggregate over every file in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub total_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub price_changes: usize,
    pub duplicates: usize,
    /// Every blocking issue of the run: batch errors then merge failures, file by file
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub cancelled: bool,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    fn from_reports(run_id: &str, files: Vec<FileReport>, cancelled: bool) -> Self {
        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            files_processed: 0,
            files_skipped: 0,
            files_failed: 0,
            total_records: 0,
            inserted: 0,
            updated: 0,
            price_changes: 0,
            duplicates: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            cancelled,
            files: Vec::new(),
        };
        for file in &files {
            match file.status {
                FileStatus::Completed => summary.files_processed += 1,
                FileStatus::Skipped => summary.files_skipped += 1,
                FileStatus::Failed => summary.files_failed += 1,
                FileStatus::Cancelled => {}
            }
            summary.inserted += file.inserted;
            summary.updated += file.updated;
            summary.price_changes += file.price_changes;
            if let Some(batch) = &file.batch {
                summary.total_records += batch.total;
                summary.duplicates += batch.duplicates;
                summary.errors.extend(batch.errors.iter().cloned());
                summary.warnings.extend(batch.warnings.iter().cloned());
            }
            summary.errors.extend(file.merge_errors.iter().cloned());
        }
        summary.files = files;
        summary
    }
}

/// Drives a run: files in parallel, records within a file in source order
pub struct Orchestrator {
    config: Config,
    storage: Arc<dyn Storage>,
    processor: Arc<BatchProcessor>,
    engine: MergeEngine,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let processor = Arc::new(BatchProcessor::new(&config)?);
        let engine = MergeEngine::new(
            Arc::clone(&storage),
            config.merge.price_change_tolerance,
            Duration::from_secs(config.merge.merge_timeout_secs),
        );
        Ok(Self {
            config,
            storage,
            processor,
            engine,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling stops new files from starting; in-flight files finish
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(skip(self, sources), fields(files = sources.len()))]
    pub async fn run(&self, run_id: &str, sources: Vec<SourceDescriptor>) -> RunSummary {
        let concurrency = self.config.run.effective_concurrency();
        info!(
            "🚀 Starting run {} over {} files (concurrency {})",
            run_id,
            sources.len(),
            concurrency
        );

        let mut seen = HashSet::new();
        let jobs: Vec<(usize, SourceDescriptor, bool)> = sources
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                let first = seen.insert(d.name());
                (i, d, first)
            })
            .collect();

        let mut reports: Vec<(usize, FileReport)> = stream::iter(jobs)
            .map(|(i, descriptor, first)| async move {
                let report = if first {
                    self.process_file(run_id, descriptor).await
                } else {
                    let name = descriptor.name();
                    warn!("⚠️ {} appears more than once in run {}", name, run_id);
                    FileReport::failed(
                        &name,
                        &descriptor.supplier.supplier_id,
                        &IngestError::Config(format!("duplicate source name {} in one run", name)),
                    )
                };
                (i, report)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        reports.sort_by_key(|(i, _)| *i);

        let summary = RunSummary::from_reports(
            run_id,
            reports.into_iter().map(|(_, r)| r).collect(),
            self.cancel.is_cancelled(),
        );
        info!(
            "✅ Run {} finished: {} processed, {} skipped, {} failed, {} inserted, {} updated, {} price changes",
            run_id,
            summary.files_processed,
            summary.files_skipped,
            summary.files_failed,
            summary.inserted,
            summary.updated,
            summary.price_changes
        );
        summary
    }

    #[instrument(skip(self, descriptor), fields(source = %descriptor.name()))]
    async fn process_file(&self, run_id: &str, descriptor: SourceDescriptor) -> FileReport {
        let started = Instant::now();
        let name = descriptor.name();
        let supplier_id = descriptor.supplier.supplier_id.clone();

        if self.cancel.is_cancelled() {
            info!("⏹️ Run {} cancelled before {} started", run_id, name);
            return FileReport::empty(&name, FileStatus::Cancelled);
        }

        let report = match self.import_file(run_id, &name, descriptor).await {
            Ok(report) => report,
            Err(e) => {
                if e.is_structural() {
                    warn!("❌ {} could not be read: {}", name, e);
                } else {
                    error!("❌ {} failed: {}", name, e);
                }
                self.mark_failed(run_id, &name, &e).await;
                FileReport::failed(&name, &supplier_id, &e)
            }
        };

        if let Some(batch) = &report.batch {
            metrics::record_batch(batch);
        }
        metrics::record_file(report.status.as_str(), started.elapsed());
        report
    }

    async fn import_file(
        &self,
        run_id: &str,
        name: &str,
        descriptor: SourceDescriptor,
    ) -> Result<FileReport> {
        let descriptor = Arc::new(descriptor);
        let for_hash = Arc::clone(&descriptor);
        let digest = tokio::task::spawn_blocking(move || fingerprint(&for_hash)).await??;

        let existing = match self.resumable_progress(run_id, name, &digest).await? {
            Some(progress) if progress.is_completed() => {
                info!("⏭️ {} already completed in run {}, skipping", name, run_id);
                return Ok(FileReport::empty(name, FileStatus::Skipped));
            }
            other => other,
        };

        let batch = self.prepare(Arc::clone(&descriptor)).await?;

        let mut progress =
            existing.unwrap_or_else(|| ImportProgress::new(run_id, name, &digest));
        progress.fingerprint = digest;
        progress.status = ProgressStatus::InProgress;
        progress.total_rows = batch.result.total;
        progress.last_error = None;
        progress.updated_at = chrono::Utc::now();
        if let Err(e) = self.storage.save_progress(&progress).await {
            error!("❌ Could not start checkpoint for {}: {}", name, e);
            let mut report = FileReport::failed(name, &descriptor.supplier.supplier_id, &e);
            report.batch = Some(batch.result);
            return Ok(report);
        }

        let watermark = progress.watermark_row;
        let mut report = FileReport::empty(name, FileStatus::Completed);
        if watermark > 0 {
            report.resumed_from = Some(watermark + 1);
            info!("🔁 Resuming {} at row {}", name, watermark + 1);
        }

        for record in batch.importable().filter(|r| r.source_row > watermark) {
            let checkpoint = Checkpoint {
                run_id: run_id.to_string(),
                filename: name.to_string(),
                row: record.source_row,
            };
            match self
                .engine
                .merge(&descriptor.supplier, record, Some(&checkpoint))
                .await
            {
                Ok(outcome) => {
                    match outcome.action {
                        MergeAction::Inserted => report.inserted += 1,
                        MergeAction::Updated => report.updated += 1,
                    }
                    if matches!(outcome.price_change, PriceChange::Replaced { .. }) {
                        report.price_changes += 1;
                    }
                }
                Err(e) => {
                    warn!("⚠️ Merge failed for row {} of {}: {}", record.source_row, name, e);
                    report.merge_errors.push(
                        ValidationIssue::error(IssueKind::MergeFailed, "sku", e.to_string())
                            .suggest("Re-run the import to retry this record")
                            .at(name, record.source_row),
                    );
                }
            }
        }

        if let Err(e) = self
            .complete_progress(progress, batch.last_row(), batch.result.total)
            .await
        {
            // Merged records stay merged; a rerun resumes from the stored watermark
            error!("❌ Could not record completion of {}: {}", name, e);
            self.mark_failed(run_id, name, &e).await;
            report.status = FileStatus::Failed;
            report.error = Some(e.to_string());
        }

        info!(
            "📦 Imported {}: {} inserted, {} updated, {} price changes, {} merge errors",
            name,
            report.inserted,
            report.updated,
            report.price_changes,
            report.merge_errors.len()
        );
        report.batch = Some(batch.result);
        Ok(report)
    }

    async fn complete_progress(
        &self,
        started: ImportProgress,
        last_row: usize,
        total: usize,
    ) -> Result<()> {
        let stored = self
            .storage
            .get_progress(&started.run_id, &started.filename)
            .await?;
        let mut finished = stored.unwrap_or(started);
        finished.advance(last_row);
        finished.status = ProgressStatus::Completed;
        finished.total_rows = total;
        finished.processed_rows = finished.processed_rows.min(total);
        self.storage.save_progress(&finished).await
    }

    /// Existing checkpoint for this file, or `None` to start fresh
    async fn resumable_progress(
        &self,
        run_id: &str,
        name: &str,
        fingerprint: &str,
    ) -> Result<Option<ImportProgress>> {
        let checked = match self.storage.get_progress(run_id, name).await {
            Ok(Some(progress)) => progress.check(fingerprint).map(|_| Some(progress)),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match checked {
            Err(IngestError::CorruptCheckpoint { reason, .. }) => {
                warn!("⚠️ Discarding checkpoint for {}: {}; reprocessing from the start", name, reason);
                self.storage.delete_progress(run_id, name).await?;
                Ok(None)
            }
            other => other,
        }
    }

    async fn prepare(&self, descriptor: Arc<SourceDescriptor>) -> Result<PreparedBatch> {
        let processor = Arc::clone(&self.processor);
        let secs = self.config.run.file_timeout_secs;
        let name = descriptor.name();
        let task = tokio::task::spawn_blocking(move || processor.prepare(&descriptor));
        let batch = tokio::time::timeout(Duration::from_secs(secs), task)
            .await
            .map_err(|_| IngestError::Timeout {
                what: format!("validation of {}", name),
                secs,
            })???;
        Ok(batch)
    }

    async fn mark_failed(&self, run_id: &str, name: &str, err: &IngestError) {
        let progress = match self.storage.get_progress(run_id, name).await {
            Ok(Some(progress)) => Some(progress),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not read progress for {}: {}", name, e);
                None
            }
        };
        let mut progress = progress.unwrap_or_else(|| ImportProgress::new(run_id, name, ""));
        progress.status = ProgressStatus::Failed;
        progress.last_error = Some(err.to_string());
        progress.updated_at = chrono::Utc::now();
        if let Err(e) = self.storage.save_progress(&progress).await {
            warn!("Could not record failure for {}: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::{
        InMemoryStorage, MergeOutcome, PriceHistoryEntry, SupplierProduct,
    };
    use crate::types::{CanonicalRecord, RawValue, SupplierRef};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    /// In-memory store that refuses to mark any file completed
    struct NoCompletionStorage {
        inner: InMemoryStorage,
    }

    #[async_trait]
    impl Storage for NoCompletionStorage {
        async fn merge_record(
            &self,
            supplier: &SupplierRef,
            record: &CanonicalRecord,
            tolerance: Decimal,
            checkpoint: Option<&Checkpoint>,
        ) -> Result<MergeOutcome> {
            self.inner.merge_record(supplier, record, tolerance, checkpoint).await
        }

        async fn get_product(&self, supplier_id: &str, supplier_sku: &str) -> Result<Option<SupplierProduct>> {
            self.inner.get_product(supplier_id, supplier_sku).await
        }

        async fn list_products(&self, supplier_id: &str) -> Result<Vec<SupplierProduct>> {
            self.inner.list_products(supplier_id).await
        }

        async fn price_history(&self, product_id: Uuid) -> Result<Vec<PriceHistoryEntry>> {
            self.inner.price_history(product_id).await
        }

        async fn get_progress(&self, run_id: &str, filename: &str) -> Result<Option<ImportProgress>> {
            self.inner.get_progress(run_id, filename).await
        }

        async fn save_progress(&self, progress: &ImportProgress) -> Result<()> {
            if progress.status == ProgressStatus::Completed {
                return Err(IngestError::Merge("disk full".into()));
            }
            self.inner.save_progress(progress).await
        }

        async fn list_progress(&self, run_id: &str) -> Result<Vec<ImportProgress>> {
            self.inner.list_progress(run_id).await
        }

        async fn delete_progress(&self, run_id: &str, filename: &str) -> Result<()> {
            self.inner.delete_progress(run_id, filename).await
        }
    }

    fn source(name: &str, rows: &[(&str, &str, &str)]) -> SourceDescriptor {
        SourceDescriptor::from_rows(
            name,
            vec!["SKU".into(), "Product Name".into(), "Cost Price".into()],
            rows.iter()
                .map(|(sku, name, cost)| {
                    vec![RawValue::text(*sku), RawValue::text(*name), RawValue::text(*cost)]
                })
                .collect(),
            SupplierRef::new("acme"),
        )
    }

    #[tokio::test]
    async fn test_run_merges_and_marks_completed() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let orchestrator = Orchestrator::new(Config::default(), Arc::clone(&storage)).unwrap();

        let summary = orchestrator
            .run(
                "run-1",
                vec![source("a", &[("A1", "Amplifier", "100"), ("A2", "Cable", "")])],
            )
            .await;
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.total_records, 2);

        let progress = storage.get_progress("run-1", "a").await.unwrap().unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(progress.watermark_row, 3);

        let again = orchestrator
            .run("run-1", vec![source("a", &[("A1", "Amplifier", "100"), ("A2", "Cable", "")])])
            .await;
        assert_eq!(again.files_skipped, 1);
        assert_eq!(again.inserted, 0);
    }

    #[tokio::test]
    async fn test_oversized_price_does_not_sink_the_file() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let mut config = Config::default();
        config.validation.price_multiplier = rust_decimal_macros::dec!(1.15);
        let orchestrator = Orchestrator::new(config, Arc::clone(&storage)).unwrap();

        let summary = orchestrator
            .run(
                "run-1",
                vec![source(
                    "a",
                    &[("A1", "Amp", "100"), ("B2", "Typo", "79228162514264337593543950335")],
                )],
            )
            .await;
        assert_eq!(summary.files[0].status, FileStatus::Completed);
        assert_eq!(summary.inserted, 1);
        assert!(summary.files[0].batch.is_some());
        assert!(summary
            .errors
            .iter()
            .any(|i| i.kind == IssueKind::PriceUnparseable && i.row == Some(3)));
        assert!(storage.get_product("acme", "A1").await.unwrap().is_some());
        assert!(storage.get_product("acme", "B2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_file_still_gets_a_batch_result() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let orchestrator = Orchestrator::new(Config::default(), storage).unwrap();
        let empty = SourceDescriptor::from_rows("blank", vec!["".into()], vec![], SupplierRef::new("acme"));

        let summary = orchestrator.run("run-1", vec![empty]).await;
        let report = &summary.files[0];
        assert_eq!(report.status, FileStatus::Failed);
        let batch = report.batch.as_ref().unwrap();
        assert_eq!(batch.total, 0);
        assert_eq!(batch.errors[0].kind, IssueKind::SourceFailed);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_keeps_merge_counts() {
        let inner = InMemoryStorage::new();
        let storage: Arc<dyn Storage> = Arc::new(NoCompletionStorage { inner });
        let orchestrator = Orchestrator::new(Config::default(), Arc::clone(&storage)).unwrap();

        let summary = orchestrator
            .run("run-1", vec![source("a", &[("A1", "Amp", "100"), ("A2", "Cable", "20")])])
            .await;
        let report = &summary.files[0];
        assert_eq!(report.status, FileStatus::Failed);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.batch.as_ref().unwrap().total, 2);
        assert!(report.error.as_deref().unwrap_or_default().contains("disk full"));

        let progress = storage.get_progress("run-1", "a").await.unwrap().unwrap();
        assert_eq!(progress.status, ProgressStatus::Failed);
        assert_eq!(progress.watermark_row, 3);
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let orchestrator = Orchestrator::new(Config::default(), Arc::clone(&storage)).unwrap();
        orchestrator.cancellation_token().cancel();

        let summary = orchestrator
            .run("run-1", vec![source("a", &[("A1", "Amplifier", "100")])])
            .await;
        assert!(summary.cancelled);
        assert_eq!(summary.files[0].status, FileStatus::Cancelled);
        assert!(storage.list_products("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_source_names_fail_the_repeat() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let orchestrator = Orchestrator::new(Config::default(), storage).unwrap();
        let summary = orchestrator
            .run(
                "run-1",
                vec![
                    source("a", &[("A1", "Amplifier", "100")]),
                    source("a", &[("B1", "Speaker", "100")]),
                ],
            )
            .await;
        assert_eq!(summary.files[0].status, FileStatus::Completed);
        assert_eq!(summary.files[1].status, FileStatus::Failed);
        assert!(summary.files[1].batch.is_some());
    }
}
