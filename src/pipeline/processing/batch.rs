use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::pipeline::ingestion::open_source;
use crate::pipeline::processing::dedupe::{DuplicateDetector, DuplicateRegistry, Occurrence};
use crate::pipeline::processing::mapper::{ColumnMapping, FieldMapper};
use crate::pipeline::processing::normalize::ValueNormalizer;
use crate::pipeline::processing::quality_gate::{
    quality_score, IssueKind, RecordStatus, RecordValidator, Severity, ValidationIssue,
    ValidationOutcome, ValidationStats,
};
use crate::types::{CanonicalRecord, SourceDescriptor};

/// Aggregate validation result for one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub source_file: String,
    pub supplier_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub with_warnings: usize,
    pub duplicates: usize,
    /// Source lines skipped by the reader
    pub malformed_lines: usize,
    pub quality_score: u8,
    pub stats: ValidationStats,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl BatchResult {
    /// Result for a file that produced no records; the cause is its only error
    pub fn failed(source_file: &str, supplier_id: &str, cause: impl Into<String>) -> Self {
        let issue = ValidationIssue::new(IssueKind::SourceFailed, Severity::Error, None, cause)
            .suggest("Check that the file opens and has a recognizable header row")
            .in_file(source_file);
        Self {
            source_file: source_file.to_string(),
            supplier_id: supplier_id.to_string(),
            analyzed_at: Utc::now(),
            total: 0,
            valid: 0,
            invalid: 0,
            with_warnings: 0,
            duplicates: 0,
            malformed_lines: 0,
            quality_score: 0,
            stats: ValidationStats::default(),
            errors: vec![issue],
            warnings: Vec::new(),
        }
    }
}

/// A record with its validation outcome
#[derive(Debug, Clone)]
pub struct PreparedRecord {
    pub record: CanonicalRecord,
    pub outcome: ValidationOutcome,
    /// Passed validation and the duplicate policy, and has a SKU to merge on
    pub importable: bool,
}

/// Everything validation produced for one file, ready for the merge stage
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub result: BatchResult,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub records: Vec<PreparedRecord>,
}

impl PreparedBatch {
    pub fn importable(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records
            .iter()
            .filter(|r| r.importable)
            .map(|r| &r.record)
    }

    /// Highest source row seen, used as the checkpoint's total
    pub fn last_row(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.record.source_row)
            .max()
            .unwrap_or(0)
    }
}

/// Reads, maps, normalizes, validates and deduplicates one source
pub struct BatchProcessor {
    reader: ReaderConfig,
    mapper: FieldMapper,
    normalizer: ValueNormalizer,
    validator: RecordValidator,
    detector: DuplicateDetector,
}

impl BatchProcessor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            reader: config.reader.clone(),
            mapper: FieldMapper::new(),
            normalizer: ValueNormalizer::new(&config.validation),
            validator: RecordValidator::new(config.validation.clone())?,
            detector: DuplicateDetector::new(config.validation.duplicate_handling),
        })
    }

    /// Run every pre-merge stage over a source.
    ///
    /// Structural problems are returned as errors; everything row-level ends up in the result.
    #[instrument(skip(self, descriptor), fields(source = %descriptor.name()))]
    pub fn prepare(&self, descriptor: &SourceDescriptor) -> Result<PreparedBatch> {
        let rows = open_source(descriptor, &self.reader)?;
        let source_file = rows.source_file().to_string();
        let headers = rows.headers().to_vec();
        let mapping = self.mapper.map_headers(&headers, &descriptor.mapping_override);
        debug!("Column mapping for {}: {:?}", source_file, mapping.columns);

        let mut issues: Vec<ValidationIssue> = mapping
            .unresolved_overrides
            .iter()
            .map(|(field, label)| {
                ValidationIssue::warning(
                    IssueKind::MappingOverrideUnresolved,
                    field.as_str(),
                    format!("Mapping override column '{}' not found in header", label),
                )
                .suggest(format!("Available columns: {}", headers.join(", ")))
                .in_file(&source_file)
            })
            .collect();

        let mut registry = DuplicateRegistry::new();
        let mut records: Vec<PreparedRecord> = Vec::new();
        let mut malformed_lines = 0usize;

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(malformed) => {
                    malformed_lines += 1;
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::MalformedLine,
                            Severity::Warning,
                            None,
                            format!("Skipped malformed line: {}", malformed.reason),
                        )
                        .at(&malformed.source_file, malformed.row_number),
                    );
                    continue;
                }
            };

            let mapped = self.mapper.apply(&mapping, &row);
            let normalized = self.normalizer.normalize(&mapped);
            let mut record = normalized.record;
            let mut record_issues = normalized.issues;
            record_issues.extend(self.validator.validate(&mut record));

            if let Some(sku) = &record.supplier_sku {
                registry.register(
                    sku,
                    Occurrence {
                        index: records.len(),
                        row: record.source_row,
                        name: record.name.clone(),
                    },
                );
            }

            issues.extend(record_issues.iter().cloned());
            records.push(PreparedRecord {
                record,
                outcome: ValidationOutcome::from_issues(record_issues),
                importable: false,
            });
        }

        let resolution = self.detector.resolve(&registry, &source_file);
        for index in &resolution.invalidated {
            if let Some(prepared) = records.get_mut(*index) {
                let row = prepared.record.source_row;
                prepared.outcome.issues.extend(
                    resolution
                        .issues
                        .iter()
                        .filter(|i| i.is_error() && i.related_rows.contains(&row))
                        .cloned(),
                );
                prepared.outcome.status = RecordStatus::Invalid;
            }
        }
        for (index, prepared) in records.iter_mut().enumerate() {
            prepared.importable = prepared.outcome.status.is_valid()
                && !resolution.excluded.contains(&index)
                && prepared.record.supplier_sku.is_some();
        }
        issues.extend(resolution.issues);

        let total = records.len();
        let invalid = records
            .iter()
            .filter(|r| r.outcome.status == RecordStatus::Invalid)
            .count();
        let with_warnings = records
            .iter()
            .filter(|r| r.outcome.status == RecordStatus::ValidWithWarnings)
            .count();
        let (errors, warnings): (Vec<_>, Vec<_>) = issues.into_iter().partition(|i| i.is_error());

        let result = BatchResult {
            source_file: source_file.clone(),
            supplier_id: descriptor.supplier.supplier_id.clone(),
            analyzed_at: Utc::now(),
            total,
            valid: total - invalid,
            invalid,
            with_warnings,
            duplicates: resolution.duplicates,
            malformed_lines,
            quality_score: quality_score(total, total - invalid, errors.len(), warnings.len()),
            stats: ValidationStats::from_issues(&errors),
            errors,
            warnings,
        };

        if result.malformed_lines > 0 {
            warn!("⚠️ {} malformed lines skipped in {}", result.malformed_lines, source_file);
        }
        info!(
            "🔍 Validated {}: {} records, {} valid, {} invalid, {} duplicates, quality {}/100",
            source_file, result.total, result.valid, result.invalid, result.duplicates, result.quality_score
        );

        Ok(PreparedBatch {
            result,
            headers,
            mapping,
            records,
        })
    }
}
