use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ValidationConfig;
use crate::constants::{BARCODE_LENGTHS, MAX_SKU_LEN, MIN_DESCRIPTION_LEN, MIN_NAME_LEN};
use crate::error::{IngestError, Result};
use crate::types::CanonicalRecord;

pub mod report;

pub use report::render_report;

/// Severity levels for validation issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Advisory; the record stays importable
    Warning,
    /// Blocking; the record is excluded from merge
    Error,
}

/// Types of issues the normalizer, validator and duplicate detector raise
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SkuRequired,
    SkuMissing,
    SkuGenerated,
    SkuInvalidFormat,
    SkuTooLong,
    NameRequired,
    NameTooShort,
    PriceRequired,
    PriceTooLow,
    PriceVeryHigh,
    PriceUnparseable,
    PriceMisparse,
    RetailBelowCost,
    WholesaleBelowCost,
    WholesaleAboveRetail,
    CurrencyNotSupported,
    BrandMissing,
    CategoryMissing,
    DescriptionMissing,
    DescriptionTooShort,
    BarcodeInvalidFormat,
    BarcodeInvalidLength,
    DateUnparseable,
    TextTruncated,
    DuplicateSku,
    MalformedLine,
    MappingOverrideUnresolved,
    MergeFailed,
    /// The file as a whole could not be read or imported
    SourceFailed,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::SkuRequired => "sku_required",
            IssueKind::SkuMissing => "sku_missing",
            IssueKind::SkuGenerated => "sku_missing_auto_generated",
            IssueKind::SkuInvalidFormat => "sku_invalid_format",
            IssueKind::SkuTooLong => "sku_too_long",
            IssueKind::NameRequired => "name_required",
            IssueKind::NameTooShort => "name_too_short",
            IssueKind::PriceRequired => "price_required",
            IssueKind::PriceTooLow => "price_too_low",
            IssueKind::PriceVeryHigh => "price_very_high",
            IssueKind::PriceUnparseable => "price_unparseable",
            IssueKind::PriceMisparse => "price_misparse",
            IssueKind::RetailBelowCost => "retail_price_below_cost",
            IssueKind::WholesaleBelowCost => "wholesale_price_below_cost",
            IssueKind::WholesaleAboveRetail => "wholesale_price_above_retail",
            IssueKind::CurrencyNotSupported => "currency_not_supported",
            IssueKind::BrandMissing => "brand_missing",
            IssueKind::CategoryMissing => "category_missing",
            IssueKind::DescriptionMissing => "description_missing",
            IssueKind::DescriptionTooShort => "description_too_short",
            IssueKind::BarcodeInvalidFormat => "barcode_invalid_format",
            IssueKind::BarcodeInvalidLength => "barcode_invalid_length",
            IssueKind::DateUnparseable => "date_unparseable",
            IssueKind::TextTruncated => "text_truncated",
            IssueKind::DuplicateSku => "duplicate_sku",
            IssueKind::MalformedLine => "malformed_line",
            IssueKind::MappingOverrideUnresolved => "mapping_override_unresolved",
            IssueKind::MergeFailed => "merge_failed",
            IssueKind::SourceFailed => "source_failed",
        }
    }

    pub fn is_missing_required(&self) -> bool {
        matches!(
            self,
            IssueKind::SkuRequired | IssueKind::NameRequired | IssueKind::PriceRequired
        )
    }

    pub fn is_price(&self) -> bool {
        matches!(
            self,
            IssueKind::PriceRequired
                | IssueKind::PriceTooLow
                | IssueKind::PriceVeryHigh
                | IssueKind::PriceUnparseable
                | IssueKind::PriceMisparse
                | IssueKind::RetailBelowCost
                | IssueKind::WholesaleBelowCost
                | IssueKind::WholesaleAboveRetail
        )
    }

    pub fn is_sku(&self) -> bool {
        matches!(
            self,
            IssueKind::SkuRequired
                | IssueKind::SkuInvalidFormat
                | IssueKind::SkuTooLong
                | IssueKind::DuplicateSku
        )
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual issue found while preparing a record or batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// Canonical field that triggered the issue
    pub field: Option<String>,
    pub message: String,
    /// Suggested remediations
    pub suggestions: Vec<String>,
    pub source_file: String,
    /// Source row; `None` for file-level issues
    pub row: Option<usize>,
    /// Further rows involved, e.g. every occurrence of a duplicate
    pub related_rows: Vec<usize>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, severity: Severity, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            field: field.map(str::to_string),
            message: message.into(),
            suggestions: Vec::new(),
            source_file: String::new(),
            row: None,
            related_rows: Vec::new(),
        }
    }

    pub fn error(kind: IssueKind, field: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, Some(field), message)
    }

    pub fn warning(kind: IssueKind, field: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, Some(field), message)
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn at(mut self, source_file: &str, row: usize) -> Self {
        self.source_file = source_file.to_string();
        self.row = Some(row);
        self
    }

    pub fn in_file(mut self, source_file: &str) -> Self {
        self.source_file = source_file.to_string();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Per-record state machine: unvalidated -> valid | valid-with-warnings | invalid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Unvalidated,
    Valid,
    ValidWithWarnings,
    Invalid,
}

impl RecordStatus {
    pub fn from_issues(issues: &[ValidationIssue]) -> Self {
        if issues.iter().any(ValidationIssue::is_error) {
            RecordStatus::Invalid
        } else if issues.is_empty() {
            RecordStatus::Valid
        } else {
            RecordStatus::ValidWithWarnings
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RecordStatus::Valid | RecordStatus::ValidWithWarnings)
    }
}

/// Issues attached to one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub status: RecordStatus,
    pub issues: Vec<ValidationIssue>,
}

impl Default for ValidationOutcome {
    fn default() -> Self {
        Self {
            status: RecordStatus::Unvalidated,
            issues: Vec::new(),
        }
    }
}

impl ValidationOutcome {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            status: RecordStatus::from_issues(&issues),
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| !i.is_error())
    }

    pub fn suggestions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for s in self.issues.iter().flat_map(|i| i.suggestions.iter()) {
            if !out.contains(&s.as_str()) {
                out.push(s.as_str());
            }
        }
        out
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

/// SKU presence, pattern and length
pub fn check_sku(
    record: &CanonicalRecord,
    config: &ValidationConfig,
    pattern: Option<&Regex>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let sku = match record.supplier_sku.as_deref() {
        Some(sku) if !sku.trim().is_empty() => sku,
        _ => {
            if config.require_sku {
                let mut issue = ValidationIssue::error(IssueKind::SkuRequired, "sku", "SKU is required")
                    .suggest("Provide a unique product SKU");
                if !config.auto_generate_sku {
                    issue = issue.suggest("Enable auto-generation of SKUs");
                }
                issues.push(issue);
            } else {
                issues.push(
                    ValidationIssue::warning(
                        IssueKind::SkuMissing,
                        "sku",
                        "SKU missing, the record cannot be matched to a product and will not be merged",
                    )
                    .suggest("Provide a unique product SKU"),
                );
            }
            return issues;
        }
    };

    if record.sku_generated {
        issues.push(
            ValidationIssue::warning(
                IssueKind::SkuGenerated,
                "sku",
                format!("SKU missing, generated {} from the product name", sku),
            )
            .suggest("Provide supplier SKUs so products match across pricelists"),
        );
    }

    if let Some(pattern) = pattern {
        if !record.sku_generated && !pattern.is_match(sku) {
            issues.push(
                ValidationIssue::error(
                    IssueKind::SkuInvalidFormat,
                    "sku",
                    format!("SKU format invalid: {}", sku),
                )
                .suggest("Ensure SKU matches the required pattern"),
            );
        }
    }

    if sku.chars().count() > MAX_SKU_LEN {
        issues.push(
            ValidationIssue::warning(
                IssueKind::SkuTooLong,
                "sku",
                format!("SKU exceeds {} characters", MAX_SKU_LEN),
            )
            .suggest(format!("Shorten SKU to under {} characters", MAX_SKU_LEN)),
        );
    }

    issues
}

pub fn check_name(record: &CanonicalRecord, config: &ValidationConfig) -> Vec<ValidationIssue> {
    match record.name.as_deref().map(str::trim) {
        None | Some("") => {
            if config.require_name {
                vec![ValidationIssue::error(IssueKind::NameRequired, "name", "Product name is required")
                    .suggest("Provide a descriptive product name")]
            } else {
                Vec::new()
            }
        }
        Some(name) if name.chars().count() < MIN_NAME_LEN => {
            vec![ValidationIssue::warning(IssueKind::NameTooShort, "name", "Product name is very short")
                .suggest("Provide a more descriptive product name")]
        }
        Some(_) => Vec::new(),
    }
}

fn present_prices(record: &CanonicalRecord) -> Vec<(&'static str, Decimal)> {
    [
        ("cost_price", record.cost_price),
        ("retail_price", record.retail_price),
        ("wholesale_price", record.wholesale_price),
    ]
    .into_iter()
    .filter_map(|(field, price)| price.map(|p| (field, p)))
    .collect()
}

/// Presence and bounds of every price field
pub fn check_price_bounds(record: &CanonicalRecord, config: &ValidationConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let prices = present_prices(record);

    if prices.is_empty() {
        if config.require_price {
            issues.push(
                ValidationIssue::error(IssueKind::PriceRequired, "cost_price", "A cost, retail or wholesale price is required")
                    .suggest("Provide a valid numeric cost price"),
            );
        }
        return issues;
    }

    for (field, price) in prices {
        if price < config.min_price {
            issues.push(
                ValidationIssue::error(
                    IssueKind::PriceTooLow,
                    field,
                    format!("Price {} is below minimum {}", price, config.min_price),
                )
                .suggest(format!("Set {} above {}", field.replace('_', " "), config.min_price)),
            );
        } else if price > config.max_price {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::PriceVeryHigh,
                    field,
                    format!("Price {} is unusually high", price),
                )
                .suggest("Verify the price is correct"),
            );
        }
    }

    issues
}

/// Retail, wholesale and cost relative to each other
pub fn check_price_relationships(record: &CanonicalRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let (Some(cost), Some(retail)) = (record.cost_price, record.retail_price) {
        if retail < cost {
            issues.push(
                ValidationIssue::warning(IssueKind::RetailBelowCost, "retail_price", "Retail price is below cost price")
                    .suggest("Review pricing to ensure profitability"),
            );
        }
    }
    if let Some(wholesale) = record.wholesale_price {
        if matches!(record.cost_price, Some(cost) if wholesale < cost) {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::WholesaleBelowCost,
                    "wholesale_price",
                    "Wholesale price is below cost price",
                )
                .suggest("Review pricing to ensure profitability"),
            );
        }
        if matches!(record.retail_price, Some(retail) if wholesale > retail) {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::WholesaleAboveRetail,
                    "wholesale_price",
                    "Wholesale price is above retail price",
                )
                .suggest("Review pricing structure"),
            );
        }
    }

    issues
}

pub fn check_currency(record: &CanonicalRecord, config: &ValidationConfig) -> Vec<ValidationIssue> {
    let currency = record
        .currency
        .as_deref()
        .unwrap_or(config.default_currency.as_str());
    if config.allowed_currencies.iter().any(|c| c.eq_ignore_ascii_case(currency)) {
        return Vec::new();
    }
    vec![ValidationIssue::warning(
        IssueKind::CurrencyNotSupported,
        "currency",
        format!(
            "Currency {} not in allowed list, defaulting to {}",
            currency, config.default_currency
        ),
    )
    .suggest(format!("Use one of: {}", config.allowed_currencies.join(", ")))]
}

pub fn check_barcode(record: &CanonicalRecord) -> Vec<ValidationIssue> {
    let Some(barcode) = record.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty()) else {
        return Vec::new();
    };
    let mut issues = Vec::new();
    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        issues.push(
            ValidationIssue::warning(IssueKind::BarcodeInvalidFormat, "barcode", "Barcode should contain only numbers")
                .suggest("Verify barcode format"),
        );
    }
    if !BARCODE_LENGTHS.contains(&barcode.chars().count()) {
        issues.push(
            ValidationIssue::warning(
                IssueKind::BarcodeInvalidLength,
                "barcode",
                "Barcode length should be 8, 12, 13, or 14 digits",
            )
            .suggest("Verify barcode is complete"),
        );
    }
    issues
}

/// Brand, category and description presence
pub fn check_completeness(record: &CanonicalRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if is_blank(&record.brand) {
        issues.push(
            ValidationIssue::warning(IssueKind::BrandMissing, "brand", "Brand information missing")
                .suggest("Provide brand information for better categorization"),
        );
    }
    if is_blank(&record.category) {
        issues.push(
            ValidationIssue::warning(IssueKind::CategoryMissing, "category", "Category information missing")
                .suggest("Provide category information for better organization"),
        );
    }
    match record.description.as_deref().map(str::trim) {
        None | Some("") => issues.push(
            ValidationIssue::warning(IssueKind::DescriptionMissing, "description", "Product description missing")
                .suggest("Add product description for better searchability"),
        ),
        Some(d) if d.chars().count() < MIN_DESCRIPTION_LEN => issues.push(
            ValidationIssue::warning(
                IssueKind::DescriptionTooShort,
                "description",
                "Product description is very brief",
            )
            .suggest("Provide more detailed product description"),
        ),
        Some(_) => {}
    }
    issues
}

/// Applies every record rule and the currency fallback
pub struct RecordValidator {
    pub config: ValidationConfig,
    sku_pattern: Option<Regex>,
}

impl RecordValidator {
    pub fn new(config: ValidationConfig) -> Result<Self> {
        let sku_pattern = match &config.sku_pattern {
            Some(p) => Some(
                Regex::new(p)
                    .map_err(|e| IngestError::Config(format!("invalid sku_pattern: {}", e)))?,
            ),
            None => None,
        };
        Ok(Self { config, sku_pattern })
    }

    /// Evaluate all rules; an unsupported currency is replaced by the default.
    pub fn validate(&self, record: &mut CanonicalRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        issues.extend(check_sku(record, &self.config, self.sku_pattern.as_ref()));
        issues.extend(check_name(record, &self.config));
        issues.extend(check_price_bounds(record, &self.config));
        issues.extend(check_price_relationships(record));

        let currency_issues = check_currency(record, &self.config);
        if !currency_issues.is_empty() {
            record.currency = Some(self.config.default_currency.clone());
        }
        issues.extend(currency_issues);

        issues.extend(check_barcode(record));
        issues.extend(check_completeness(record));

        issues
            .into_iter()
            .map(|i| i.at(&record.source_file, record.source_row))
            .collect()
    }
}

/// Batch fitness for import on a 0-100 scale; 0 for an empty batch
pub fn quality_score(total: usize, valid: usize, error_count: usize, warning_count: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let validity = (valid as f64 / total) * 60.0;
    let error_penalty = ((error_count as f64 / total) * 30.0).min(30.0);
    let warning_penalty = ((warning_count as f64 / total) * 10.0).min(10.0);
    (validity - error_penalty - warning_penalty)
        .max(0.0)
        .round()
        .clamp(0.0, 100.0) as u8
}

/// Per-category error counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationStats {
    pub missing_required_fields: usize,
    pub price_validation_errors: usize,
    pub sku_validation_errors: usize,
}

impl ValidationStats {
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a ValidationIssue>) -> Self {
        let mut stats = Self::default();
        for issue in issues.into_iter().filter(|i| i.is_error()) {
            if issue.kind.is_missing_required() {
                stats.missing_required_fields += 1;
            }
            if issue.kind.is_price() {
                stats.price_validation_errors += 1;
            }
            if issue.kind.is_sku() {
                stats.sku_validation_errors += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn complete_record() -> CanonicalRecord {
        CanonicalRecord {
            supplier_sku: Some("ABC1".into()),
            name: Some("Widget".into()),
            description: Some("A sturdy general purpose widget".into()),
            brand: Some("Acme".into()),
            category: Some("Hardware".into()),
            cost_price: Some(dec!(100)),
            retail_price: Some(dec!(150)),
            wholesale_price: Some(dec!(120)),
            currency: Some("ZAR".into()),
            barcode: Some("6001234567890".into()),
            source_row: 2,
            source_file: "list.csv".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_record_is_valid() {
        let validator = RecordValidator::new(ValidationConfig::default()).unwrap();
        let mut record = complete_record();
        let issues = validator.validate(&mut record);
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
        assert_eq!(RecordStatus::from_issues(&issues), RecordStatus::Valid);
    }

    #[test]
    fn test_missing_sku_is_error_unless_generated() {
        let config = ValidationConfig::default();
        let mut record = complete_record();
        record.supplier_sku = None;
        let issues = check_sku(&record, &config, None);
        assert_eq!(issues[0].kind, IssueKind::SkuRequired);
        assert!(issues[0].is_error());

        record.supplier_sku = Some("AUTO-1A2B3C4D5E6F".into());
        record.sku_generated = true;
        let issues = check_sku(&record, &config, None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_sku_pattern_and_length() {
        let config = ValidationConfig::default();
        let pattern = Regex::new(r"^[A-Z]{3}\d+$").unwrap();
        let mut record = complete_record();
        record.supplier_sku = Some("12-X".into());
        let issues = check_sku(&record, &config, Some(&pattern));
        assert_eq!(issues[0].kind, IssueKind::SkuInvalidFormat);

        record.supplier_sku = Some("A".repeat(101));
        let issues = check_sku(&record, &config, None);
        assert_eq!(issues[0].kind, IssueKind::SkuTooLong);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_price_bounds_apply_to_every_price() {
        let config = ValidationConfig::default();
        let mut record = complete_record();
        record.retail_price = Some(dec!(0.001));
        record.wholesale_price = Some(dec!(2000000));
        let issues = check_price_bounds(&record, &config);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].kind, IssueKind::PriceTooLow);
        assert!(issues[0].is_error());
        assert_eq!(issues[1].kind, IssueKind::PriceVeryHigh);
        assert!(!issues[1].is_error());
    }

    #[test]
    fn test_missing_price_respects_require_price() {
        let mut config = ValidationConfig::default();
        let mut record = complete_record();
        record.cost_price = None;
        record.retail_price = None;
        record.wholesale_price = None;
        assert_eq!(check_price_bounds(&record, &config)[0].kind, IssueKind::PriceRequired);
        config.require_price = false;
        assert!(check_price_bounds(&record, &config).is_empty());
    }

    #[test]
    fn test_price_relationships_only_warn() {
        let mut record = complete_record();
        record.retail_price = Some(dec!(90));
        record.wholesale_price = Some(dec!(95));
        let kinds: Vec<_> = check_price_relationships(&record).into_iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IssueKind::RetailBelowCost, IssueKind::WholesaleBelowCost, IssueKind::WholesaleAboveRetail]
        );
    }

    #[test]
    fn test_unsupported_currency_falls_back() {
        let validator = RecordValidator::new(ValidationConfig::default()).unwrap();
        let mut record = complete_record();
        record.currency = Some("JPY".into());
        let issues = validator.validate(&mut record);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::CurrencyNotSupported);
        assert_eq!(issues[0].row, Some(2));
        assert_eq!(record.currency.as_deref(), Some("ZAR"));
    }

    #[test]
    fn test_barcode_rules() {
        let mut record = complete_record();
        record.barcode = Some("60012X".into());
        let kinds: Vec<_> = check_barcode(&record).into_iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::BarcodeInvalidFormat, IssueKind::BarcodeInvalidLength]);
        record.barcode = Some("12345678".into());
        assert!(check_barcode(&record).is_empty());
    }

    #[test]
    fn test_completeness_warnings() {
        let mut record = complete_record();
        record.brand = None;
        record.description = Some("Short".into());
        let kinds: Vec<_> = check_completeness(&record).into_iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::BrandMissing, IssueKind::DescriptionTooShort]);
    }

    #[test]
    fn test_quality_score_formula() {
        assert_eq!(quality_score(0, 0, 0, 0), 0);
        assert_eq!(quality_score(10, 10, 0, 0), 60);
        assert_eq!(quality_score(10, 5, 5, 10), 5);
        assert_eq!(quality_score(4, 0, 40, 40), 0);
    }

    #[test]
    fn test_quality_score_monotonicity() {
        // (valid, errors, warnings) over n records
        let cases = [(8usize, 2usize, 5usize, 10usize), (3, 4, 2, 7), (1, 0, 9, 1), (5, 12, 30, 9)];
        for (valid, errors, warnings, total) in cases {
            let base = quality_score(total, valid, errors, warnings);
            assert!(quality_score(total + 1, valid, errors + 1, warnings) <= base);
            assert!(quality_score(total + 1, valid + 1, errors, warnings) >= base);
        }
    }

    #[test]
    fn test_stats_categories() {
        let issues = vec![
            ValidationIssue::error(IssueKind::SkuRequired, "sku", "x"),
            ValidationIssue::error(IssueKind::PriceTooLow, "cost_price", "x"),
            ValidationIssue::warning(IssueKind::PriceVeryHigh, "cost_price", "x"),
        ];
        let stats = ValidationStats::from_issues(&issues);
        assert_eq!(stats.missing_required_fields, 1);
        assert_eq!(stats.price_validation_errors, 1);
        assert_eq!(stats.sku_validation_errors, 1);
    }
}
