use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::constants::{
    GENERATED_SKU_PREFIX, MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_TEXT_LEN, SKU_NAMESPACE,
};
use crate::pipeline::processing::mapper::MappedRow;
use crate::pipeline::processing::quality_gate::{IssueKind, ValidationIssue};
use crate::types::{CanonicalField, CanonicalRecord};

pub mod date;
pub mod price;
pub mod text;

pub use date::{parse_date, parse_date_text};
pub use price::{normalize_price, parse_price_text, PriceParse};
pub use text::{clean_text, normalize_sku, CleanText};

/// A canonical record together with the advisories raised while typing it
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub record: CanonicalRecord,
    pub issues: Vec<ValidationIssue>,
}

/// Deterministic surrogate SKU derived from a product name
pub fn generate_sku(name: &str) -> String {
    let id = Uuid::new_v5(&SKU_NAMESPACE, name.trim().to_lowercase().as_bytes());
    let hex = id.simple().to_string().to_uppercase();
    format!("{}{}", GENERATED_SKU_PREFIX, &hex[..12])
}

/// Converts mapped raw cells into typed canonical values
pub struct ValueNormalizer {
    price_multiplier: Decimal,
    default_currency: String,
    auto_generate_sku: bool,
}

impl ValueNormalizer {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            price_multiplier: config.price_multiplier,
            default_currency: config.default_currency.clone(),
            auto_generate_sku: config.auto_generate_sku,
        }
    }

    fn text_field(
        &self,
        row: &MappedRow,
        field: CanonicalField,
        max_chars: usize,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<String> {
        let cleaned = text::clean_raw(row.get(field), max_chars)?;
        if cleaned.truncated {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::TextTruncated,
                    field.as_str(),
                    format!("{} exceeds {} characters and was truncated", field, max_chars),
                )
                .suggest(format!("Shorten {} to under {} characters", field, max_chars)),
            );
        }
        Some(cleaned.value)
    }

    fn price_field(
        &self,
        row: &MappedRow,
        field: CanonicalField,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Decimal> {
        let raw = row.get(field);
        let parsed = normalize_price(raw);
        if let Some(message) = parsed.misparse {
            issues.push(
                ValidationIssue::warning(IssueKind::PriceMisparse, field.as_str(), message)
                    .suggest("Check the number format of this column in the source file"),
            );
        }
        if parsed.unparseable {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::PriceUnparseable,
                    field.as_str(),
                    format!(
                        "Could not read a price from '{}'",
                        raw.as_text().unwrap_or_default()
                    ),
                )
                .suggest("Provide a valid numeric price"),
            );
        }
        let value = parsed.value?;
        if self.price_multiplier == Decimal::ONE {
            return Some(value);
        }
        match value.checked_mul(self.price_multiplier) {
            Some(scaled) => Some(scaled.round_dp(2)),
            None => {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::PriceUnparseable,
                        field.as_str(),
                        format!(
                            "Price {} times multiplier {} is out of range",
                            value, self.price_multiplier
                        ),
                    )
                    .suggest("Check the price for extra digits"),
                );
                None
            }
        }
    }

    pub fn normalize(&self, row: &MappedRow) -> NormalizedRow {
        let mut issues = Vec::new();

        let name = self.text_field(row, CanonicalField::Name, MAX_NAME_LEN, &mut issues);
        let mut supplier_sku = normalize_sku(row.get(CanonicalField::Sku));
        let mut sku_generated = false;
        if supplier_sku.is_none() && self.auto_generate_sku {
            if let Some(name) = &name {
                supplier_sku = Some(generate_sku(name));
                sku_generated = true;
            }
        }

        let effective_date_raw = row.get(CanonicalField::EffectiveDate);
        let effective_date = parse_date(effective_date_raw);
        if effective_date.is_none() && !effective_date_raw.is_empty() {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::DateUnparseable,
                    CanonicalField::EffectiveDate.as_str(),
                    format!(
                        "Could not read a date from '{}'",
                        effective_date_raw.as_text().unwrap_or_default()
                    ),
                )
                .suggest("Use DD/MM/YYYY or YYYY-MM-DD"),
            );
        }

        let currency = self
            .text_field(row, CanonicalField::Currency, MAX_TEXT_LEN, &mut issues)
            .map(|c| c.to_uppercase())
            .or_else(|| Some(self.default_currency.clone()));

        let record = CanonicalRecord {
            supplier_sku,
            sku_generated,
            name,
            description: self.text_field(
                row,
                CanonicalField::Description,
                MAX_DESCRIPTION_LEN,
                &mut issues,
            ),
            brand: self.text_field(row, CanonicalField::Brand, MAX_TEXT_LEN, &mut issues),
            category: self.text_field(row, CanonicalField::Category, MAX_TEXT_LEN, &mut issues),
            cost_price: self.price_field(row, CanonicalField::CostPrice, &mut issues),
            retail_price: self.price_field(row, CanonicalField::RetailPrice, &mut issues),
            wholesale_price: self.price_field(row, CanonicalField::WholesalePrice, &mut issues),
            currency,
            stock_status: self.text_field(row, CanonicalField::StockStatus, MAX_TEXT_LEN, &mut issues),
            barcode: self.text_field(row, CanonicalField::Barcode, MAX_TEXT_LEN, &mut issues),
            effective_date,
            source_row: row.row_number,
            source_file: row.source_file.clone(),
        };

        let issues = issues
            .into_iter()
            .map(|i| i.at(&row.source_file, row.row_number))
            .collect();
        NormalizedRow { record, issues }
    }
}
