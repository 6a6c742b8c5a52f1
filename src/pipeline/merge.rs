use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::constants::DEFAULT_CURRENCY;
use crate::error::{IngestError, Result};
use crate::metrics;
use crate::pipeline::ingestion::Checkpoint;
use crate::pipeline::storage::{
    MergeAction, MergeOutcome, PriceChange, PriceHistoryEntry, ProductAttributes, ProductStatus,
    Storage, SupplierProduct,
};
use crate::types::{CanonicalRecord, SupplierRef};

/// First non-null of cost, retail and wholesale
pub fn effective_price(record: &CanonicalRecord) -> Option<Decimal> {
    record.effective_price()
}

pub fn change_reason(record: &CanonicalRecord) -> String {
    format!(
        "Pricelist import from {} row {}",
        record.source_file, record.source_row
    )
}

fn attributes_from(record: &CanonicalRecord) -> ProductAttributes {
    ProductAttributes {
        description: record.description.clone(),
        brand: record.brand.clone(),
        category: record.category.clone(),
        barcode: record.barcode.clone(),
        stock_status: record.stock_status.clone(),
        currency: record.currency.clone(),
        cost_price: record.cost_price,
        retail_price: record.retail_price,
        wholesale_price: record.wholesale_price,
        effective_date: record.effective_date,
    }
}

/// Build a new active product from a record; `None` without a SKU
pub fn new_product(
    supplier: &SupplierRef,
    record: &CanonicalRecord,
    now: DateTime<Utc>,
) -> Option<SupplierProduct> {
    let sku = record.supplier_sku.clone()?;
    Some(SupplierProduct {
        id: Uuid::new_v4(),
        supplier_id: supplier.supplier_id.clone(),
        organization_id: supplier.organization_id.clone(),
        supplier_sku: sku,
        name: record.name.clone(),
        status: ProductStatus::Active,
        attributes: attributes_from(record),
        first_seen_at: now,
        last_seen_at: now,
        updated_at: now,
    })
}

fn keep_or_replace<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>, is_empty: impl Fn(&T) -> bool) {
    if let Some(value) = incoming {
        if !is_empty(value) {
            *slot = Some(value.clone());
        }
    }
}

fn blank(s: &String) -> bool {
    s.trim().is_empty()
}

/// Merge a sighting into an existing product; a new value wins only when non-empty
pub fn apply_attributes(
    product: &mut SupplierProduct,
    supplier: &SupplierRef,
    record: &CanonicalRecord,
    now: DateTime<Utc>,
) {
    let incoming = attributes_from(record);
    let attrs = &mut product.attributes;
    keep_or_replace(&mut product.name, &record.name, blank);
    keep_or_replace(&mut product.organization_id, &supplier.organization_id, blank);
    keep_or_replace(&mut attrs.description, &incoming.description, blank);
    keep_or_replace(&mut attrs.brand, &incoming.brand, blank);
    keep_or_replace(&mut attrs.category, &incoming.category, blank);
    keep_or_replace(&mut attrs.barcode, &incoming.barcode, blank);
    keep_or_replace(&mut attrs.stock_status, &incoming.stock_status, blank);
    keep_or_replace(&mut attrs.currency, &incoming.currency, blank);
    keep_or_replace(&mut attrs.cost_price, &incoming.cost_price, |_| false);
    keep_or_replace(&mut attrs.retail_price, &incoming.retail_price, |_| false);
    keep_or_replace(&mut attrs.wholesale_price, &incoming.wholesale_price, |_| false);
    keep_or_replace(&mut attrs.effective_date, &incoming.effective_date, |_| false);
    product.last_seen_at = now;
    product.updated_at = now;
}

/// Price-history steps a merge has to perform
#[derive(Debug, Clone, PartialEq)]
pub enum PricePlan {
    /// Nothing to write
    Keep(PriceChange),
    /// Open a current entry, closing `close` first when present
    Open {
        close: Option<Uuid>,
        entry: PriceHistoryEntry,
        change: PriceChange,
    },
}

/// Decide whether `record` opens a new current price for `product_id`
pub fn plan_price(
    product_id: Uuid,
    current: Option<&PriceHistoryEntry>,
    record: &CanonicalRecord,
    tolerance: Decimal,
    now: DateTime<Utc>,
) -> PricePlan {
    let Some(price) = effective_price(record) else {
        return PricePlan::Keep(PriceChange::NoPrice);
    };

    let change = match current {
        Some(entry) if (entry.price - price).abs() <= tolerance => {
            return PricePlan::Keep(PriceChange::Unchanged);
        }
        Some(entry) => PriceChange::Replaced {
            previous: entry.price,
        },
        None => PriceChange::Opened,
    };

    PricePlan::Open {
        close: current.map(|e| e.id),
        entry: PriceHistoryEntry {
            id: Uuid::new_v4(),
            product_id,
            price,
            currency: record
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            valid_from: now,
            valid_to: None,
            is_current: true,
            change_reason: change_reason(record),
        },
        change,
    }
}

/// Runs record merges against a store under a per-merge timeout
#[derive(Clone)]
pub struct MergeEngine {
    storage: Arc<dyn Storage>,
    tolerance: Decimal,
    timeout: Duration,
}

impl MergeEngine {
    pub fn new(storage: Arc<dyn Storage>, tolerance: Decimal, timeout: Duration) -> Self {
        Self {
            storage,
            tolerance,
            timeout,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Merge one valid record; zero retries, a timeout is this record's failure
    #[instrument(skip(self, supplier, record, checkpoint), fields(sku = ?record.supplier_sku, row = record.source_row))]
    pub async fn merge(
        &self,
        supplier: &SupplierRef,
        record: &CanonicalRecord,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<MergeOutcome> {
        if record.supplier_sku.is_none() {
            return Err(IngestError::Merge(format!(
                "row {} of {} has no SKU to merge on",
                record.source_row, record.source_file
            )));
        }

        let outcome = tokio::time::timeout(
            self.timeout,
            self.storage
                .merge_record(supplier, record, self.tolerance, checkpoint),
        )
        .await
        .map_err(|_| IngestError::Timeout {
            what: format!("merge of row {} in {}", record.source_row, record.source_file),
            secs: self.timeout.as_secs(),
        })??;

        metrics::record_merge(match outcome.action {
            MergeAction::Inserted => "inserted",
            MergeAction::Updated => "updated",
        });
        if matches!(outcome.price_change, PriceChange::Replaced { .. }) {
            metrics::record_merge("price_changed");
        }
        debug!("Merged {:?}: {:?}", record.supplier_sku, outcome);
        Ok(outcome)
    }
}
