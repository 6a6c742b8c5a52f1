// Canonical product/price store and import checkpoints

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ingestion::{Checkpoint, ImportProgress};
use crate::types::{CanonicalRecord, SupplierRef};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

/// Denormalized attribute bag kept on a supplier product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub stock_status: Option<String>,
    pub currency: Option<String>,
    pub cost_price: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
    pub effective_date: Option<NaiveDate>,
}

/// A supplier's product, identified by `(supplier_id, supplier_sku)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub id: Uuid,
    pub supplier_id: String,
    pub organization_id: Option<String>,
    pub supplier_sku: String,
    pub name: Option<String>,
    pub status: ProductStatus,
    pub attributes: ProductAttributes,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One interval of a product's price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: Decimal,
    pub currency: String,
    pub valid_from: DateTime<Utc>,
    /// `None` while the entry is current
    pub valid_to: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub change_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeAction {
    Inserted,
    Updated,
}

/// What happened to the price history during a merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceChange {
    /// No effective price on the record
    NoPrice,
    /// First current entry opened
    Opened,
    /// Current entry closed and a new one opened
    Replaced { previous: Decimal },
    /// Within tolerance of the current entry
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub product_id: Uuid,
    pub action: MergeAction,
    pub price_change: PriceChange,
}

/// Storage trait for the canonical store and import progress
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upsert one record and its price history in a single transaction.
    ///
    /// When `checkpoint` is given, its watermark is advanced in the same transaction.
    async fn merge_record(
        &self,
        supplier: &SupplierRef,
        record: &CanonicalRecord,
        tolerance: Decimal,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<MergeOutcome>;

    async fn get_product(&self, supplier_id: &str, supplier_sku: &str) -> Result<Option<SupplierProduct>>;
    async fn list_products(&self, supplier_id: &str) -> Result<Vec<SupplierProduct>>;
    /// Entries ordered by `valid_from`
    async fn price_history(&self, product_id: Uuid) -> Result<Vec<PriceHistoryEntry>>;

    async fn get_progress(&self, run_id: &str, filename: &str) -> Result<Option<ImportProgress>>;
    async fn save_progress(&self, progress: &ImportProgress) -> Result<()>;
    async fn list_progress(&self, run_id: &str) -> Result<Vec<ImportProgress>>;
    async fn delete_progress(&self, run_id: &str, filename: &str) -> Result<()>;
}

/// Open the configured SQLite store
pub fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    Ok(Arc::new(SqliteStorage::open(&config.storage.database_path)?))
}
