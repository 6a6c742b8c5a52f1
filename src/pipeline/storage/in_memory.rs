use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{MergeAction, MergeOutcome, PriceHistoryEntry, Storage, SupplierProduct};
use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::{Checkpoint, ImportProgress, ProgressStatus};
use crate::pipeline::merge::{apply_attributes, new_product, plan_price, PricePlan};
use crate::types::{CanonicalRecord, SupplierRef};

#[derive(Default)]
struct State {
    products: HashMap<(String, String), SupplierProduct>,
    history: HashMap<Uuid, Vec<PriceHistoryEntry>>,
    progress: HashMap<(String, String), ImportProgress>,
}

/// In-memory storage implementation for development/testing.
///
/// One lock guards every table, so a merge and its checkpoint update are atomic.
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| IngestError::Merge("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn merge_record(
        &self,
        supplier: &SupplierRef,
        record: &CanonicalRecord,
        tolerance: Decimal,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<MergeOutcome> {
        let sku = record
            .supplier_sku
            .clone()
            .ok_or_else(|| IngestError::Merge("record has no SKU".into()))?;
        let key = (supplier.supplier_id.clone(), sku);
        let now = Utc::now();
        let mut guard = self.lock()?;
        let state = &mut *guard;

        // Fail before touching anything so the merge stays all-or-nothing
        if let Some(cp) = checkpoint {
            if !state
                .progress
                .contains_key(&(cp.run_id.clone(), cp.filename.clone()))
            {
                return Err(IngestError::Merge(format!(
                    "no progress row for run {} file {}",
                    cp.run_id, cp.filename
                )));
            }
        }

        let (product_id, action) = match state.products.get_mut(&key) {
            Some(product) => {
                apply_attributes(product, supplier, record, now);
                (product.id, MergeAction::Updated)
            }
            None => {
                let product = new_product(supplier, record, now)
                    .ok_or_else(|| IngestError::Merge("record has no SKU".into()))?;
                let id = product.id;
                state.products.insert(key, product);
                (id, MergeAction::Inserted)
            }
        };

        let entries = state.history.entry(product_id).or_default();
        let current = entries.iter().find(|e| e.is_current);
        let price_change = match plan_price(product_id, current, record, tolerance, now) {
            PricePlan::Keep(change) => change,
            PricePlan::Open { close, entry, change } => {
                if let Some(close) = close {
                    for existing in entries.iter_mut().filter(|e| e.id == close) {
                        existing.is_current = false;
                        existing.valid_to = Some(now);
                    }
                }
                entries.push(entry);
                change
            }
        };

        if let Some(cp) = checkpoint {
            if let Some(progress) = state
                .progress
                .get_mut(&(cp.run_id.clone(), cp.filename.clone()))
            {
                progress.advance(cp.row);
                progress.processed_rows += 1;
                progress.status = ProgressStatus::InProgress;
            }
        }

        debug!("Merged {} ({:?})", product_id, action);
        Ok(MergeOutcome {
            product_id,
            action,
            price_change,
        })
    }

    async fn get_product(&self, supplier_id: &str, supplier_sku: &str) -> Result<Option<SupplierProduct>> {
        let state = self.lock()?;
        Ok(state
            .products
            .get(&(supplier_id.to_string(), supplier_sku.to_string()))
            .cloned())
    }

    async fn list_products(&self, supplier_id: &str) -> Result<Vec<SupplierProduct>> {
        let state = self.lock()?;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| p.supplier_id == supplier_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.supplier_sku.cmp(&b.supplier_sku));
        Ok(products)
    }

    async fn price_history(&self, product_id: Uuid) -> Result<Vec<PriceHistoryEntry>> {
        let state = self.lock()?;
        let mut entries = state.history.get(&product_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.valid_from);
        Ok(entries)
    }

    async fn get_progress(&self, run_id: &str, filename: &str) -> Result<Option<ImportProgress>> {
        let state = self.lock()?;
        Ok(state
            .progress
            .get(&(run_id.to_string(), filename.to_string()))
            .cloned())
    }

    async fn save_progress(&self, progress: &ImportProgress) -> Result<()> {
        let mut state = self.lock()?;
        let key = (progress.run_id.clone(), progress.filename.clone());
        let mut saved = progress.clone();
        if let Some(existing) = state.progress.get(&key) {
            saved.watermark_row = saved.watermark_row.max(existing.watermark_row);
        }
        state.progress.insert(key, saved);
        Ok(())
    }

    async fn list_progress(&self, run_id: &str) -> Result<Vec<ImportProgress>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .progress
            .values()
            .filter(|p| p.run_id == run_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(rows)
    }

    async fn delete_progress(&self, run_id: &str, filename: &str) -> Result<()> {
        let mut state = self.lock()?;
        state
            .progress
            .remove(&(run_id.to_string(), filename.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::PriceChange;
    use rust_decimal_macros::dec;

    fn record(sku: &str, cost: Decimal, row: usize) -> CanonicalRecord {
        CanonicalRecord {
            supplier_sku: Some(sku.into()),
            name: Some("Amplifier".into()),
            cost_price: Some(cost),
            currency: Some("ZAR".into()),
            source_row: row,
            source_file: "list.csv".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_price_change_closes_previous_entry() {
        let storage = InMemoryStorage::new();
        let supplier = SupplierRef::new("acme");

        let first = storage
            .merge_record(&supplier, &record("ABC1", dec!(1234.50), 2), dec!(0.01), None)
            .await
            .unwrap();
        assert_eq!(first.action, MergeAction::Inserted);
        assert_eq!(first.price_change, PriceChange::Opened);

        let second = storage
            .merge_record(&supplier, &record("ABC1", dec!(1300.00), 2), dec!(0.01), None)
            .await
            .unwrap();
        assert_eq!(second.action, MergeAction::Updated);
        assert_eq!(second.product_id, first.product_id);

        let history = storage.price_history(first.product_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_current);
        assert!(history[0].valid_to.is_some());
        assert_eq!(history[1].price, dec!(1300.00));
        assert_eq!(history.iter().filter(|e| e.is_current).count(), 1);
    }

    #[tokio::test]
    async fn test_remerge_is_idempotent() {
        let storage = InMemoryStorage::new();
        let supplier = SupplierRef::new("acme");
        for _ in 0..3 {
            storage
                .merge_record(&supplier, &record("X", dec!(10), 2), dec!(0.01), None)
                .await
                .unwrap();
        }
        let products = storage.list_products("acme").await.unwrap();
        assert_eq!(products.len(), 1);
        let history = storage.price_history(products[0].id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_advances_with_merge() {
        let storage = InMemoryStorage::new();
        let supplier = SupplierRef::new("acme");
        let checkpoint = Checkpoint {
            run_id: "run-1".into(),
            filename: "list.csv".into(),
            row: 7,
        };

        let missing = storage
            .merge_record(&supplier, &record("X", dec!(10), 7), dec!(0.01), Some(&checkpoint))
            .await;
        assert!(missing.is_err());
        assert!(storage.list_products("acme").await.unwrap().is_empty());

        storage
            .save_progress(&ImportProgress::new("run-1", "list.csv", "f"))
            .await
            .unwrap();
        storage
            .merge_record(&supplier, &record("X", dec!(10), 7), dec!(0.01), Some(&checkpoint))
            .await
            .unwrap();
        let progress = storage.get_progress("run-1", "list.csv").await.unwrap().unwrap();
        assert_eq!(progress.watermark_row, 7);
        assert_eq!(progress.processed_rows, 1);
        assert_eq!(progress.status, ProgressStatus::InProgress);
    }
}
