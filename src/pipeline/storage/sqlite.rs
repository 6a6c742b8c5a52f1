use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    MergeAction, MergeOutcome, PriceHistoryEntry, ProductAttributes, ProductStatus, Storage,
    SupplierProduct,
};
use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::{Checkpoint, ImportProgress, ProgressStatus};
use crate::pipeline::merge::{apply_attributes, new_product, plan_price, PricePlan};
use crate::types::{CanonicalRecord, SupplierRef};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS supplier_product (
        id               TEXT PRIMARY KEY,
        supplier_id      TEXT NOT NULL,
        organization_id  TEXT,
        supplier_sku     TEXT NOT NULL,
        name             TEXT,
        status           TEXT NOT NULL,
        attributes       TEXT NOT NULL,
        first_seen_at    TEXT NOT NULL,
        last_seen_at     TEXT NOT NULL,
        updated_at       TEXT NOT NULL,
        UNIQUE (supplier_id, supplier_sku)
    );
    CREATE TABLE IF NOT EXISTS price_history (
        id             TEXT PRIMARY KEY,
        product_id     TEXT NOT NULL REFERENCES supplier_product(id),
        price          TEXT NOT NULL,
        currency       TEXT NOT NULL,
        valid_from     TEXT NOT NULL,
        valid_to       TEXT,
        is_current     INTEGER NOT NULL,
        change_reason  TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS price_history_one_current
        ON price_history(product_id) WHERE is_current = 1;
    CREATE INDEX IF NOT EXISTS price_history_by_product
        ON price_history(product_id, valid_from);
    CREATE TABLE IF NOT EXISTS import_progress (
        run_id          TEXT NOT NULL,
        filename        TEXT NOT NULL,
        fingerprint     TEXT NOT NULL,
        status          TEXT NOT NULL,
        total_rows      INTEGER NOT NULL,
        processed_rows  INTEGER NOT NULL,
        watermark_row   INTEGER NOT NULL,
        last_error      TEXT,
        updated_at      TEXT NOT NULL,
        PRIMARY KEY (run_id, filename)
    );
"#;

const PRODUCT_COLUMNS: &str = "id, supplier_id, organization_id, supplier_sku, name, status, \
     attributes, first_seen_at, last_seen_at, updated_at";
const HISTORY_COLUMNS: &str =
    "id, product_id, price, currency, valid_from, valid_to, is_current, change_reason";
const PROGRESS_COLUMNS: &str = "run_id, filename, fingerprint, status, total_rows, \
     processed_rows, watermark_row, last_error, updated_at";

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| IngestError::Decode(format!("timestamp '{}': {}", value, e)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| IngestError::Decode(format!("uuid '{}': {}", value, e)))
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| IngestError::Decode(format!("decimal '{}': {}", value, e)))
}

struct ProductRow {
    id: String,
    supplier_id: String,
    organization_id: Option<String>,
    supplier_sku: String,
    name: Option<String>,
    status: String,
    attributes: String,
    first_seen_at: String,
    last_seen_at: String,
    updated_at: String,
}

impl ProductRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            supplier_id: row.get(1)?,
            organization_id: row.get(2)?,
            supplier_sku: row.get(3)?,
            name: row.get(4)?,
            status: row.get(5)?,
            attributes: row.get(6)?,
            first_seen_at: row.get(7)?,
            last_seen_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<SupplierProduct> {
        let status = match self.status.as_str() {
            "active" => ProductStatus::Active,
            "inactive" => ProductStatus::Inactive,
            other => return Err(IngestError::Decode(format!("product status '{}'", other))),
        };
        let attributes: ProductAttributes = serde_json::from_str(&self.attributes)?;
        Ok(SupplierProduct {
            id: parse_uuid(&self.id)?,
            supplier_id: self.supplier_id,
            organization_id: self.organization_id,
            supplier_sku: self.supplier_sku,
            name: self.name,
            status,
            attributes,
            first_seen_at: parse_ts(&self.first_seen_at)?,
            last_seen_at: parse_ts(&self.last_seen_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct HistoryRow {
    id: String,
    product_id: String,
    price: String,
    currency: String,
    valid_from: String,
    valid_to: Option<String>,
    is_current: bool,
    change_reason: String,
}

impl HistoryRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_id: row.get(1)?,
            price: row.get(2)?,
            currency: row.get(3)?,
            valid_from: row.get(4)?,
            valid_to: row.get(5)?,
            is_current: row.get(6)?,
            change_reason: row.get(7)?,
        })
    }

    fn decode(self) -> Result<PriceHistoryEntry> {
        Ok(PriceHistoryEntry {
            id: parse_uuid(&self.id)?,
            product_id: parse_uuid(&self.product_id)?,
            price: parse_decimal(&self.price)?,
            currency: self.currency,
            valid_from: parse_ts(&self.valid_from)?,
            valid_to: self.valid_to.as_deref().map(parse_ts).transpose()?,
            is_current: self.is_current,
            change_reason: self.change_reason,
        })
    }
}

struct ProgressRow {
    run_id: String,
    filename: String,
    fingerprint: String,
    status: String,
    total_rows: i64,
    processed_rows: i64,
    watermark_row: i64,
    last_error: Option<String>,
    updated_at: String,
}

impl ProgressRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            filename: row.get(1)?,
            fingerprint: row.get(2)?,
            status: row.get(3)?,
            total_rows: row.get(4)?,
            processed_rows: row.get(5)?,
            watermark_row: row.get(6)?,
            last_error: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<ImportProgress> {
        let corrupt = |reason: String| IngestError::CorruptCheckpoint {
            file: self.filename.clone(),
            reason,
        };
        let status = ProgressStatus::from_str(&self.status).map_err(&corrupt)?;
        let count = |value: i64, column: &str| {
            usize::try_from(value).map_err(|_| corrupt(format!("negative {} ({})", column, value)))
        };
        Ok(ImportProgress {
            total_rows: count(self.total_rows, "total_rows")?,
            processed_rows: count(self.processed_rows, "processed_rows")?,
            watermark_row: count(self.watermark_row, "watermark_row")?,
            updated_at: parse_ts(&self.updated_at).map_err(|e| corrupt(e.to_string()))?,
            run_id: self.run_id,
            filename: self.filename,
            fingerprint: self.fingerprint,
            status,
            last_error: self.last_error,
        })
    }
}

fn find_product(conn: &Connection, supplier_id: &str, sku: &str) -> Result<Option<SupplierProduct>> {
    let sql = format!(
        "SELECT {} FROM supplier_product WHERE supplier_id = ?1 AND supplier_sku = ?2",
        PRODUCT_COLUMNS
    );
    conn.query_row(&sql, params![supplier_id, sku], ProductRow::read)
        .optional()?
        .map(ProductRow::decode)
        .transpose()
}

fn current_price(conn: &Connection, product_id: Uuid) -> Result<Option<PriceHistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM price_history WHERE product_id = ?1 AND is_current = 1",
        HISTORY_COLUMNS
    );
    conn.query_row(&sql, params![product_id.to_string()], HistoryRow::read)
        .optional()?
        .map(HistoryRow::decode)
        .transpose()
}

fn upsert_product(conn: &Connection, product: &SupplierProduct) -> Result<()> {
    conn.execute(
        "INSERT INTO supplier_product (id, supplier_id, organization_id, supplier_sku, name, status,
             attributes, first_seen_at, last_seen_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(supplier_id, supplier_sku) DO UPDATE SET
             organization_id=excluded.organization_id,
             name=excluded.name,
             status=excluded.status,
             attributes=excluded.attributes,
             last_seen_at=excluded.last_seen_at,
             updated_at=excluded.updated_at",
        params![
            product.id.to_string(),
            product.supplier_id,
            product.organization_id,
            product.supplier_sku,
            product.name,
            product.status.as_str(),
            serde_json::to_string(&product.attributes)?,
            ts(&product.first_seen_at),
            ts(&product.last_seen_at),
            ts(&product.updated_at),
        ],
    )?;
    Ok(())
}

fn insert_price(conn: &Connection, entry: &PriceHistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO price_history (id, product_id, price, currency, valid_from, valid_to,
             is_current, change_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.product_id.to_string(),
            entry.price.to_string(),
            entry.currency,
            ts(&entry.valid_from),
            entry.valid_to.as_ref().map(ts),
            entry.is_current,
            entry.change_reason,
        ],
    )?;
    Ok(())
}

fn merge_in_transaction(
    conn: &mut Connection,
    supplier: &SupplierRef,
    record: &CanonicalRecord,
    tolerance: Decimal,
    checkpoint: Option<&Checkpoint>,
) -> Result<MergeOutcome> {
    let sku = record
        .supplier_sku
        .as_deref()
        .ok_or_else(|| IngestError::Merge("record has no SKU".into()))?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = Utc::now();

    let (product, action) = match find_product(&tx, &supplier.supplier_id, sku)? {
        Some(mut product) => {
            apply_attributes(&mut product, supplier, record, now);
            (product, MergeAction::Updated)
        }
        None => {
            let product = new_product(supplier, record, now)
                .ok_or_else(|| IngestError::Merge("record has no SKU".into()))?;
            (product, MergeAction::Inserted)
        }
    };
    upsert_product(&tx, &product)?;

    let current = current_price(&tx, product.id)?;
    let price_change = match plan_price(product.id, current.as_ref(), record, tolerance, now) {
        PricePlan::Keep(change) => change,
        PricePlan::Open { close, entry, change } => {
            if let Some(close) = close {
                tx.execute(
                    "UPDATE price_history SET is_current = 0, valid_to = ?1 WHERE id = ?2",
                    params![ts(&now), close.to_string()],
                )?;
            }
            insert_price(&tx, &entry)?;
            change
        }
    };

    if let Some(cp) = checkpoint {
        let updated = tx.execute(
            "UPDATE import_progress
             SET watermark_row = MAX(watermark_row, ?1),
                 processed_rows = processed_rows + 1,
                 status = 'in_progress',
                 updated_at = ?2
             WHERE run_id = ?3 AND filename = ?4",
            params![cp.row as i64, ts(&now), cp.run_id, cp.filename],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls the merge back
            return Err(IngestError::Merge(format!(
                "no progress row for run {} file {}",
                cp.run_id, cp.filename
            )));
        }
    }

    tx.commit()?;
    Ok(MergeOutcome {
        product_id: product.id,
        action,
        price_change,
    })
}

/// SQLite-backed canonical store. Every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        conn.execute_batch(SCHEMA)?;
        info!("🗄️ Opened pricelist store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| IngestError::Merge("sqlite connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn merge_record(
        &self,
        supplier: &SupplierRef,
        record: &CanonicalRecord,
        tolerance: Decimal,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<MergeOutcome> {
        let supplier = supplier.clone();
        let record = record.clone();
        let checkpoint = checkpoint.cloned();
        let outcome = self
            .with_conn(move |conn| {
                merge_in_transaction(conn, &supplier, &record, tolerance, checkpoint.as_ref())
            })
            .await?;
        debug!("Merged product {} ({:?})", outcome.product_id, outcome.action);
        Ok(outcome)
    }

    async fn get_product(&self, supplier_id: &str, supplier_sku: &str) -> Result<Option<SupplierProduct>> {
        let supplier_id = supplier_id.to_string();
        let supplier_sku = supplier_sku.to_string();
        self.with_conn(move |conn| find_product(conn, &supplier_id, &supplier_sku))
            .await
    }

    async fn list_products(&self, supplier_id: &str) -> Result<Vec<SupplierProduct>> {
        let supplier_id = supplier_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM supplier_product WHERE supplier_id = ?1 ORDER BY supplier_sku",
                PRODUCT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![supplier_id], ProductRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ProductRow::decode).collect()
        })
        .await
    }

    async fn price_history(&self, product_id: Uuid) -> Result<Vec<PriceHistoryEntry>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM price_history WHERE product_id = ?1 ORDER BY valid_from, rowid",
                HISTORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![product_id.to_string()], HistoryRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(HistoryRow::decode).collect()
        })
        .await
    }

    async fn get_progress(&self, run_id: &str, filename: &str) -> Result<Option<ImportProgress>> {
        let run_id = run_id.to_string();
        let filename = filename.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM import_progress WHERE run_id = ?1 AND filename = ?2",
                PROGRESS_COLUMNS
            );
            conn.query_row(&sql, params![run_id, filename], ProgressRow::read)
                .optional()?
                .map(ProgressRow::decode)
                .transpose()
        })
        .await
    }

    async fn save_progress(&self, progress: &ImportProgress) -> Result<()> {
        let progress = progress.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO import_progress (run_id, filename, fingerprint, status, total_rows,
                     processed_rows, watermark_row, last_error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(run_id, filename) DO UPDATE SET
                     fingerprint=excluded.fingerprint,
                     status=excluded.status,
                     total_rows=excluded.total_rows,
                     processed_rows=excluded.processed_rows,
                     watermark_row=MAX(import_progress.watermark_row, excluded.watermark_row),
                     last_error=excluded.last_error,
                     updated_at=excluded.updated_at",
                params![
                    progress.run_id,
                    progress.filename,
                    progress.fingerprint,
                    progress.status.as_str(),
                    progress.total_rows as i64,
                    progress.processed_rows as i64,
                    progress.watermark_row as i64,
                    progress.last_error,
                    ts(&progress.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_progress(&self, run_id: &str) -> Result<Vec<ImportProgress>> {
        let run_id = run_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM import_progress WHERE run_id = ?1 ORDER BY filename",
                PROGRESS_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![run_id], ProgressRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ProgressRow::decode).collect()
        })
        .await
    }

    async fn delete_progress(&self, run_id: &str, filename: &str) -> Result<()> {
        let run_id = run_id.to_string();
        let filename = filename.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM import_progress WHERE run_id = ?1 AND filename = ?2",
                params![run_id, filename],
            )?;
            Ok(())
        })
        .await
    }
}
