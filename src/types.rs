use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single cell as delivered by a source reader.
///
/// Workbook engines may hand back already-parsed numbers; when the reader
/// still has the formatted text for such a cell it is kept in `original`
/// so the normalizer can treat the text as the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Text(String),
    Number { value: f64, original: Option<String> },
    Empty,
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            RawValue::Empty
        } else {
            RawValue::Text(s)
        }
    }

    pub fn number(value: f64) -> Self {
        RawValue::Number {
            value,
            original: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number { .. } => false,
        }
    }

    /// Text rendering used for labels and text fields
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Empty => None,
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Number { original: Some(s), .. } => Some(s.clone()),
            RawValue::Number { value, .. } => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    Some(format!("{}", *value as i64))
                } else {
                    Some(value.to_string())
                }
            }
        }
    }
}

/// One labelled cell of a raw row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub label: String,
    pub value: RawValue,
}

/// A data row exactly as read from the source, before field mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    /// Originating file identifier
    pub source_file: String,
    /// 1-based physical row (workbook) or line (delimited text) number
    pub row_number: usize,
    /// Cells in header order
    pub fields: Vec<RawField>,
}

impl RawRow {
    pub fn value_at(&self, index: usize) -> &RawValue {
        self.fields
            .get(index)
            .map(|f| &f.value)
            .unwrap_or(&RawValue::Empty)
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.value.is_empty())
    }
}

/// The fixed business fields every supplier format is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Sku,
    Name,
    Description,
    Brand,
    Category,
    CostPrice,
    RetailPrice,
    WholesalePrice,
    Currency,
    StockStatus,
    Barcode,
    EffectiveDate,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 12] = [
        CanonicalField::Sku,
        CanonicalField::Name,
        CanonicalField::Description,
        CanonicalField::Brand,
        CanonicalField::Category,
        CanonicalField::CostPrice,
        CanonicalField::RetailPrice,
        CanonicalField::WholesalePrice,
        CanonicalField::Currency,
        CanonicalField::StockStatus,
        CanonicalField::Barcode,
        CanonicalField::EffectiveDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Sku => "sku",
            CanonicalField::Name => "name",
            CanonicalField::Description => "description",
            CanonicalField::Brand => "brand",
            CanonicalField::Category => "category",
            CanonicalField::CostPrice => "cost_price",
            CanonicalField::RetailPrice => "retail_price",
            CanonicalField::WholesalePrice => "wholesale_price",
            CanonicalField::Currency => "currency",
            CanonicalField::StockStatus => "stock_status",
            CanonicalField::Barcode => "barcode",
            CanonicalField::EffectiveDate => "effective_date",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let wanted = name.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|f| f.as_str() == wanted)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mapped, normalized representation of one pricelist line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub supplier_sku: Option<String>,
    /// True when `supplier_sku` is a generated surrogate key
    pub sku_generated: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
    pub currency: Option<String>,
    pub stock_status: Option<String>,
    pub barcode: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub source_row: usize,
    pub source_file: String,
}

impl CanonicalRecord {
    /// First non-null of cost, retail and wholesale price
    pub fn effective_price(&self) -> Option<Decimal> {
        self.cost_price.or(self.retail_price).or(self.wholesale_price)
    }

    pub fn has_any_price(&self) -> bool {
        self.effective_price().is_some()
    }
}

/// Supplier and organization a source is imported for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierRef {
    pub supplier_id: String,
    pub organization_id: Option<String>,
}

impl SupplierRef {
    pub fn new(supplier_id: impl Into<String>) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            organization_id: None,
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

/// Physical layout of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Workbook,
    DelimitedText,
}

impl SourceFormat {
    /// Guess the format from a file name's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SourceFormat::Workbook),
            "csv" | "txt" | "tsv" => Some(SourceFormat::DelimitedText),
            _ => None,
        }
    }
}

/// Where the rows of a source come from
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// A file on disk
    Path(PathBuf),
    /// Bytes already buffered by an upload handler
    Bytes { name: String, data: Vec<u8> },
    /// Rows extracted by the caller; the first row of `rows` is data, not a header
    Rows {
        name: String,
        headers: Vec<String>,
        rows: Vec<Vec<RawValue>>,
    },
}

/// Everything the pipeline needs to import one source
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub input: SourceInput,
    /// Explicit format; inferred from the file name when absent
    pub format: Option<SourceFormat>,
    pub supplier: SupplierRef,
    /// Canonical field -> header label, taking precedence over keyword mapping
    pub mapping_override: HashMap<CanonicalField, String>,
}

impl SourceDescriptor {
    pub fn from_path(path: impl Into<PathBuf>, supplier: SupplierRef) -> Self {
        Self {
            input: SourceInput::Path(path.into()),
            format: None,
            supplier,
            mapping_override: HashMap::new(),
        }
    }

    pub fn from_rows(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<RawValue>>,
        supplier: SupplierRef,
    ) -> Self {
        Self {
            input: SourceInput::Rows {
                name: name.into(),
                headers,
                rows,
            },
            format: None,
            supplier,
            mapping_override: HashMap::new(),
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_override(mut self, field: CanonicalField, header: impl Into<String>) -> Self {
        self.mapping_override.insert(field, header.into());
        self
    }

    /// File identifier used in progress tracking and issue context
    pub fn name(&self) -> String {
        match &self.input {
            SourceInput::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| p.to_string_lossy().to_string()),
            SourceInput::Bytes { name, .. } | SourceInput::Rows { name, .. } => name.clone(),
        }
    }

    pub fn resolved_format(&self) -> Option<SourceFormat> {
        if self.format.is_some() {
            return self.format;
        }
        match &self.input {
            SourceInput::Path(p) => SourceFormat::from_path(p),
            SourceInput::Bytes { name, .. } => SourceFormat::from_path(Path::new(name)),
            SourceInput::Rows { .. } => None,
        }
    }
}
