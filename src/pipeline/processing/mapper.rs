use std::collections::{BTreeMap, HashMap};

use crate::types::{CanonicalField, RawRow, RawValue};

/// One entry of the keyword table: a header maps to `field` when its
/// lower-cased text contains any `include` keyword and no `exclude` keyword.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: CanonicalField,
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

impl FieldRule {
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        !header.is_empty()
            && self.include.iter().any(|k| header.contains(k))
            && !self.exclude.iter().any(|k| header.contains(k))
    }
}

/// Ordered keyword table used when no override names a column
pub const DEFAULT_FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: CanonicalField::Sku,
        include: &[
            "sku", "item code", "product code", "stock code", "part number", "part no",
            "partno", "code", "article", "model",
        ],
        exclude: &["barcode", "ean", "upc", "gtin"],
    },
    FieldRule {
        field: CanonicalField::Name,
        include: &[
            "product name", "item name", "name", "title", "product", "item", "description",
        ],
        exclude: &["code", "sku", "number", "item no", "brand", "category", "price", "cost"],
    },
    FieldRule {
        field: CanonicalField::Description,
        include: &["description", "desc", "detail"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::Brand,
        include: &["brand", "manufacturer", "make", "mfg", "vendor"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::Category,
        include: &["category", "group", "dept", "department", "class", "type"],
        exclude: &["price", "cost"],
    },
    FieldRule {
        field: CanonicalField::CostPrice,
        include: &[
            "cost", "dealer", "nett", "net price", "ex vat", "excl", "unit price", "price",
        ],
        exclude: &[
            "retail", "rrp", "rsp", "list", "recommended", "wholesale", "trade", "incl",
            "inc vat",
        ],
    },
    FieldRule {
        field: CanonicalField::RetailPrice,
        include: &["retail", "rrp", "rsp", "recommended", "list price", "selling price", "sell price"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::WholesalePrice,
        include: &["wholesale", "trade"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::Currency,
        include: &["currency", "curr", "ccy"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::StockStatus,
        include: &["stock", "availability", "available", "qty", "quantity", "soh"],
        exclude: &["code"],
    },
    FieldRule {
        field: CanonicalField::Barcode,
        include: &["barcode", "ean", "upc", "gtin"],
        exclude: &[],
    },
    FieldRule {
        field: CanonicalField::EffectiveDate,
        include: &["effective", "valid from", "date"],
        exclude: &[],
    },
];

/// Canonical field -> source column index for one header row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    pub columns: BTreeMap<CanonicalField, usize>,
    /// Override labels that matched no header
    pub unresolved_overrides: Vec<(CanonicalField, String)>,
}

impl ColumnMapping {
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn is_mapped(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }
}

/// A raw row projected onto canonical fields
#[derive(Debug, Clone)]
pub struct MappedRow {
    pub source_file: String,
    pub row_number: usize,
    pub values: BTreeMap<CanonicalField, RawValue>,
}

impl MappedRow {
    pub fn get(&self, field: CanonicalField) -> &RawValue {
        self.values.get(&field).unwrap_or(&RawValue::Empty)
    }
}

pub struct FieldMapper {
    rules: Vec<FieldRule>,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMapper {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_FIELD_RULES.to_vec(),
        }
    }

    pub fn with_rules(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// Resolve every canonical field against `headers`, overrides first.
    ///
    /// Two fields may resolve to the same column; nothing here prevents it.
    pub fn map_headers(
        &self,
        headers: &[String],
        overrides: &HashMap<CanonicalField, String>,
    ) -> ColumnMapping {
        let mut mapping = ColumnMapping::default();

        for (field, label) in overrides {
            let wanted = label.trim().to_lowercase();
            match headers.iter().position(|h| h.trim().to_lowercase() == wanted) {
                Some(index) => {
                    mapping.columns.insert(*field, index);
                }
                None => mapping.unresolved_overrides.push((*field, label.clone())),
            }
        }
        mapping.unresolved_overrides.sort();

        for rule in &self.rules {
            if mapping.columns.contains_key(&rule.field) {
                continue;
            }
            if let Some(index) = headers.iter().position(|h| rule.matches(h)) {
                mapping.columns.insert(rule.field, index);
            }
        }

        mapping
    }

    pub fn apply(&self, mapping: &ColumnMapping, row: &RawRow) -> MappedRow {
        let values = mapping
            .columns
            .iter()
            .map(|(field, index)| (*field, row.value_at(*index).clone()))
            .collect();
        MappedRow {
            source_file: row.source_file.clone(),
            row_number: row.row_number,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_typical_supplier_headers() {
        let mapper = FieldMapper::new();
        let mapping = mapper.map_headers(
            &headers(&[
                "Stock Code",
                "Product Name",
                "Brand",
                "Cost Ex VAT",
                "Cost Inc VAT",
                "RRP",
                "Barcode",
            ]),
            &HashMap::new(),
        );
        assert_eq!(mapping.column(CanonicalField::Sku), Some(0));
        assert_eq!(mapping.column(CanonicalField::Name), Some(1));
        assert_eq!(mapping.column(CanonicalField::Brand), Some(2));
        assert_eq!(mapping.column(CanonicalField::CostPrice), Some(3));
        assert_eq!(mapping.column(CanonicalField::RetailPrice), Some(5));
        assert_eq!(mapping.column(CanonicalField::Barcode), Some(6));
        assert!(!mapping.is_mapped(CanonicalField::StockStatus));
        assert!(!mapping.is_mapped(CanonicalField::Category));
    }

    #[test]
    fn test_first_header_wins() {
        let mapper = FieldMapper::new();
        let mapping = mapper.map_headers(&headers(&["Code", "SKU", "Description"]), &HashMap::new());
        assert_eq!(mapping.column(CanonicalField::Sku), Some(0));
        // Description doubles as name when no name column exists
        assert_eq!(mapping.column(CanonicalField::Name), Some(2));
        assert_eq!(mapping.column(CanonicalField::Description), Some(2));
    }

    #[test]
    fn test_barcode_is_not_taken_as_sku() {
        let mapper = FieldMapper::new();
        let mapping = mapper.map_headers(&headers(&["EAN Code", "Part Number", "Name"]), &HashMap::new());
        assert_eq!(mapping.column(CanonicalField::Sku), Some(1));
        assert_eq!(mapping.column(CanonicalField::Barcode), Some(0));
    }

    #[test]
    fn test_override_takes_precedence() {
        let mapper = FieldMapper::new();
        let mut overrides = HashMap::new();
        overrides.insert(CanonicalField::CostPrice, "Dealer Special".to_string());
        overrides.insert(CanonicalField::Brand, "Missing".to_string());
        let mapping = mapper.map_headers(
            &headers(&["SKU", "Name", "Price", "dealer special"]),
            &overrides,
        );
        assert_eq!(mapping.column(CanonicalField::CostPrice), Some(3));
        assert_eq!(
            mapping.unresolved_overrides,
            vec![(CanonicalField::Brand, "Missing".to_string())]
        );
    }

    #[test]
    fn test_apply_projects_values() {
        let mapper = FieldMapper::new();
        let hdrs = headers(&["SKU", "Name"]);
        let mapping = mapper.map_headers(&hdrs, &HashMap::new());
        let row = RawRow {
            source_file: "a.csv".into(),
            row_number: 2,
            fields: vec![
                crate::types::RawField {
                    label: "SKU".into(),
                    value: RawValue::text("A1"),
                },
                crate::types::RawField {
                    label: "Name".into(),
                    value: RawValue::text("Amp"),
                },
            ],
        };
        let mapped = mapper.apply(&mapping, &row);
        assert_eq!(mapped.get(CanonicalField::Sku), &RawValue::text("A1"));
        assert_eq!(mapped.get(CanonicalField::CostPrice), &RawValue::Empty);
    }
}
