use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_ALLOWED_CURRENCIES, DEFAULT_CURRENCY, MAX_CONCURRENCY};
use crate::error::{IngestError, Result};

/// Environment variable that overrides `[storage].database_path`
pub const DATABASE_ENV_VAR: &str = "PRICELIST_DB";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub reader: ReaderConfig,
    pub merge: MergeConfig,
    pub run: RunConfig,
    pub storage: StorageConfig,
}

/// What to do when the same SKU appears more than once in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    Error,
    #[default]
    Warning,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub require_sku: bool,
    pub require_name: bool,
    /// When false, rows without any price are importable
    pub require_price: bool,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub allowed_currencies: Vec<String>,
    pub default_currency: String,
    pub duplicate_handling: DuplicatePolicy,
    pub auto_generate_sku: bool,
    /// Applied to every parsed price before bounds checks
    pub price_multiplier: Decimal,
    /// Optional regular expression every SKU must match
    pub sku_pattern: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_sku: true,
            require_name: true,
            require_price: true,
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            allowed_currencies: DEFAULT_ALLOWED_CURRENCIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            duplicate_handling: DuplicatePolicy::Warning,
            auto_generate_sku: false,
            price_multiplier: Decimal::ONE,
            sku_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Physical rows scanned for a header in workbooks
    pub max_header_scan_rows: usize,
    /// Non-empty cells a workbook row needs to qualify as the header
    pub min_header_cells: usize,
    /// Field delimiter for delimited text
    pub delimiter: char,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_header_scan_rows: 10,
            min_header_cells: 3,
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Price changes at or below this amount do not open a new history entry
    pub price_change_tolerance: Decimal,
    pub merge_timeout_secs: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            price_change_tolerance: dec!(0.01),
            merge_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Files processed in parallel, clamped to 1..=8
    pub concurrency: usize,
    pub file_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            file_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pricelist.db"),
        }
    }
}

impl RunConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                IngestError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        if let Ok(db) = std::env::var(DATABASE_ENV_VAR) {
            if !db.trim().is_empty() {
                config.storage.database_path = PathBuf::from(db);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject option combinations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let v = &self.validation;
        if v.min_price < Decimal::ZERO {
            return Err(IngestError::Config("min_price must not be negative".into()));
        }
        if v.max_price < v.min_price {
            return Err(IngestError::Config(format!(
                "max_price ({}) is below min_price ({})",
                v.max_price, v.min_price
            )));
        }
        if v.price_multiplier <= Decimal::ZERO {
            return Err(IngestError::Config(
                "price_multiplier must be greater than zero".into(),
            ));
        }
        if v.default_currency.trim().len() != 3 {
            return Err(IngestError::Config(format!(
                "default_currency '{}' is not a 3-letter code",
                v.default_currency
            )));
        }
        if let Some(pattern) = &v.sku_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                IngestError::Config(format!("sku_pattern is not a valid expression: {}", e))
            })?;
        }
        if self.merge.price_change_tolerance < Decimal::ZERO {
            return Err(IngestError::Config(
                "price_change_tolerance must not be negative".into(),
            ));
        }
        if self.reader.max_header_scan_rows == 0 {
            return Err(IngestError::Config(
                "max_header_scan_rows must be at least 1".into(),
            ));
        }
        if self.reader.min_header_cells == 0 {
            return Err(IngestError::Config(
                "min_header_cells must be at least 1".into(),
            ));
        }
        if !self.reader.delimiter.is_ascii() {
            return Err(IngestError::Config("delimiter must be an ASCII character".into()));
        }
        if self.run.file_timeout_secs == 0 || self.merge.merge_timeout_secs == 0 {
            return Err(IngestError::Config("timeouts must be at least one second".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_validator_defaults() {
        let config = Config::default();
        assert!(config.validation.require_sku);
        assert_eq!(config.validation.min_price, dec!(0.01));
        assert_eq!(config.validation.max_price, dec!(1000000));
        assert_eq!(config.validation.duplicate_handling, DuplicatePolicy::Warning);
        assert_eq!(config.validation.default_currency, "ZAR");
        assert_eq!(config.reader.max_header_scan_rows, 10);
        assert_eq!(config.reader.min_header_cells, 3);
        assert_eq!(config.run.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [validation]
            duplicate_handling = "error"
            price_multiplier = "1.15"

            [run]
            concurrency = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.validation.duplicate_handling, DuplicatePolicy::Error);
        assert_eq!(config.validation.price_multiplier, dec!(1.15));
        assert!(config.validation.require_name);
        assert_eq!(config.run.effective_concurrency(), 8);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.validation.max_price = dec!(0.001);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_sku_pattern() {
        let mut config = Config::default();
        config.validation.sku_pattern = Some("([A-Z".to_string());
        assert!(config.validate().is_err());
    }
}
