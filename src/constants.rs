/// Constants shared by the reader, normalizer and validator stages

// Currency codes accepted by default and used when a row names none
pub const DEFAULT_CURRENCY: &str = "ZAR";
pub const DEFAULT_ALLOWED_CURRENCIES: &[&str] = &["ZAR", "USD", "EUR", "GBP"];

/// Currency codes stripped from price cells before number parsing
pub const KNOWN_CURRENCY_CODES: &[&str] = &[
    "ZAR", "USD", "EUR", "GBP", "JPY", "INR", "AUD", "CAD", "SEK", "CHF", "PLN", "RUB", "KRW",
    "THB", "ILS", "NGN", "GHS",
];

/// Currency symbols stripped from price cells before number parsing
pub const CURRENCY_SYMBOLS: &[char] = &[
    'R', '$', '€', '£', '¥', '₹', '₽', '₩', '฿', '₪', '₦', '₵',
];

// Text length caps applied by the normalizer
pub const MAX_SKU_LEN: usize = 100;
pub const MAX_NAME_LEN: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_TEXT_LEN: usize = 255;

// Descriptive-field completeness thresholds
pub const MIN_NAME_LEN: usize = 3;
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// Valid UPC/EAN/GTIN lengths
pub const BARCODE_LENGTHS: &[usize] = &[8, 12, 13, 14];

/// Prefix for surrogate SKUs generated when a row has none
pub const GENERATED_SKU_PREFIX: &str = "AUTO-";

/// How many examples of each error type a validation report lists
pub const REPORT_ERROR_EXAMPLES: usize = 10;
/// Warning groups up to this size are listed in full in a validation report
pub const REPORT_WARNING_LIST_LIMIT: usize = 5;

// Upper bound for file-level parallelism
pub const MAX_CONCURRENCY: usize = 8;

/// Namespace for deterministic surrogate SKUs
pub const SKU_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f1c_2a4e_9b3d_4c11_8a0e_52d7_c3f9_a14b);
