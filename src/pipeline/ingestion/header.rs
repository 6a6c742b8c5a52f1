use once_cell::sync::Lazy;
use regex::Regex;

/// Identifier-like column labels
const IDENTIFIER_PATTERN: &str =
    r"(?i)sku|product\s*code|item\s*code|stock\s*code|part\s*(no|num)|^code$|^item\s*no\.?$";
/// Price, name or description column labels
const COMPANION_PATTERN: &str =
    r"(?i)price|cost|excluding|including|retail|\brsp\b|\brrp\b|name|description";

pub const DEFAULT_MIN_HEADER_CELLS: usize = 3;

static DEFAULT_GROUPS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [IDENTIFIER_PATTERN, COMPANION_PATTERN]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// A header row has at least `min_cells` non-empty cells, and every group
/// is matched by at least one of them.
///
/// Groups are tested per cell, so a banner sentence that happens to mention
/// "product" and "model" does not qualify.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pub groups: Vec<Regex>,
    pub min_cells: usize,
}

impl Default for HeaderRule {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_HEADER_CELLS)
    }
}

impl HeaderRule {
    pub fn new(min_cells: usize) -> Self {
        Self {
            groups: DEFAULT_GROUPS.clone(),
            min_cells,
        }
    }

    pub fn matches<S: AsRef<str>>(&self, cells: &[S]) -> bool {
        let labels: Vec<&str> = cells
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .collect();
        if labels.is_empty() || labels.len() < self.min_cells {
            return false;
        }
        self.groups
            .iter()
            .all(|group| labels.iter().any(|label| group.is_match(label)))
    }

    /// Index of the first row among the first `max_rows` that matches
    pub fn find<S: AsRef<str>>(&self, rows: &[Vec<S>], max_rows: usize) -> Option<usize> {
        rows.iter()
            .take(max_rows)
            .position(|row| self.matches(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_needs_both_groups() {
        let rule = HeaderRule::default();
        assert!(rule.matches(&["SKU", "Description", "Cost Ex VAT"]));
        assert!(rule.matches(&["Item Code", "Brand", "Retail Price"]));
        assert!(!rule.matches(&["SKU", "Brand", "Category"]));
        assert!(!rule.matches(&["", "  "]));
    }

    #[test]
    fn test_header_needs_enough_cells() {
        let rule = HeaderRule::default();
        assert!(!rule.matches(&["SKU", "Description", ""]));
        assert!(HeaderRule::new(2).matches(&["SKU", "Description", ""]));
    }

    #[test]
    fn test_banner_is_not_a_header() {
        let rule = HeaderRule::default();
        let rows = vec![
            vec!["Pro Audio Product Catalogue - Model Year 2025", "", ""],
            vec!["SKU", "Description", "Cost Ex VAT"],
        ];
        assert_eq!(rule.find(&rows, 10), Some(1));
    }

    #[test]
    fn test_first_matching_row_wins() {
        let rule = HeaderRule::default();
        let rows = vec![
            vec!["ACME Audio Price List", "", ""],
            vec!["Valid from 1 December", "", ""],
            vec!["Item Code", "Product Name", "Price"],
            vec!["Part No", "Description", "Cost"],
        ];
        assert_eq!(rule.find(&rows, 10), Some(2));
    }

    #[test]
    fn test_scan_window_is_bounded() {
        let rule = HeaderRule::default();
        let mut rows: Vec<Vec<&str>> = (0..10).map(|_| vec!["banner"]).collect();
        rows.push(vec!["SKU", "Name", "Price"]);
        assert_eq!(rule.find(&rows, 10), None);
        assert_eq!(rule.find(&rows, 11), Some(10));
    }
}
