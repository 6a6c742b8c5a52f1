use crate::types::RawValue;

/// Cleaned text and whether it had to be cut
#[derive(Debug, Clone, PartialEq)]
pub struct CleanText {
    pub value: String,
    pub truncated: bool,
}

/// Trim, collapse internal whitespace and cap at `max_chars`
pub fn clean_text(raw: &str, max_chars: usize) -> Option<CleanText> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= max_chars {
        return Some(CleanText {
            value: collapsed,
            truncated: false,
        });
    }
    let value: String = collapsed.chars().take(max_chars).collect();
    Some(CleanText {
        value: value.trim_end().to_string(),
        truncated: true,
    })
}

pub fn clean_raw(raw: &RawValue, max_chars: usize) -> Option<CleanText> {
    raw.as_text().and_then(|t| clean_text(&t, max_chars))
}

/// Identifiers keep every character but lose whitespace runs and case
pub fn normalize_sku(raw: &RawValue) -> Option<String> {
    raw.as_text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_is_collapsed() {
        let cleaned = clean_text("  Widget \t  Pro\n", 255).unwrap();
        assert_eq!(cleaned.value, "Widget Pro");
        assert!(!cleaned.truncated);
        assert!(clean_text(" \n ", 255).is_none());
    }

    #[test]
    fn test_long_text_is_capped() {
        let long = "é".repeat(600);
        let cleaned = clean_text(&long, 500).unwrap();
        assert_eq!(cleaned.value.chars().count(), 500);
        assert!(cleaned.truncated);
    }

    #[test]
    fn test_sku_is_uppercased() {
        assert_eq!(normalize_sku(&RawValue::text(" abc-1 ")), Some("ABC-1".into()));
        assert_eq!(normalize_sku(&RawValue::number(12345.0)), Some("12345".into()));
        assert_eq!(normalize_sku(&RawValue::Empty), None);
    }
}
