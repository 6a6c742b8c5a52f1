use std::fmt::Write;

use crate::constants::{REPORT_ERROR_EXAMPLES, REPORT_WARNING_LIST_LIMIT};
use crate::pipeline::processing::batch::BatchResult;

use super::{IssueKind, ValidationIssue};

fn group_by_kind<'a>(issues: &'a [ValidationIssue]) -> Vec<(IssueKind, Vec<&'a ValidationIssue>)> {
    let mut groups: Vec<(IssueKind, Vec<&ValidationIssue>)> = Vec::new();
    for issue in issues {
        match groups.iter_mut().find(|(kind, _)| *kind == issue.kind) {
            Some((_, members)) => members.push(issue),
            None => groups.push((issue.kind, vec![issue])),
        }
    }
    groups
}

fn heading(kind: IssueKind) -> String {
    kind.as_str().replace('_', " ").to_uppercase()
}

fn percent(part: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        ((part as f64 / total as f64) * 100.0).round() as usize
    }
}

pub fn recommendation(score: u8) -> &'static str {
    if score >= 80 {
        "✅ **Excellent quality** - Ready for import with minimal cleanup"
    } else if score >= 60 {
        "⚠️ **Good quality** - Minor issues to address before import"
    } else if score >= 40 {
        "⚠️ **Fair quality** - Several issues need attention"
    } else {
        "❌ **Poor quality** - Significant cleanup required before import"
    }
}

/// Render the markdown validation report for one batch
pub fn render_report(result: &BatchResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Price List Validation Report: {} ({})\n",
        result.supplier_id, result.source_file
    );
    let _ = writeln!(out, "**Analysis Date:** {}", result.analyzed_at.to_rfc3339());
    let _ = writeln!(out, "**Quality Score:** {}/100\n", result.quality_score);

    let _ = writeln!(out, "## Summary Statistics");
    let _ = writeln!(out, "- **Total Records:** {}", result.total);
    let _ = writeln!(
        out,
        "- **Valid Records:** {} ({}%)",
        result.valid,
        percent(result.valid, result.total)
    );
    let _ = writeln!(
        out,
        "- **Invalid Records:** {} ({}%)",
        result.invalid,
        percent(result.invalid, result.total)
    );
    let _ = writeln!(out, "- **Records with Warnings:** {}", result.with_warnings);
    let _ = writeln!(out, "- **Duplicate Records:** {}", result.duplicates);
    if result.malformed_lines > 0 {
        let _ = writeln!(out, "- **Skipped Malformed Lines:** {}", result.malformed_lines);
    }
    let _ = writeln!(out, "- **Missing Required Fields:** {}", result.stats.missing_required_fields);
    let _ = writeln!(out, "- **Price Errors:** {}", result.stats.price_validation_errors);
    let _ = writeln!(out, "- **SKU Errors:** {}\n", result.stats.sku_validation_errors);

    if !result.errors.is_empty() {
        let _ = writeln!(out, "## Validation Errors ({})", result.errors.len());
        for (kind, members) in group_by_kind(&result.errors) {
            let _ = writeln!(out, "\n### {} ({})", heading(kind), members.len());
            for issue in members.iter().take(REPORT_ERROR_EXAMPLES) {
                match issue.row {
                    Some(row) => {
                        let _ = writeln!(out, "- Row {}: {}", row, issue.message);
                    }
                    None => {
                        let _ = writeln!(out, "- {}", issue.message);
                    }
                }
            }
            if members.len() > REPORT_ERROR_EXAMPLES {
                let _ = writeln!(
                    out,
                    "- ... and {} more similar errors",
                    members.len() - REPORT_ERROR_EXAMPLES
                );
            }
        }
    }

    if !result.warnings.is_empty() {
        let _ = writeln!(out, "\n## Validation Warnings ({})", result.warnings.len());
        for (kind, members) in group_by_kind(&result.warnings) {
            let _ = writeln!(out, "\n### {} ({})", heading(kind), members.len());
            if members.len() <= REPORT_WARNING_LIST_LIMIT {
                for issue in &members {
                    let _ = writeln!(out, "- {}", issue.message);
                }
            } else {
                let _ = writeln!(out, "- {} records affected", members.len());
                let _ = writeln!(out, "- Example: {}", members[0].message);
            }
        }
    }

    let _ = writeln!(out, "\n## Recommendations");
    let _ = writeln!(out, "{}", recommendation(result.quality_score));
    out
}
