use std::collections::{HashMap, HashSet};

use crate::config::DuplicatePolicy;
use crate::pipeline::processing::quality_gate::{IssueKind, Severity, ValidationIssue};

/// One sighting of a SKU inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    /// Position of the record in the batch
    pub index: usize,
    pub row: usize,
    pub name: Option<String>,
}

/// All sightings of a SKU seen more than once
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub sku: String,
    pub occurrences: Vec<Occurrence>,
}

/// Per-batch SKU registry. Each batch owns its own; nothing is shared across files.
#[derive(Debug, Default)]
pub struct DuplicateRegistry {
    seen: HashMap<String, Vec<Occurrence>>,
    order: Vec<String>,
}

impl DuplicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting; returns true when the SKU was already registered
    pub fn register(&mut self, sku: &str, occurrence: Occurrence) -> bool {
        match self.seen.get_mut(sku) {
            Some(existing) => {
                existing.push(occurrence);
                true
            }
            None => {
                self.order.push(sku.to_string());
                self.seen.insert(sku.to_string(), vec![occurrence]);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Groups with more than one occurrence, in first-sighting order
    pub fn groups(&self) -> Vec<DuplicateGroup> {
        self.order
            .iter()
            .filter_map(|sku| {
                let occurrences = self.seen.get(sku)?;
                (occurrences.len() > 1).then(|| DuplicateGroup {
                    sku: sku.clone(),
                    occurrences: occurrences.clone(),
                })
            })
            .collect()
    }
}

/// What the duplicate policy decided for a batch
#[derive(Debug, Default, Clone)]
pub struct DuplicateResolution {
    /// Batch positions that must not be merged
    pub excluded: HashSet<usize>,
    /// Batch positions that become invalid records
    pub invalidated: HashSet<usize>,
    pub issues: Vec<ValidationIssue>,
    /// Occurrences beyond the first, summed over all groups
    pub duplicates: usize,
}

pub struct DuplicateDetector {
    policy: DuplicatePolicy,
}

impl DuplicateDetector {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn resolve(&self, registry: &DuplicateRegistry, source_file: &str) -> DuplicateResolution {
        let mut resolution = DuplicateResolution::default();

        for group in registry.groups() {
            resolution.duplicates += group.occurrences.len() - 1;
            let rows: Vec<usize> = group.occurrences.iter().map(|o| o.row).collect();
            let listing: Vec<String> = group
                .occurrences
                .iter()
                .map(|o| format!("Row {}: {}", o.row, o.name.as_deref().unwrap_or("No name")))
                .collect();
            let message = format!(
                "Duplicate SKU found: {} ({} occurrences, rows {})",
                group.sku,
                group.occurrences.len(),
                rows.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
            );

            match self.policy {
                DuplicatePolicy::Error => {
                    for o in &group.occurrences {
                        resolution.excluded.insert(o.index);
                        resolution.invalidated.insert(o.index);
                    }
                    let mut issue = ValidationIssue::new(IssueKind::DuplicateSku, Severity::Error, Some("sku"), message)
                        .suggest("Make SKUs unique across all records")
                        .suggest("Consider adding supplier prefix to SKUs");
                    issue.suggestions.extend(listing);
                    issue.source_file = source_file.to_string();
                    issue.row = rows.first().copied();
                    issue.related_rows = rows;
                    resolution.issues.push(issue);
                }
                DuplicatePolicy::Warning => {
                    for o in group.occurrences.iter().skip(1) {
                        resolution.excluded.insert(o.index);
                    }
                    let mut issue = ValidationIssue::new(IssueKind::DuplicateSku, Severity::Warning, Some("sku"), message)
                        .suggest("Review duplicate records - only the first will be imported");
                    issue.suggestions.extend(listing);
                    issue.source_file = source_file.to_string();
                    issue.row = rows.first().copied();
                    issue.related_rows = rows.into_iter().skip(1).collect();
                    resolution.issues.push(issue);
                }
                DuplicatePolicy::Ignore => {
                    for o in group.occurrences.iter().skip(1) {
                        resolution.excluded.insert(o.index);
                    }
                }
            }
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_x_three_times() -> DuplicateRegistry {
        let mut registry = DuplicateRegistry::new();
        let rows = [("X", 2), ("Y", 3), ("X", 5), ("X", 9)];
        for (index, (sku, row)) in rows.iter().enumerate() {
            registry.register(
                sku,
                Occurrence {
                    index,
                    row: *row,
                    name: None,
                },
            );
        }
        registry
    }

    #[test]
    fn test_error_policy_rejects_every_occurrence() {
        let resolution = DuplicateDetector::new(DuplicatePolicy::Error)
            .resolve(&registry_with_x_three_times(), "a.csv");
        assert_eq!(resolution.issues.len(), 1);
        let issue = &resolution.issues[0];
        assert!(issue.is_error());
        assert_eq!(issue.related_rows, vec![2, 5, 9]);
        assert_eq!(resolution.excluded, HashSet::from([0, 2, 3]));
        assert_eq!(resolution.duplicates, 2);
    }

    #[test]
    fn test_warning_policy_keeps_first() {
        let resolution = DuplicateDetector::new(DuplicatePolicy::Warning)
            .resolve(&registry_with_x_three_times(), "a.csv");
        assert_eq!(resolution.issues.len(), 1);
        assert_eq!(resolution.issues[0].severity, Severity::Warning);
        assert_eq!(resolution.issues[0].related_rows, vec![5, 9]);
        assert_eq!(resolution.excluded, HashSet::from([2, 3]));
        assert!(resolution.invalidated.is_empty());
    }

    #[test]
    fn test_ignore_policy_is_silent() {
        let resolution = DuplicateDetector::new(DuplicatePolicy::Ignore)
            .resolve(&registry_with_x_three_times(), "a.csv");
        assert!(resolution.issues.is_empty());
        assert_eq!(resolution.excluded, HashSet::from([2, 3]));
        assert_eq!(resolution.duplicates, 2);
    }

    #[test]
    fn test_registries_are_independent() {
        let mut first = DuplicateRegistry::new();
        let mut second = DuplicateRegistry::new();
        let occ = Occurrence {
            index: 0,
            row: 2,
            name: None,
        };
        assert!(!first.register("X", occ.clone()));
        assert!(!second.register("X", occ.clone()));
        assert!(first.register("X", occ));
        assert!(second.groups().is_empty());
    }
}
