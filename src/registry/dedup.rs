// src/registry/dedup.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One resolvable registry record. `tax_id` holds digits only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub registration_id: String,
    pub tax_id: String,
    pub name: Option<String>,
    pub category: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    Clean,
    ConflictingDuplicate,
}

/// The single entry chosen to stand for every record sharing a tax id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub tax_id: String,
    pub registration_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub status: RegistryStatus,
}

/// Most frequent non-empty value; ties go to the lexicographically smallest.
/// Comparison is case-sensitive.
pub fn representative<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(v).or_default() += 1;
    }
    // ascending key order, so the first maximum is the smallest tied value
    counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (v, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((v, n)),
        })
        .map(|(v, _)| v.to_string())
}

fn distinct_non_empty<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<&str> = values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Collapse entries to one per tax id. Deterministic for a given input set.
pub fn dedup_entries(entries: &[RegistryEntry]) -> BTreeMap<String, ResolvedEntry> {
    let mut groups: BTreeMap<&str, Vec<&RegistryEntry>> = BTreeMap::new();
    for e in entries.iter().filter(|e| !e.tax_id.is_empty()) {
        groups.entry(e.tax_id.as_str()).or_default().push(e);
    }

    groups
        .into_iter()
        .map(|(tax_id, group)| {
            let registration = || group.iter().map(|e| e.registration_id.as_str());
            let name = || group.iter().filter_map(|e| e.name.as_deref());
            let category = || group.iter().map(|e| e.category.as_str());
            let region = || group.iter().map(|e| e.region.as_str());

            let conflicting = distinct_non_empty(registration()) > 1
                || distinct_non_empty(name()) > 1
                || distinct_non_empty(category()) > 1
                || distinct_non_empty(region()) > 1;

            let resolved = ResolvedEntry {
                tax_id: tax_id.to_string(),
                registration_id: representative(registration()),
                name: representative(name()),
                category: representative(category()),
                region: representative(region()),
                status: if conflicting {
                    RegistryStatus::ConflictingDuplicate
                } else {
                    RegistryStatus::Clean
                },
            };
            (tax_id.to_string(), resolved)
        })
        .collect()
}
