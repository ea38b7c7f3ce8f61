// src/registry/enrich.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::dedup::{dedup_entries, RegistryEntry, RegistryStatus, ResolvedEntry};
use crate::process::{aggregate::QuarterlyTotal, utils::Quarter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    /// The entity id maps to no tax id in the registry.
    NoTaxId,
    /// A tax id was found but no deduplicated registry row carries it.
    NoRegistryMatch,
}

/// One totals row joined with its registry representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub tax_id: Option<String>,
    pub name: Option<String>,
    pub registration_id: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub year: u16,
    pub quarter: Quarter,
    pub expense_total: Decimal,
    pub match_status: MatchStatus,
    pub registry_status: Option<RegistryStatus>,
}

/// Deduplicated registry plus the registration id → tax id relation.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tax_by_registration: HashMap<String, String>,
    resolved: BTreeMap<String, ResolvedEntry>,
}

impl Registry {
    /// `entries` must already exclude rows without a tax id.
    pub fn from_entries(entries: &[RegistryEntry]) -> Self {
        let mut tax_by_registration = HashMap::new();
        for e in entries {
            let reg = e.registration_id.trim();
            if reg.is_empty() || e.tax_id.is_empty() {
                continue;
            }
            // first occurrence wins
            tax_by_registration
                .entry(reg.to_string())
                .or_insert_with(|| e.tax_id.clone());
        }
        Self {
            tax_by_registration,
            resolved: dedup_entries(entries),
        }
    }

    pub fn resolved(&self) -> &BTreeMap<String, ResolvedEntry> {
        &self.resolved
    }

    pub fn tax_id_for(&self, registration_id: &str) -> Option<&str> {
        self.tax_by_registration
            .get(registration_id.trim())
            .map(String::as_str)
    }

    /// Every input row comes back, tagged; unmatched rows carry only what is known.
    pub fn enrich(&self, totals: &[QuarterlyTotal]) -> Vec<EnrichedRow> {
        totals.iter().map(|t| self.enrich_one(t)).collect()
    }

    fn enrich_one(&self, total: &QuarterlyTotal) -> EnrichedRow {
        let mut row = EnrichedRow {
            tax_id: None,
            name: None,
            registration_id: None,
            category: None,
            region: None,
            year: total.year,
            quarter: total.quarter,
            expense_total: total.expense_total,
            match_status: MatchStatus::NoTaxId,
            registry_status: None,
        };

        let tax_id = match self.tax_id_for(&total.entity_id) {
            Some(t) => t,
            None => return row,
        };
        row.tax_id = Some(tax_id.to_string());

        match self.resolved.get(tax_id) {
            Some(r) => {
                row.name = r.name.clone();
                row.registration_id = r.registration_id.clone();
                row.category = r.category.clone();
                row.region = r.region.clone();
                row.match_status = MatchStatus::Matched;
                row.registry_status = Some(r.status);
            }
            None => row.match_status = MatchStatus::NoRegistryMatch,
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(reg: &str, tax: &str, name: &str, cat: &str, uf: &str) -> RegistryEntry {
        RegistryEntry {
            registration_id: reg.into(),
            tax_id: tax.into(),
            name: Some(name.into()),
            category: cat.into(),
            region: uf.into(),
        }
    }

    fn total(entity: &str, amount: &str) -> QuarterlyTotal {
        QuarterlyTotal {
            entity_id: entity.into(),
            year: 2025,
            quarter: Quarter::new(1).unwrap(),
            expense_total: Decimal::from_str(amount).unwrap(),
        }
    }

    #[test]
    fn joins_through_tax_id() {
        let registry = Registry::from_entries(&[
            entry("000123", "12345678000190", "Op A", "Medicina de Grupo", "SP"),
            entry("000777", "12345678000190", "Op A", "Medicina de Grupo", "SP"),
        ]);
        let rows = registry.enrich(&[total("000777", "10.00"), total("999", "5.00")]);

        assert_eq!(rows.len(), 2);
        let matched = &rows[0];
        assert_eq!(matched.match_status, MatchStatus::Matched);
        assert_eq!(matched.tax_id.as_deref(), Some("12345678000190"));
        assert_eq!(matched.region.as_deref(), Some("SP"));
        // two registration ids under one tax id disagree
        assert_eq!(
            matched.registry_status,
            Some(RegistryStatus::ConflictingDuplicate)
        );
        assert_eq!(matched.registration_id.as_deref(), Some("000123"));

        let missing = &rows[1];
        assert_eq!(missing.match_status, MatchStatus::NoTaxId);
        assert_eq!(missing.registry_status, None);
        assert_eq!(missing.expense_total, Decimal::from_str("5.00").unwrap());
    }

    #[test]
    fn first_registration_mapping_wins() {
        let registry = Registry::from_entries(&[
            entry("1", "111", "A", "X", "SP"),
            entry("1", "222", "B", "X", "RJ"),
        ]);
        assert_eq!(registry.tax_id_for(" 1 "), Some("111"));
        assert_eq!(registry.resolved().len(), 2);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::NoRegistryMatch).unwrap(),
            "\"no_registry_match\""
        );
        assert_eq!(
            serde_json::to_string(&RegistryStatus::ConflictingDuplicate).unwrap(),
            "\"conflicting_duplicate\""
        );
    }
}
