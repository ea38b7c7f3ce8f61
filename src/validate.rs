// src/validate.rs
use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};
use tracing::{info, instrument};

use crate::{
    config::StagePaths,
    output::{read_records, write_records},
    process::{aggregate::QuarterlyTotal, utils::Quarter},
};

const YEARS: std::ops::RangeInclusive<u16> = 2000..=2100;

/// A totals row as text, before any field is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTotal {
    pub entity_id: String,
    pub year: String,
    pub quarter: String,
    pub expense_total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTotal {
    pub entity_id: String,
    pub year: String,
    pub quarter: String,
    pub expense_total: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Validation {
    pub valid: Vec<QuarterlyTotal>,
    pub invalid: Vec<RejectedTotal>,
}

/// Check one row; the error names the first failing rule.
pub fn check_total(raw: &RawTotal) -> std::result::Result<QuarterlyTotal, String> {
    let entity_id = raw.entity_id.trim();
    if entity_id.is_empty() {
        return Err("empty entity_id".into());
    }
    let year: u16 = raw
        .year
        .trim()
        .parse()
        .map_err(|_| format!("year `{}` is not a number", raw.year))?;
    if !YEARS.contains(&year) {
        return Err(format!("year {} outside {}..={}", year, YEARS.start(), YEARS.end()));
    }
    let quarter = Quarter::try_from(raw.quarter.clone()).map_err(|e| e.to_string())?;
    let expense_total = Decimal::from_str(raw.expense_total.trim())
        .map_err(|_| format!("expense_total `{}` is not a number", raw.expense_total))?;
    if expense_total <= Decimal::ZERO {
        return Err(format!("expense_total {} is not positive", expense_total));
    }
    Ok(QuarterlyTotal {
        entity_id: entity_id.to_string(),
        year,
        quarter,
        expense_total,
    })
}

pub fn validate_totals(rows: Vec<RawTotal>) -> Validation {
    let mut out = Validation::default();
    for raw in rows {
        match check_total(&raw) {
            Ok(total) => out.valid.push(total),
            Err(reason) => out.invalid.push(RejectedTotal {
                entity_id: raw.entity_id,
                year: raw.year,
                quarter: raw.quarter,
                expense_total: raw.expense_total,
                reason,
            }),
        }
    }
    out
}

/// Read the consolidated totals from disk and split them into valid and invalid files.
#[instrument(level = "info", skip(paths, totals_file), fields(totals = %totals_file.display()))]
pub fn run_validation(paths: &StagePaths, totals_file: &Path) -> Result<Vec<QuarterlyTotal>> {
    let rows: Vec<RawTotal> = read_records(totals_file)?;
    let total = rows.len();
    let Validation { valid, invalid } = validate_totals(rows);

    write_records(&paths.valid_totals_file(), &valid)?;
    write_records(&paths.invalid_totals_file(), &invalid)?;

    info!(
        processed = total,
        valid = valid.len(),
        invalid = invalid.len(),
        "validation complete"
    );
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn raw(e: &str, y: &str, q: &str, v: &str) -> RawTotal {
        RawTotal {
            entity_id: e.into(),
            year: y.into(),
            quarter: q.into(),
            expense_total: v.into(),
        }
    }

    #[test]
    fn rules_reject_each_bad_field() {
        assert!(check_total(&raw("1", "2025", "1T", "10.00")).is_ok());
        assert!(check_total(&raw(" ", "2025", "1T", "10.00")).is_err());
        assert!(check_total(&raw("1", "1999", "1T", "10.00")).is_err());
        assert!(check_total(&raw("1", "2101", "1T", "10.00")).is_err());
        assert!(check_total(&raw("1", "20x5", "1T", "10.00")).is_err());
        assert!(check_total(&raw("1", "2025", "5T", "10.00")).is_err());
        assert!(check_total(&raw("1", "2025", "1T", "0.00")).is_err());
        assert!(check_total(&raw("1", "2025", "1T", "abc")).is_err());
    }

    #[test]
    fn stage_writes_both_files() -> Result<()> {
        let dir = tempdir()?;
        let paths = StagePaths::new(dir.path());
        let totals = dir.path().join("totals.csv");
        fs::write(
            &totals,
            "entity_id;year;quarter;expense_total\n000123;2025;1T;1500.00\n000124;1800;2T;5.00\n",
        )?;

        let valid = run_validation(&paths, &totals)?;
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].entity_id, "000123");

        let invalid: Vec<RejectedTotal> = read_records(&paths.invalid_totals_file())?;
        assert_eq!(invalid.len(), 1);
        assert!(invalid[0].reason.contains("1800"));

        let back: Vec<QuarterlyTotal> = read_records(&paths.valid_totals_file())?;
        assert_eq!(back, valid);
        Ok(())
    }
}
