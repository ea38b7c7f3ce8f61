// src/summary.rs
use anyhow::Result;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::{
    config::StagePaths,
    output::{write_records, zip_file},
    process::utils::round_money,
    registry::{EnrichedRow, MatchStatus},
};

/// Statistics for one (name, region) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub name: String,
    pub region: String,
    pub total: Decimal,
    pub mean: Decimal,
    /// Sample standard deviation; `None` below two observations.
    pub std_dev: Option<Decimal>,
    pub count: u64,
}

/// Group matched rows by (name, region), largest total first.
pub fn summarize(rows: &[EnrichedRow]) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(String, String), Vec<Decimal>> = BTreeMap::new();
    for row in rows {
        if row.match_status != MatchStatus::Matched {
            continue;
        }
        let name = row.name.as_deref().unwrap_or("").trim();
        let region = row.region.as_deref().unwrap_or("").trim().to_uppercase();
        if name.is_empty() || region.is_empty() {
            continue;
        }
        groups
            .entry((name.to_string(), region))
            .or_default()
            .push(row.expense_total);
    }

    let mut out: Vec<SummaryRow> = groups
        .into_iter()
        .filter_map(|((name, region), values)| {
            let Some(stats) = Stats::of(&values) else {
                warn!(name = %name, region = %region, "group total overflows; group skipped");
                return None;
            };
            Some(SummaryRow {
                name,
                region,
                total: round_money(stats.total),
                mean: round_money(stats.mean),
                std_dev: stats.std_dev.map(round_money),
                count: values.len() as u64,
            })
        })
        .collect();

    // BTreeMap order already gives (name, region) ascending; stable sort keeps it for ties
    out.sort_by(|a, b| b.total.cmp(&a.total));
    out
}

struct Stats {
    total: Decimal,
    mean: Decimal,
    std_dev: Option<Decimal>,
}

impl Stats {
    /// `None` when the total overflows. A spread too wide to square leaves `std_dev` undefined.
    fn of(values: &[Decimal]) -> Option<Self> {
        let n = Decimal::from(values.len() as u64);
        let total = values
            .iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
        let mean = if values.is_empty() {
            Decimal::ZERO
        } else {
            total.checked_div(n)?
        };
        let std_dev = if values.len() < 2 {
            None
        } else {
            values
                .iter()
                .try_fold(Decimal::ZERO, |acc, v| {
                    let d = v.checked_sub(mean)?;
                    acc.checked_add(d.checked_mul(d)?)
                })
                .and_then(|squares| squares.checked_div(n - Decimal::ONE))
                .and_then(|variance| variance.sqrt())
        };
        Some(Self {
            total,
            mean,
            std_dev,
        })
    }
}

/// Write the summary file and its zip copy.
#[instrument(level = "info", skip_all)]
pub fn run_summary(paths: &StagePaths, rows: &[EnrichedRow]) -> Result<Vec<SummaryRow>> {
    let summary = summarize(rows);
    let file = paths.summary_file();
    write_records(&file, &summary)?;
    let archive = zip_file(&file)?;

    let matched = rows
        .iter()
        .filter(|r| r.match_status == MatchStatus::Matched)
        .count();
    info!(
        processed = rows.len(),
        matched,
        skipped = rows.len() - matched,
        groups = summary.len(),
        archive = %archive.display(),
        "summary complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{output::read_records, process::utils::Quarter, registry::RegistryStatus};
    use std::str::FromStr;
    use tempfile::tempdir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(name: Option<&str>, region: Option<&str>, amount: &str, status: MatchStatus) -> EnrichedRow {
        EnrichedRow {
            tax_id: Some("1".into()),
            name: name.map(String::from),
            registration_id: Some("1".into()),
            category: Some("X".into()),
            region: region.map(String::from),
            year: 2025,
            quarter: Quarter::new(1).unwrap(),
            expense_total: dec(amount),
            match_status: status,
            registry_status: Some(RegistryStatus::Clean),
        }
    }

    #[test]
    fn groups_and_computes_sample_statistics() {
        let rows = vec![
            row(Some("Op A"), Some("sp "), "10.00", MatchStatus::Matched),
            row(Some(" Op A"), Some("SP"), "20.00", MatchStatus::Matched),
            row(Some("Op A"), Some("SP"), "30.00", MatchStatus::Matched),
            row(Some("Op B"), Some("RJ"), "100.00", MatchStatus::Matched),
            row(Some("Op C"), Some("MG"), "999.00", MatchStatus::NoRegistryMatch),
            row(None, Some("MG"), "5.00", MatchStatus::Matched),
            row(Some("Op D"), Some(""), "5.00", MatchStatus::Matched),
        ];
        let out = summarize(&rows);
        assert_eq!(out.len(), 2);

        assert_eq!(out[0].name, "Op B");
        assert_eq!(out[0].total, dec("100.00"));
        assert_eq!(out[0].count, 1);
        assert_eq!(out[0].std_dev, None);

        let a = &out[1];
        assert_eq!((a.name.as_str(), a.region.as_str()), ("Op A", "SP"));
        assert_eq!(a.total, dec("60.00"));
        assert_eq!(a.mean, dec("20.00"));
        assert_eq!(a.count, 3);
        assert_eq!(a.std_dev, Some(dec("10.00")));
    }

    #[test]
    fn ties_break_on_name_then_region() {
        let rows = vec![
            row(Some("B"), Some("SP"), "50.00", MatchStatus::Matched),
            row(Some("A"), Some("SP"), "50.00", MatchStatus::Matched),
            row(Some("A"), Some("RJ"), "50.00", MatchStatus::Matched),
        ];
        let order: Vec<(String, String)> = summarize(&rows)
            .into_iter()
            .map(|r| (r.name, r.region))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A".to_string(), "RJ".to_string()),
                ("A".to_string(), "SP".to_string()),
                ("B".to_string(), "SP".to_string()),
            ]
        );
    }

    #[test]
    fn overflowing_group_is_skipped_not_fatal() {
        let max = "79228162514264337593543950335";
        let rows = vec![
            row(Some("Big"), Some("SP"), max, MatchStatus::Matched),
            row(Some("Big"), Some("SP"), max, MatchStatus::Matched),
            row(Some("Wide"), Some("RJ"), "0.01", MatchStatus::Matched),
            row(Some("Wide"), Some("RJ"), "50000000000000000000", MatchStatus::Matched),
        ];
        let out = summarize(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Wide");
        assert_eq!(out[0].count, 2);
        assert_eq!(out[0].std_dev, None);
    }

    #[test]
    fn single_observation_writes_empty_std_dev() -> Result<()> {
        let dir = tempdir()?;
        let paths = StagePaths::new(dir.path());
        run_summary(&paths, &[row(Some("Op"), Some("ba"), "12.345", MatchStatus::Matched)])?;

        let text = std::fs::read_to_string(paths.summary_file())?;
        assert_eq!(text, "name;region;total;mean;std_dev;count\nOp;BA;12.35;12.35;;1\n");
        assert!(paths.summary.join("aggregated_expenses.zip").exists());

        let back: Vec<SummaryRow> = read_records(&paths.summary_file())?;
        assert_eq!(back[0].std_dev, None);
        Ok(())
    }
}
