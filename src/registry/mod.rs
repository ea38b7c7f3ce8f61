// src/registry/mod.rs
pub mod columns;
pub mod dedup;
pub mod enrich;

use anyhow::{bail, Context, Result};
use std::{collections::BTreeMap, path::Path};
use tracing::{info, instrument, warn};

use crate::{
    config::StagePaths,
    output::write_records,
    process::{
        aggregate::QuarterlyTotal,
        normalize::normalize_batch,
        reader::read_whole,
        utils::{clean_str, digits_only},
        RowBatch,
    },
};
use columns::detect_columns;
pub use dedup::{RegistryEntry, RegistryStatus, ResolvedEntry};
pub use enrich::{EnrichedRow, MatchStatus, Registry};

/// Read the cached registry file. Any error here aborts enrichment only.
#[instrument(level = "info", skip(path), fields(registry = %path.display()))]
pub fn load_registry(path: &Path) -> Result<Registry> {
    let mut table = read_whole(path).with_context(|| format!("reading registry {}", path.display()))?;
    if table.headers.len() < 2 {
        bail!(
            "registry {} parsed into {} column(s); delimiter not recognized",
            path.display(),
            table.headers.len()
        );
    }
    normalize_batch(&mut table);
    let cols = detect_columns(&table.headers)?;

    let total = table.len();
    let entries: Vec<RegistryEntry> = table
        .rows
        .iter()
        .map(|row| {
            let cell = |i: usize| clean_str(RowBatch::cell(row, i));
            RegistryEntry {
                registration_id: cell(cols.registration_id),
                tax_id: digits_only(RowBatch::cell(row, cols.tax_id)),
                name: cols.name.map(cell).filter(|n| !n.is_empty()),
                category: cell(cols.category),
                region: cell(cols.region),
            }
        })
        .filter(|e| !e.tax_id.is_empty())
        .collect();

    let registry = Registry::from_entries(&entries);
    info!(
        rows = total,
        without_tax_id = total - entries.len(),
        tax_ids = registry.resolved().len(),
        conflicting = registry
            .resolved()
            .values()
            .filter(|r| r.status == RegistryStatus::ConflictingDuplicate)
            .count(),
        "registry loaded"
    );
    Ok(registry)
}

/// Join `totals` against the registry and write the enriched file.
#[instrument(level = "info", skip_all)]
pub fn run_enrichment(
    paths: &StagePaths,
    registry_file: &Path,
    totals: &[QuarterlyTotal],
) -> Result<Vec<EnrichedRow>> {
    let registry = load_registry(registry_file)?;
    let rows = registry.enrich(totals);
    write_records(&paths.enriched_file(), &rows)?;

    let mut by_match: BTreeMap<MatchStatus, usize> = BTreeMap::new();
    let mut by_registry: BTreeMap<Option<RegistryStatus>, usize> = BTreeMap::new();
    for r in &rows {
        *by_match.entry(r.match_status).or_default() += 1;
        *by_registry.entry(r.registry_status).or_default() += 1;
    }
    if !rows.is_empty() && !by_match.contains_key(&MatchStatus::Matched) {
        warn!("no totals row matched the registry");
    }
    info!(rows = rows.len(), ?by_match, ?by_registry, "enrichment complete");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::utils::Quarter;
    use encoding_rs::WINDOWS_1252;
    use rust_decimal::Decimal;
    use std::{fs, str::FromStr};
    use tempfile::tempdir;

    const CADOP: &str = "Registro_ANS;CNPJ;Razao_Social;Nome_Fantasia;Modalidade;Cidade;UF\n\
        000123;12.345.678/0001-90;OPERADORA A;A;Medicina de Grupo;São Paulo;SP\n\
        000124;12.345.678/0001-90;OPERADORA A;A;Medicina De Grupo;São Paulo;SP\n\
        000200;;SEM CNPJ;;Cooperativa Médica;Recife;PE\n\
        000300;98765432000110;OPERADORA C;C;Autogestão;Curitiba;PR\n";

    fn total(entity: &str) -> QuarterlyTotal {
        QuarterlyTotal {
            entity_id: entity.into(),
            year: 2025,
            quarter: Quarter::new(1).unwrap(),
            expense_total: Decimal::from_str("100.00").unwrap(),
        }
    }

    #[test]
    fn latin1_registry_is_enriched_and_written() -> Result<()> {
        let dir = tempdir()?;
        let paths = StagePaths::new(dir.path());
        let (bytes, _, _) = WINDOWS_1252.encode(CADOP);
        fs::create_dir_all(&paths.registry)?;
        fs::write(paths.registry_file(), &bytes)?;

        let rows = run_enrichment(
            &paths,
            &paths.registry_file(),
            &[total("000124"), total("000200"), total("000300")],
        )?;
        assert_eq!(rows[0].match_status, MatchStatus::Matched);
        assert_eq!(rows[0].tax_id.as_deref(), Some("12345678000190"));
        assert_eq!(rows[0].category.as_deref(), Some("Medicina De Grupo"));
        assert_eq!(rows[0].registry_status, Some(RegistryStatus::ConflictingDuplicate));
        assert_eq!(rows[1].match_status, MatchStatus::NoTaxId);
        assert_eq!(rows[2].registry_status, Some(RegistryStatus::Clean));

        let written = fs::read_to_string(paths.enriched_file())?;
        assert!(written.starts_with(
            "tax_id;name;registration_id;category;region;year;quarter;expense_total;match_status;registry_status\n"
        ));
        assert!(written.contains(";no_tax_id;\n"));
        Ok(())
    }

    #[test]
    fn single_column_registry_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cadop.csv");
        fs::write(&path, "registro_ans\n1\n")?;
        assert!(load_registry(&path).is_err());
        Ok(())
    }

    #[test]
    fn missing_region_column_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cadop.csv");
        fs::write(&path, "registro_ans;cnpj;modalidade\n1;11;X\n")?;
        let err = load_registry(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("region"));
        Ok(())
    }
}
