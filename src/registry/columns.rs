// src/registry/columns.rs
use anyhow::{bail, Result};
use std::fmt;
use tracing::debug;

/// Registry attributes the enrichment needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryField {
    RegistrationId,
    TaxId,
    Name,
    Category,
    Region,
}

impl fmt::Display for RegistryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistryField::RegistrationId => "registration id",
            RegistryField::TaxId => "tax id",
            RegistryField::Name => "name",
            RegistryField::Category => "category",
            RegistryField::Region => "region",
        };
        f.write_str(s)
    }
}

/// Candidate substrings for one field, most specific first.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub field: RegistryField,
    pub candidates: &'static [&'static str],
}

pub const RULES: [ColumnRule; 5] = [
    ColumnRule {
        field: RegistryField::RegistrationId,
        candidates: &["registro", "reg"],
    },
    ColumnRule {
        field: RegistryField::TaxId,
        candidates: &["cnpj"],
    },
    ColumnRule {
        field: RegistryField::Name,
        candidates: &["razao", "nome"],
    },
    ColumnRule {
        field: RegistryField::Category,
        candidates: &["modalidade"],
    },
    // no generic fallback: `regiao_de_comercializacao` is a sales area, not a state
    ColumnRule {
        field: RegistryField::Region,
        candidates: &["uf"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMatch {
    Found { index: usize, header: String },
    NotFound,
}

impl ColumnMatch {
    pub fn index(&self) -> Option<usize> {
        match self {
            ColumnMatch::Found { index, .. } => Some(*index),
            ColumnMatch::NotFound => None,
        }
    }
}

impl ColumnRule {
    /// First header containing the earliest candidate that matches anything.
    pub fn apply(&self, headers: &[String]) -> ColumnMatch {
        for needle in self.candidates {
            if let Some(index) = headers.iter().position(|h| h.contains(needle)) {
                return ColumnMatch::Found {
                    index,
                    header: headers[index].clone(),
                };
            }
        }
        ColumnMatch::NotFound
    }
}

/// Resolved registry layout. Only the name column is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryColumns {
    pub registration_id: usize,
    pub tax_id: usize,
    pub name: Option<usize>,
    pub category: usize,
    pub region: usize,
}

/// Expects normalized headers.
pub fn detect_columns(headers: &[String]) -> Result<RegistryColumns> {
    let matches: Vec<(RegistryField, ColumnMatch)> =
        RULES.iter().map(|r| (r.field, r.apply(headers))).collect();
    debug!(?matches, "registry column detection");

    let find = |field: RegistryField| {
        matches
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, m)| m.index())
    };

    let missing: Vec<String> = [
        RegistryField::RegistrationId,
        RegistryField::TaxId,
        RegistryField::Category,
        RegistryField::Region,
    ]
    .into_iter()
    .filter(|f| find(*f).is_none())
    .map(|f| f.to_string())
    .collect();

    match (
        find(RegistryField::RegistrationId),
        find(RegistryField::TaxId),
        find(RegistryField::Category),
        find(RegistryField::Region),
    ) {
        (Some(registration_id), Some(tax_id), Some(category), Some(region)) => Ok(RegistryColumns {
            registration_id,
            tax_id,
            name: find(RegistryField::Name),
            category,
            region,
        }),
        _ => bail!(
            "registry is missing required columns: {} (headers: {:?})",
            missing.join(", "),
            headers
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_cadastral_layout() -> Result<()> {
        let h = headers(&[
            "registro_ans",
            "cnpj",
            "razao_social",
            "nome_fantasia",
            "modalidade",
            "cidade",
            "uf",
            "regiao_de_comercializacao",
        ]);
        let cols = detect_columns(&h)?;
        assert_eq!(cols.registration_id, 0);
        assert_eq!(cols.tax_id, 1);
        assert_eq!(cols.name, Some(2));
        assert_eq!(cols.category, 4);
        assert_eq!(cols.region, 6);
        Ok(())
    }

    #[test]
    fn specific_term_beats_generic_fallback() {
        let h = headers(&["reg_operadora", "numero_registro"]);
        let rule = RULES[0];
        assert_eq!(
            rule.apply(&h),
            ColumnMatch::Found {
                index: 1,
                header: "numero_registro".into()
            }
        );
        assert_eq!(rule.apply(&headers(&["cod"])), ColumnMatch::NotFound);
    }

    #[test]
    fn name_is_optional_region_is_not() {
        let cols = detect_columns(&headers(&["registro_ans", "cnpj", "modalidade", "uf"])).unwrap();
        assert_eq!(cols.name, None);

        let err = detect_columns(&headers(&["registro_ans", "cnpj", "modalidade"])).unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn sales_area_is_not_taken_for_region() {
        let err = detect_columns(&headers(&[
            "registro_ans",
            "cnpj",
            "modalidade",
            "regiao_de_comercializacao",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }
}
