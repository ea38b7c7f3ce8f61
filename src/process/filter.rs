// src/process/filter.rs
use tracing::trace;

use super::RowBatch;
use crate::config::{FilterConfig, FilterPolicy};

/// Where the classification signal comes from in a given batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilterColumns {
    code: Option<usize>,
    description: Option<usize>,
}

/// Keeps expense/claims rows according to the configured policy.
#[derive(Debug, Clone)]
pub struct RowFilter {
    policy: FilterPolicy,
    prefix: String,
    keywords: Vec<String>,
    code_columns: Vec<String>,
    description_columns: Vec<String>,
}

impl RowFilter {
    pub fn new(cfg: &FilterConfig) -> Self {
        Self {
            policy: cfg.policy,
            prefix: cfg.expense_class_prefix.clone(),
            keywords: cfg.keywords.iter().map(|k| k.to_lowercase()).collect(),
            code_columns: cfg.code_columns.clone(),
            description_columns: cfg.description_columns.clone(),
        }
    }

    /// Expects canonical headers. Returns the passing subset; a batch lacking
    /// the columns its policy needs yields nothing.
    pub fn apply(&self, batch: RowBatch) -> RowBatch {
        let cols = FilterColumns {
            code: batch.find_column(&self.code_columns),
            description: batch.find_column(&self.description_columns),
        };
        let RowBatch { headers, rows } = batch;
        let before = rows.len();

        let kept: Vec<Vec<String>> = match (self.policy, cols.code, cols.description) {
            (FilterPolicy::Structural, Some(code), _)
            | (FilterPolicy::Auto, Some(code), _)
            | (FilterPolicy::Refined, Some(code), None) => rows
                .into_iter()
                .filter(|r| self.is_expense_code(RowBatch::cell(r, code)))
                .collect(),
            (FilterPolicy::Refined, Some(code), Some(desc)) => rows
                .into_iter()
                .filter(|r| {
                    self.is_expense_code(RowBatch::cell(r, code))
                        && self.has_keyword(RowBatch::cell(r, desc))
                })
                .collect(),
            (FilterPolicy::Lexical, _, Some(desc)) | (FilterPolicy::Auto, None, Some(desc)) => rows
                .into_iter()
                .filter(|r| self.has_keyword(RowBatch::cell(r, desc)))
                .collect(),
            _ => Vec::new(),
        };

        trace!(policy = ?self.policy, ?cols, before, kept = kept.len(), "filtered batch");
        RowBatch {
            headers,
            rows: kept,
        }
    }

    fn is_expense_code(&self, code: &str) -> bool {
        code.trim().trim_matches('"').starts_with(self.prefix.as_str())
    }

    fn has_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(headers: &[&str], rows: &[&[&str]]) -> RowBatch {
        RowBatch {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn filter(policy: FilterPolicy) -> RowFilter {
        let cfg = FilterConfig {
            policy,
            ..FilterConfig::default()
        };
        RowFilter::new(&cfg)
    }

    #[test]
    fn structural_keeps_expense_class_only() {
        let b = batch(
            &["account_code", "entity_id", "value"],
            &[&["31100", "000123", "1.500,00"], &["41000", "000123", "900,00"]],
        );
        let out = filter(FilterPolicy::Auto).apply(b.clone());
        assert_eq!(out.rows, vec![vec!["31100", "000123", "1.500,00"]]);

        let out = filter(FilterPolicy::Structural).apply(b);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn auto_falls_back_to_keywords_without_code_column() {
        let b = batch(
            &["descricao", "valor"],
            &[
                &["EVENTOS INDENIZÁVEIS", "1"],
                &["Receita de contraprestações", "2"],
                &["Sinistros retidos", "3"],
            ],
        );
        let out = filter(FilterPolicy::Auto).apply(b);
        let kept: Vec<&str> = out.rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(kept, vec!["1", "3"]);
    }

    #[test]
    fn structural_is_authoritative_over_description() {
        let b = batch(
            &["cd_conta_contabil", "descricao"],
            &[&["31", "Receitas"], &["41", "Despesas administrativas"]],
        );
        let out = filter(FilterPolicy::Auto).apply(b);
        assert_eq!(out.rows, vec![vec!["31", "Receitas"]]);
    }

    #[test]
    fn refined_requires_both_signals() {
        let b = batch(
            &["cd_conta_contabil", "descricao"],
            &[
                &["31", "Eventos conhecidos"],
                &["32", "Receitas diversas"],
                &["41", "Despesas"],
            ],
        );
        let out = filter(FilterPolicy::Refined).apply(b);
        assert_eq!(out.rows, vec![vec!["31", "Eventos conhecidos"]]);
    }

    #[test]
    fn missing_columns_yield_empty_batch() {
        let b = batch(&["foo", "bar"], &[&["3", "despesa"]]);
        for policy in [
            FilterPolicy::Auto,
            FilterPolicy::Structural,
            FilterPolicy::Lexical,
            FilterPolicy::Refined,
        ] {
            let out = filter(policy).apply(b.clone());
            assert!(out.is_empty(), "{:?} kept rows", policy);
            assert_eq!(out.headers, b.headers);
        }
    }

    #[test]
    fn lexical_ignores_code_column() {
        let b = batch(
            &["cd_conta_contabil", "descricao"],
            &[&["41", "Despesas com eventos"], &["31", "Outras receitas"]],
        );
        let out = filter(FilterPolicy::Lexical).apply(b);
        assert_eq!(out.rows, vec![vec!["41", "Despesas com eventos"]]);
    }
}
