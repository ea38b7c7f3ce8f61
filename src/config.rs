// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "ANSLEDGER_CONFIG";

const ENV_PREFIX: &str = "ANSLEDGER_";

/// Public registry of active health-plan operators.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://dadosabertos.ans.gov.br/FTP/PDA/operadoras_de_plano_de_saude_ativas/Relatorio_cadop.csv";

/// How rows are classified as expense/claims lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Account-code prefix when a code column exists, keyword match otherwise.
    #[default]
    Auto,
    /// Account-code prefix only.
    Structural,
    /// Description keywords only.
    Lexical,
    /// Account-code prefix, then narrowed by keywords when a description column exists.
    Refined,
}

impl FromStr for FilterPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(FilterPolicy::Auto),
            "structural" => Ok(FilterPolicy::Structural),
            "lexical" => Ok(FilterPolicy::Lexical),
            "refined" => Ok(FilterPolicy::Refined),
            other => bail!("unknown filter policy `{}`", other),
        }
    }
}

/// Row-filter settings. Keywords are matched case-insensitively.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub policy: FilterPolicy,
    pub keywords: Vec<String>,
    /// Leading characters of an expense/claims account code.
    pub expense_class_prefix: String,
    pub code_columns: Vec<String>,
    pub description_columns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            policy: FilterPolicy::Auto,
            keywords: to_strings(&[
                "despesa",
                "despesas",
                "sinistro",
                "sinistros",
                "evento",
                "eventos",
                "atendimento",
                "atendimentos",
                "procedimento",
                "procedimentos",
                "utilizacao",
                "utilização",
            ]),
            expense_class_prefix: "3".into(),
            code_columns: to_strings(&["cd_conta_contabil", "account_code", "cd_conta"]),
            description_columns: to_strings(&[
                "descricao",
                "ds_descricao",
                "descricao_conta",
                "ds_conta",
                "nome_conta",
                "conta",
                "ds_linha",
                "descricao_linha",
                "description",
            ]),
        }
    }
}

/// Which columns feed the accumulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub entity_columns: Vec<String>,
    pub value_columns: Vec<String>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            entity_columns: to_strings(&["reg_ans", "registro_ans", "entity_id"]),
            value_columns: to_strings(&["vl_saldo_final", "value"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Maximum rows per batch for delimited inputs.
    pub chunk_rows: usize,
    /// Fan files out over a thread pool; the accumulator becomes the only shared state.
    pub parallel: bool,
    pub registry_url: String,
    pub archive_urls: Vec<String>,
    pub archive_index_url: Option<String>,
    pub filter: FilterConfig,
    pub aggregate: AggregateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/extracted"),
            output_dir: PathBuf::from("data"),
            chunk_rows: 50_000,
            parallel: false,
            registry_url: DEFAULT_REGISTRY_URL.into(),
            archive_urls: Vec::new(),
            archive_index_url: None,
            filter: FilterConfig::default(),
            aggregate: AggregateConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional YAML file, then apply `ANSLEDGER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut cfg = match explicit {
            Some(p) => Self::from_yaml_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        cfg.finish()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Apply overrides from a key lookup (keys without the prefix).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INPUT_DIR") {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHUNK_ROWS") {
            self.chunk_rows = v
                .trim()
                .parse()
                .with_context(|| format!("CHUNK_ROWS must be a positive integer, got `{}`", v))?;
        }
        if let Some(v) = lookup("KEYWORDS") {
            self.filter.keywords = split_list(&v);
        }
        if let Some(v) = lookup("FILTER_POLICY") {
            self.filter.policy = v.parse()?;
        }
        if let Some(v) = lookup("REGISTRY_URL") {
            self.registry_url = v;
        }
        if let Some(v) = lookup("ARCHIVE_URLS") {
            self.archive_urls = split_list(&v);
        }
        if let Some(v) = lookup("ARCHIVE_INDEX_URL") {
            self.archive_index_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("PARALLEL") {
            self.parallel = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Validate and canonicalize values after all sources are merged.
    fn finish(&mut self) -> Result<()> {
        if self.chunk_rows == 0 {
            bail!("chunk_rows must be greater than zero");
        }
        self.filter.keywords = self
            .filter
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        debug!(?self, "configuration loaded");
        Ok(())
    }

    pub fn paths(&self) -> StagePaths {
        StagePaths::new(&self.output_dir)
    }
}

/// Output layout for every stage, rooted at `output_dir`.
#[derive(Debug, Clone)]
pub struct StagePaths {
    pub archives: PathBuf,
    pub extracted: PathBuf,
    pub filtered: PathBuf,
    pub totals: PathBuf,
    pub validated: PathBuf,
    pub enriched: PathBuf,
    pub summary: PathBuf,
    pub registry: PathBuf,
}

impl StagePaths {
    pub fn new(root: &Path) -> Self {
        Self {
            archives: root.join("archives"),
            extracted: root.join("extracted"),
            filtered: root.join("filtered"),
            totals: root.join("totals"),
            validated: root.join("validated"),
            enriched: root.join("enriched"),
            summary: root.join("summary"),
            registry: root.join("registry"),
        }
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.filtered.join("_manifest.json")
    }

    pub fn totals_file(&self) -> PathBuf {
        self.totals.join("consolidated_expenses.csv")
    }

    pub fn valid_totals_file(&self) -> PathBuf {
        self.validated.join("valid_expenses.csv")
    }

    pub fn invalid_totals_file(&self) -> PathBuf {
        self.validated.join("invalid_expenses.csv")
    }

    pub fn enriched_file(&self) -> PathBuf {
        self.enriched.join("enriched_expenses.csv")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.summary.join("aggregated_expenses.csv")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.registry.join("Relatorio_cadop.csv")
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn overrides_replace_defaults() -> Result<()> {
        let vars: HashMap<&str, &str> = [
            ("CHUNK_ROWS", "1000"),
            ("KEYWORDS", " Sinistro , EVENTO,,"),
            ("FILTER_POLICY", "lexical"),
            ("PARALLEL", "true"),
        ]
        .into_iter()
        .collect();

        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))?;
        cfg.finish()?;

        assert_eq!(cfg.chunk_rows, 1000);
        assert_eq!(cfg.filter.keywords, vec!["sinistro", "evento"]);
        assert_eq!(cfg.filter.policy, FilterPolicy::Lexical);
        assert!(cfg.parallel);
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        assert!(cfg
            .apply_overrides(|k| (k == "FILTER_POLICY").then(|| "fuzzy".to_string()))
            .is_err());

        let mut cfg = PipelineConfig::default();
        cfg.chunk_rows = 0;
        assert!(cfg.finish().is_err());
    }

    #[test]
    fn yaml_file_fills_missing_fields_with_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "chunk_rows: 10")?;
        writeln!(file, "filter:")?;
        writeln!(file, "  policy: refined")?;

        let cfg = PipelineConfig::from_yaml_file(file.path())?;
        assert_eq!(cfg.chunk_rows, 10);
        assert_eq!(cfg.filter.policy, FilterPolicy::Refined);
        assert_eq!(cfg.filter.expense_class_prefix, "3");
        assert_eq!(cfg.aggregate.value_columns[0], "vl_saldo_final");
        Ok(())
    }
}
