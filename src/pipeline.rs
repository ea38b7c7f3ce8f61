// src/pipeline.rs
//! Stage entry points. Each stage reads its input from disk, so any of them
//! can be re-run alone once the previous one has produced its file.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, instrument};

use crate::{
    config::PipelineConfig,
    output::{read_records, write_records, zip_file},
    process::{aggregate::QuarterlyTotal, ingest::Ingestor},
    registry::{self, EnrichedRow},
    summary::{self, SummaryRow},
    validate::run_validation,
};

/// Ingest every source file, write the consolidated totals (plus zip) and
/// split them into valid and invalid rows. Returns the valid totals.
#[instrument(level = "info", skip_all, fields(input = %cfg.input_dir.display()))]
pub fn run_ingest(cfg: &PipelineConfig) -> Result<Vec<QuarterlyTotal>> {
    if !cfg.input_dir.is_dir() {
        bail!("input directory {} does not exist", cfg.input_dir.display());
    }
    let paths = cfg.paths();

    let outcome = Ingestor::new(cfg).ingest_all(&cfg.input_dir)?;
    let totals = outcome.totals.drain();

    let totals_file = paths.totals_file();
    write_records(&totals_file, &totals)?;
    zip_file(&totals_file)?;
    info!(keys = totals.len(), file = %totals_file.display(), "totals written");

    run_validation(&paths, &totals_file)
}

/// Join the validated totals on disk with the registry at `registry_file`.
pub fn run_enrich(cfg: &PipelineConfig, registry_file: &Path) -> Result<Vec<EnrichedRow>> {
    let paths = cfg.paths();
    let valid_file = paths.valid_totals_file();
    let totals: Vec<QuarterlyTotal> = read_records(&valid_file)
        .with_context(|| format!("enrichment needs {}; run ingest first", valid_file.display()))?;
    registry::run_enrichment(&paths, registry_file, &totals)
        .with_context(|| format!("enrichment aborted; {} is still valid", valid_file.display()))
}

/// Summarize the enriched file on disk.
pub fn run_summarize(cfg: &PipelineConfig) -> Result<Vec<SummaryRow>> {
    let paths = cfg.paths();
    let enriched_file = paths.enriched_file();
    let rows: Vec<EnrichedRow> = read_records(&enriched_file)
        .with_context(|| format!("summary needs {}; run enrich first", enriched_file.display()))?;
    summary::run_summary(&paths, &rows)
}
