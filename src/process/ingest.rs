// src/process/ingest.rs
use anyhow::{bail, Context, Result};
use chrono::Utc;
use glob::glob;
use rayon::prelude::*;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use super::{
    aggregate::{
        aggregate_batch, Accumulator, AccumulatorSink, AggregateColumns, SharedAccumulator,
    },
    filter::RowFilter,
    normalize::normalize_batch,
    reader::{BatchReader, SourceKind},
    utils::extract_period_from_filename,
};
use crate::{
    config::{AggregateConfig, PipelineConfig},
    output::{write_manifest, BatchWriter, FileOutcome, ManifestEntry},
};

/// Result of ingesting a whole input directory.
#[derive(Debug)]
pub struct IngestOutcome {
    pub totals: Accumulator,
    /// One entry per input file, sorted by source name.
    pub entries: Vec<ManifestEntry>,
}

/// One input file and the name of its filtered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceJob {
    pub path: PathBuf,
    /// Path relative to the input directory, `/`-separated.
    pub source: String,
    pub output_name: String,
}

/// Drives read → normalize → filter → write → aggregate for each source file.
#[derive(Debug, Clone)]
pub struct Ingestor {
    filter: RowFilter,
    aggregate: AggregateConfig,
    chunk_rows: usize,
    parallel: bool,
    filtered_dir: PathBuf,
    manifest_path: PathBuf,
}

impl Ingestor {
    pub fn new(cfg: &PipelineConfig) -> Self {
        let paths = cfg.paths();
        Self {
            filter: RowFilter::new(&cfg.filter),
            aggregate: cfg.aggregate.clone(),
            chunk_rows: cfg.chunk_rows,
            parallel: cfg.parallel,
            manifest_path: paths.manifest_file(),
            filtered_dir: paths.filtered,
        }
    }

    /// Ingest every tabular file under `input_dir`. Per-file failures are logged
    /// and recorded in the manifest; they never stop the other files.
    #[instrument(level = "info", skip(self, input_dir), fields(input = %input_dir.display()))]
    pub fn ingest_all(&self, input_dir: &Path) -> Result<IngestOutcome> {
        let start = Instant::now();
        let jobs = plan_jobs(input_dir, discover_sources(input_dir)?);
        info!(files = jobs.len(), parallel = self.parallel, "starting ingest");

        let (totals, mut entries) = if self.parallel {
            let shared = SharedAccumulator::new();
            let entries: Vec<ManifestEntry> = jobs
                .par_iter()
                .map(|job| {
                    let mut sink = &shared;
                    self.ingest_logged(job, &mut sink)
                })
                .collect();
            (shared.into_inner(), entries)
        } else {
            let mut acc = Accumulator::new();
            let entries: Vec<ManifestEntry> = jobs
                .iter()
                .map(|job| self.ingest_logged(job, &mut acc))
                .collect();
            (acc, entries)
        };
        entries.sort_by(|a, b| a.source.cmp(&b.source));

        write_manifest(&self.manifest_path, &entries)?;

        let ok = entries.iter().filter(|e| e.is_ok()).count();
        info!(
            files = entries.len(),
            ok,
            skipped = entries.len() - ok,
            rows_read = entries.iter().map(|e| e.rows_read).sum::<u64>(),
            rows_kept = entries.iter().map(|e| e.rows_kept).sum::<u64>(),
            rows_aggregated = totals.rows(),
            keys = totals.len(),
            elapsed = ?start.elapsed(),
            "ingest complete"
        );
        Ok(IngestOutcome { totals, entries })
    }

    fn ingest_logged<S: AccumulatorSink>(&self, job: &SourceJob, sink: &mut S) -> ManifestEntry {
        match self.ingest_file(job, sink) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(file = %job.source, error = %format!("{:#}", e), "skipping file");
                ManifestEntry::skipped(job.source.clone(), format!("{:#}", e))
            }
        }
    }

    /// Stream one file. Filtered rows land in `filtered/<output_name>`;
    /// qualifying rows are committed to `sink` one at a time.
    #[instrument(level = "debug", skip(self, job, sink), fields(file = %job.source))]
    pub fn ingest_file<S: AccumulatorSink>(
        &self,
        job: &SourceJob,
        sink: &mut S,
    ) -> Result<ManifestEntry> {
        let reader = BatchReader::open(&job.path, self.chunk_rows)?;
        self.ingest_reader(reader, job, sink)
    }

    fn ingest_reader<S: AccumulatorSink>(
        &self,
        mut reader: BatchReader,
        job: &SourceJob,
        sink: &mut S,
    ) -> Result<ManifestEntry> {
        let source = job.source.clone();
        let file_name = job
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let period = extract_period_from_filename(&file_name);
        if period.is_none() {
            warn!(file = %source, "no quarter token in file name; rows will not be aggregated");
        }

        let format = reader.format();
        let output_name = job.output_name.clone();
        let mut writer = BatchWriter::create(&self.filtered_dir.join(&output_name))?;

        let mut columns: Option<Result<AggregateColumns>> = None;
        let mut rows_aggregated = 0u64;
        let mut rows_rejected = 0u64;

        for batch in reader.by_ref() {
            let mut batch = batch?;
            normalize_batch(&mut batch);
            let cols = columns.get_or_insert_with(|| AggregateColumns::locate(&batch, &self.aggregate));

            let kept = self.filter.apply(batch);
            writer.write_batch(&kept)?;

            if let (Some(period), Ok(cols)) = (period, cols.as_ref()) {
                let stats = aggregate_batch(&kept, *cols, period, sink);
                rows_aggregated += stats.committed;
                rows_rejected += stats.rejected;
            }
        }

        let stats = reader.stats();
        let rows_kept = writer.rows();
        let output_bytes = writer.finish()?;

        let outcome = match (period, columns) {
            (None, _) => FileOutcome::Skipped {
                reason: "no quarter token in file name".into(),
            },
            (Some(_), Some(Err(e))) => {
                warn!(file = %source, error = %e, "required column missing; rows not aggregated");
                FileOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            _ => FileOutcome::Ok,
        };

        debug!(
            file = %source,
            rows_read = stats.rows_read,
            malformed = stats.malformed,
            rows_kept,
            rows_aggregated,
            rows_rejected,
            "file done"
        );

        Ok(ManifestEntry {
            source,
            output: output_bytes.map(|_| output_name),
            encoding: format.map(|f| f.encoding.name().to_string()),
            delimiter: format.map(|f| (f.delimiter as char).to_string()),
            rows_read: stats.rows_read,
            malformed: stats.malformed,
            rows_kept,
            rows_aggregated,
            rows_rejected,
            output_bytes: output_bytes.unwrap_or(0),
            period: period.map(|p| p.to_string()),
            outcome,
            processed_at: Utc::now(),
        })
    }
}

/// Every supported tabular file below `dir`, in path order.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("input directory {} does not exist", dir.display());
    }
    let pattern = format!("{}/**/*", dir.display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad glob pattern {}", pattern))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file() && SourceKind::from_path(p).is_some())
        .collect();
    files.sort();
    Ok(files)
}

/// Pair each source with a filtered-output name unique within the run.
/// `a/1T2025.csv` becomes `a__1T2025_expenses.csv`; non-csv extensions are kept
/// in the name (`1T2025_xlsx_expenses.csv`); leftover clashes get a numeric suffix.
pub fn plan_jobs(input_dir: &Path, files: Vec<PathBuf>) -> Vec<SourceJob> {
    let mut taken: HashSet<String> = HashSet::new();
    files
        .into_iter()
        .map(|path| {
            let source = source_name(input_dir, &path);
            let base = output_base(&source);
            let mut output_name = format!("{}_expenses.csv", base);
            let mut n = 2;
            while !taken.insert(output_name.to_lowercase()) {
                output_name = format!("{}_{}_expenses.csv", base, n);
                n += 1;
            }
            SourceJob {
                path,
                source,
                output_name,
            }
        })
        .collect()
}

fn source_name(input_dir: &Path, path: &Path) -> String {
    path.strip_prefix(input_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn output_base(source: &str) -> String {
    let path = Path::new(source);
    let stem = path.with_extension("").to_string_lossy().replace('/', "__");
    let stem = if stem.is_empty() { "input".to_string() } else { stem };
    match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
        None => stem,
        Some(ext) if ext == "csv" => stem,
        Some(ext) => format!("{}_{}", stem, ext),
    }
}
