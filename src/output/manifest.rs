// src/output/manifest.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, io::Write, path::Path};

/// How one input file ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Ok,
    Skipped { reason: String },
}

/// Per-file record of the normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source: String,
    /// File name under `filtered/`; absent when no row was kept.
    pub output: Option<String>,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub rows_read: u64,
    pub malformed: u64,
    pub rows_kept: u64,
    pub rows_aggregated: u64,
    pub rows_rejected: u64,
    pub output_bytes: u64,
    pub period: Option<String>,
    pub outcome: FileOutcome,
    pub processed_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn skipped(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: None,
            encoding: None,
            delimiter: None,
            rows_read: 0,
            malformed: 0,
            rows_kept: 0,
            rows_aggregated: 0,
            rows_rejected: 0,
            output_bytes: 0,
            period: None,
            outcome: FileOutcome::Skipped {
                reason: reason.into(),
            },
            processed_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == FileOutcome::Ok
    }
}

/// Write the manifest atomically: to a tmp file, then rename over the original.
pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "manifest.json".into());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));
    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;

    // pretty-print with a trailing newline
    serde_json::to_writer_pretty(&mut tmp, entries).context("serializing manifest")?;
    tmp.write_all(b"\n")?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}
