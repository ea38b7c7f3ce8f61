// src/output/tables.rs
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::OUTPUT_DELIMITER;
use crate::process::RowBatch;

/// Serialize `rows` to a semicolon CSV at `path`, replacing it atomically.
/// The header comes from the row type's field names. Returns bytes written.
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<u64> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let tmp_path = tmp_sibling(path);
    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let mut wtr = WriterBuilder::new()
            .delimiter(OUTPUT_DELIMITER)
            .has_headers(true)
            .from_writer(BufWriter::new(file));
        for row in rows {
            wtr.serialize(row)
                .with_context(|| format!("writing row to {}", tmp_path.display()))?;
        }
        wtr.flush()
            .with_context(|| format!("flushing {}", tmp_path.display()))?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;

    let bytes = fs::metadata(path)?.len();
    debug!(path = %path.display(), rows = rows.len(), bytes, "wrote table");
    Ok(bytes)
}

/// Read a semicolon CSV written by [`write_records`].
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, rec)| rec.with_context(|| format!("{} record {}", path.display(), i + 1)))
        .collect()
}

/// Appends filtered batches to one output file, header once.
/// The file is only created when the first non-empty batch arrives.
pub struct BatchWriter {
    path: PathBuf,
    writer: Option<Writer<BufWriter<File>>>,
    rows: u64,
}

impl BatchWriter {
    /// Removes any previous output at `path` so reruns start clean.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("removing stale output {}", path.display()))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer: None,
            rows: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RowBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if self.writer.is_none() {
            self.writer = Some(self.open(&batch.headers)?);
        }
        if let Some(wtr) = self.writer.as_mut() {
            for row in &batch.rows {
                wtr.write_record(row)
                    .with_context(|| format!("writing {}", self.path.display()))?;
            }
            self.rows += batch.len() as u64;
        }
        Ok(())
    }

    fn open(&self, headers: &[String]) -> Result<Writer<BufWriter<File>>> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let file = File::create(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        let mut w = WriterBuilder::new()
            .delimiter(OUTPUT_DELIMITER)
            .flexible(true)
            .from_writer(BufWriter::new(file));
        w.write_record(headers)
            .with_context(|| format!("writing header to {}", self.path.display()))?;
        Ok(w)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and return the output size, or `None` when nothing was written.
    pub fn finish(self) -> Result<Option<u64>> {
        match self.writer {
            Some(mut w) => {
                w.flush()
                    .with_context(|| format!("flushing {}", self.path.display()))?;
                drop(w);
                Ok(Some(fs::metadata(&self.path)?.len()))
            }
            None => Ok(None),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    parent_dir(path).join(format!(".{}.tmp", name))
}
