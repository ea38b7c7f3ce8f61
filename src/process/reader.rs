// src/process/reader.rs
use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, ErrorKind, Reader, ReaderBuilder};
use encoding_rs::Encoding;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

use super::{
    sheet,
    sniff::{sniff_format, FileFormat},
    RowBatch,
};

/// Kind of source file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Delimited,
    Spreadsheet,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(SourceKind::Delimited),
            "xlsx" | "xls" => Some(SourceKind::Spreadsheet),
            _ => None,
        }
    }
}

/// Counters kept while reading one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows_read: u64,
    pub malformed: u64,
}

/// Lazy, finite sequence of bounded batches for one file.
/// Spreadsheets yield their whole sheet as a single batch.
pub enum BatchReader {
    Delimited(DelimitedChunks),
    Sheet {
        batch: Option<RowBatch>,
        stats: ReadStats,
    },
}

impl BatchReader {
    /// Open `path` for reading. Each call starts from the top of the file.
    pub fn open(path: &Path, chunk_rows: usize) -> Result<Self> {
        match SourceKind::from_path(path) {
            Some(SourceKind::Delimited) => {
                let format = sniff_format(path);
                Ok(BatchReader::Delimited(DelimitedChunks::open(
                    path, format, chunk_rows,
                )?))
            }
            Some(SourceKind::Spreadsheet) => {
                Ok(BatchReader::from_sheet(sheet::read_first_sheet(path)?))
            }
            None => Err(anyhow!("unsupported file type: {}", path.display())),
        }
    }

    /// Wrap an already materialized worksheet as a one-batch reader.
    pub fn from_sheet(batch: RowBatch) -> Self {
        let stats = ReadStats {
            rows_read: batch.len() as u64,
            malformed: 0,
        };
        BatchReader::Sheet {
            batch: Some(batch),
            stats,
        }
    }

    pub fn stats(&self) -> ReadStats {
        match self {
            BatchReader::Delimited(chunks) => chunks.stats,
            BatchReader::Sheet { stats, .. } => *stats,
        }
    }

    /// The sniffed format, for delimited inputs.
    pub fn format(&self) -> Option<FileFormat> {
        match self {
            BatchReader::Delimited(chunks) => Some(chunks.format),
            BatchReader::Sheet { .. } => None,
        }
    }
}

impl Iterator for BatchReader {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            BatchReader::Delimited(chunks) => chunks.next(),
            BatchReader::Sheet { batch, .. } => batch.take().map(Ok),
        }
    }
}

/// Streams a delimited file in batches of at most `chunk_rows` records.
pub struct DelimitedChunks {
    path: PathBuf,
    reader: Reader<BufReader<File>>,
    format: FileFormat,
    headers: Vec<String>,
    chunk_rows: usize,
    record: ByteRecord,
    done: bool,
    stats: ReadStats,
}

impl DelimitedChunks {
    pub fn open(path: &Path, format: FileFormat, chunk_rows: usize) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(format.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(BufReader::new(file));

        let headers = reader
            .byte_headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .map(|field| decode_field(format.encoding, field))
            .collect::<Vec<_>>();

        debug!(path = %path.display(), columns = headers.len(), ?format, "opened delimited source");

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            format,
            headers,
            chunk_rows: chunk_rows.max(1),
            record: ByteRecord::new(),
            done: false,
            stats: ReadStats::default(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Pull up to `chunk_rows` well-formed records; bad lines are skipped and counted.
    fn fill_batch(&mut self) -> Result<RowBatch> {
        let mut batch = RowBatch::new(self.headers.clone());
        batch.rows.reserve(self.chunk_rows.min(8_192));

        while batch.rows.len() < self.chunk_rows {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {
                    let row = self
                        .record
                        .iter()
                        .map(|field| decode_field(self.format.encoding, field))
                        .collect();
                    batch.rows.push(row);
                    self.stats.rows_read += 1;
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) if is_row_error(&e) => {
                    self.stats.malformed += 1;
                    trace!(path = %self.path.display(), error = %e, "skipping malformed line");
                }
                Err(e) => {
                    self.done = true;
                    return Err(e).with_context(|| format!("reading {}", self.path.display()));
                }
            }
        }
        Ok(batch)
    }
}

impl Iterator for DelimitedChunks {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill_batch() {
            Ok(batch) if batch.is_empty() => None,
            other => Some(other),
        }
    }
}

fn decode_field(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.trim_start_matches('\u{feff}').to_string()
}

/// Errors confined to one record; anything else (I/O) ends the file.
fn is_row_error(e: &csv::Error) -> bool {
    matches!(e.kind(), ErrorKind::UnequalLengths { .. })
}

/// Read every batch of a (small) file into one table.
pub fn read_whole(path: &Path) -> Result<RowBatch> {
    let mut table: Option<RowBatch> = None;
    for batch in BatchReader::open(path, usize::MAX)? {
        let batch = batch?;
        match table.as_mut() {
            Some(t) => t.rows.extend(batch.rows),
            None => table = Some(batch),
        }
    }
    match table {
        Some(t) => Ok(t),
        None => {
            // header-only file: keep the columns
            let headers = match BatchReader::open(path, 1)? {
                BatchReader::Delimited(chunks) => chunks.headers().to_vec(),
                BatchReader::Sheet { batch, .. } => batch.map(|b| b.headers).unwrap_or_default(),
            };
            Ok(RowBatch::new(headers))
        }
    }
}
