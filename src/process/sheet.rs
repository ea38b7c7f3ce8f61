use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::debug;

use super::RowBatch;

/// Read the first worksheet; its first row is the header.
/// The format has no incremental row access, so the whole sheet is materialized.
pub fn read_first_sheet(path: &Path) -> Result<RowBatch> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = match sheet_names.first() {
        Some(name) => name.clone(),
        None => bail!("workbook {} has no sheets", path.display()),
    };

    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("reading sheet `{}` of {}", first, path.display()))?;

    let batch = range_to_batch(&range);
    debug!(path = %path.display(), sheet = %first, rows = batch.len(), "read worksheet");
    Ok(batch)
}

pub(super) fn range_to_batch(range: &Range<Data>) -> RowBatch {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_to_string).collect(),
        None => return RowBatch::default(),
    };

    let mut batch = RowBatch::new(headers);
    for row in rows {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        batch.rows.push(values);
    }
    batch
}

/// Integral floats render without a fractional part so account codes stay `31100`.
/// Other floats use a decimal comma, the form `parse_monetary` expects from text sources.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => format!("{}", f).replace('.', ","),
        other => other.to_string(),
    }
}
