// src/process/mod.rs
pub mod aggregate;
pub mod filter;
pub mod ingest;
pub mod normalize;
pub mod reader;
pub mod sheet;
pub mod sniff;
pub mod utils;

/// One bounded slice of a source table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Column names, in file order. Canonical once the normalizer has run.
    pub headers: Vec<String>,
    /// Each record as one String per header.
    pub rows: Vec<Vec<String>>,
}

impl RowBatch {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first candidate present among the headers (exact match).
    pub fn find_column<S: AsRef<str>>(&self, candidates: &[S]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|c| self.headers.iter().position(|h| h == c.as_ref()))
    }

    /// Cell accessor tolerant of short rows.
    pub fn cell(row: &[String], idx: usize) -> &str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_column_respects_candidate_order() {
        let batch = RowBatch::new(vec!["value".into(), "vl_saldo_final".into()]);
        assert_eq!(batch.find_column(&["vl_saldo_final", "value"]), Some(1));
        assert_eq!(batch.find_column(&["value", "vl_saldo_final"]), Some(0));
        assert_eq!(batch.find_column(&["missing"]), None);
    }

    #[test]
    fn cell_is_empty_past_row_end() {
        let row = vec!["a".to_string()];
        assert_eq!(RowBatch::cell(&row, 0), "a");
        assert_eq!(RowBatch::cell(&row, 3), "");
    }
}
