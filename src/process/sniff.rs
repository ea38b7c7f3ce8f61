use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};
use tracing::{debug, warn};

/// Bytes scanned for the encoding guess.
const SNIFF_BYTES: u64 = 100_000;

/// Candidates in tie-break order: the first maximal count wins.
const DELIMITERS: [u8; 4] = [b';', b',', b'|', b'\t'];

pub const DEFAULT_DELIMITER: u8 = b';';

/// What the sniffer decided for one file.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FileFormat {
    pub encoding: &'static Encoding,
    pub delimiter: u8,
}

impl Default for FileFormat {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl fmt::Debug for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFormat")
            .field("encoding", &self.encoding.name())
            .field("delimiter", &(self.delimiter as char))
            .finish()
    }
}

/// Guess encoding and delimiter. Never fails: unreadable or empty files get the defaults.
pub fn sniff_format(path: &Path) -> FileFormat {
    let head = match read_head(path) {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not sniff file, using defaults");
            return FileFormat::default();
        }
    };

    let encoding = detect_encoding(&head);
    let delimiter = detect_delimiter(&head, encoding);
    let format = FileFormat {
        encoding,
        delimiter,
    };
    debug!(path = %path.display(), ?format, "sniffed");
    format
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)?.take(SNIFF_BYTES).read_to_end(&mut buf)?;
    Ok(buf)
}

/// BOM first, then strict UTF-8 (a multi-byte sequence cut at the scan limit still counts),
/// then a statistical guess for legacy single-byte encodings.
pub fn detect_encoding(head: &[u8]) -> &'static Encoding {
    if head.is_empty() {
        return UTF_8;
    }
    if let Some((enc, _)) = Encoding::for_bom(head) {
        return enc;
    }
    match std::str::from_utf8(head) {
        Ok(_) => return UTF_8,
        Err(e) if e.error_len().is_none() => return UTF_8,
        Err(_) => {}
    }

    let mut detector = EncodingDetector::new();
    detector.feed(head, true);
    detector.guess(None, true)
}

/// Count each candidate in the first line and keep the most frequent; `;` when none occur.
pub fn detect_delimiter(head: &[u8], encoding: &'static Encoding) -> u8 {
    let (text, _) = encoding.decode_with_bom_removal(head);
    let first_line = match BufReader::new(text.as_bytes()).lines().next() {
        Some(Ok(line)) => line,
        _ => return DEFAULT_DELIMITER,
    };

    let mut best = DEFAULT_DELIMITER;
    let mut best_count = 0usize;
    for &candidate in &DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
