// src/output/mod.rs
pub mod archive;
pub mod manifest;
pub mod tables;

pub use archive::zip_file;
pub use manifest::{write_manifest, FileOutcome, ManifestEntry};
pub use tables::{read_records, write_records, BatchWriter};

/// Field delimiter of every file this crate writes.
pub const OUTPUT_DELIMITER: u8 = b';';
