// src/output/archive.rs
use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
};
use tracing::debug;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Compress `src` into a sibling `.zip` holding one entry named after `src`.
pub fn zip_file(src: &Path) -> Result<PathBuf> {
    let dest = src.with_extension("zip");
    let entry_name = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} has no file name", src.display()))?;

    let tmp = dest.with_extension("zip.tmp");
    {
        let out = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        let mut zip = ZipWriter::new(out);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry_name.as_str(), options)?;

        let mut input = BufReader::new(
            File::open(src).with_context(|| format!("opening {}", src.display()))?,
        );
        io::copy(&mut input, &mut zip).with_context(|| format!("compressing {}", src.display()))?;
        zip.finish()?;
    }
    fs::rename(&tmp, &dest)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), dest.display()))?;

    debug!(src = %src.display(), zip = %dest.display(), "archived");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn archive_holds_single_named_entry() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("aggregated_expenses.csv");
        fs::write(&src, "name;region;total\nX;SP;10.00\n")?;

        let dest = zip_file(&src)?;
        assert_eq!(dest, dir.path().join("aggregated_expenses.zip"));

        let mut archive = ZipArchive::new(File::open(&dest)?)?;
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0)?;
        assert_eq!(entry.name(), "aggregated_expenses.csv");
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        assert_eq!(text, "name;region;total\nX;SP;10.00\n");
        Ok(())
    }
}
