// src/fetch/zips.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

use crate::process::reader::SourceKind;

/// Download `url_str` into `dest_dir` under its original file name.
/// An existing non-empty file is reused.
pub async fn download_file(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let url = Url::parse(url_str)?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = dest_dir.join(filename);

    if is_cached(&dest_path).await {
        debug!(path = %dest_path.display(), "already downloaded");
        return Ok(dest_path);
    }
    download_to(client, url.as_str(), &dest_path).await?;
    Ok(dest_path)
}

/// Fetch the registry into `path` unless a non-empty copy is already there.
pub async fn ensure_registry(client: &Client, url: &str, path: &Path) -> Result<PathBuf> {
    if is_cached(path).await {
        info!(path = %path.display(), "registry cached");
        return Ok(path.to_path_buf());
    }
    info!(url, "downloading registry");
    download_to(client, url, path).await?;
    Ok(path.to_path_buf())
}

async fn is_cached(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}

/// Write through a temp file so an interrupted download never looks cached.
async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;

    let tmp = dest.with_extension("part");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, dest).await?;
    debug!(url, bytes = bytes.len(), path = %dest.display(), "downloaded");
    Ok(())
}

/// Unpack the tabular entries of `zip_path` into `dest_dir`.
/// Entries whose path would escape `dest_dir` are skipped.
pub fn extract_archive(zip_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(zip_path).with_context(|| format!("opening {}", zip_path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading zip {}", zip_path.display()))?;

    let mut written = Vec::new();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let rel = match entry.enclosed_name() {
            Some(p) => p,
            None => {
                debug!(entry = entry.name(), "skipping unsafe entry path");
                continue;
            }
        };
        if SourceKind::from_path(&rel).is_none() {
            continue;
        }

        let out_path = dest_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {}", rel.display()))?;
        written.push(out_path);
    }

    debug!(zip = %zip_path.display(), files = written.len(), "extracted");
    Ok(written)
}
