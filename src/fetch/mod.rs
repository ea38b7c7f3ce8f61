// src/fetch/mod.rs
pub mod urls;
pub mod zips;

use anyhow::Result;
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::{mpsc, Semaphore},
    time::Instant,
};
use tracing::{error, info, instrument, warn};

use crate::config::PipelineConfig;

/// Downloads kept in flight at once.
const MAX_CONCURRENT_DOWNLOADS: usize = 3;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub archives: usize,
    pub failed: usize,
    pub extracted: Vec<PathBuf>,
}

/// Archive URLs from config plus any scraped from the index page.
pub async fn archive_urls(client: &Client, cfg: &PipelineConfig) -> Result<Vec<String>> {
    let mut all = cfg.archive_urls.clone();
    if let Some(index) = cfg.archive_index_url.as_deref() {
        for url in urls::fetch_archive_urls(client, index).await? {
            if !all.contains(&url) {
                all.push(url);
            }
        }
    }
    Ok(all)
}

/// Download every quarterly archive and extract its tabular files into `extracted/`.
/// A failed archive is logged and skipped.
#[instrument(level = "info", skip_all)]
pub async fn fetch_archives(client: &Client, cfg: &PipelineConfig) -> Result<FetchReport> {
    let paths = cfg.paths();
    let to_fetch = archive_urls(client, cfg).await?;
    let mut report = FetchReport {
        archives: to_fetch.len(),
        ..FetchReport::default()
    };
    if to_fetch.is_empty() {
        info!("no archive URLs configured");
        return Ok(report);
    }
    info!(archives = to_fetch.len(), "downloading archives");

    let (tx, mut rx) = mpsc::channel::<Result<PathBuf, (String, String)>>(100);
    let dl_sem = Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS));
    let mut dl_handles = Vec::with_capacity(to_fetch.len());

    for url in to_fetch {
        let client = client.clone();
        let archives_dir = paths.archives.clone();
        let tx = tx.clone();
        let sem = dl_sem.clone();

        dl_handles.push(tokio::spawn(async move {
            let _permit = match sem.acquire().await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err((url, e.to_string()))).await;
                    return;
                }
            };
            let start = Instant::now();
            match zips::download_file(&client, &url, &archives_dir).await {
                Ok(path) => {
                    info!(url = %url, elapsed = ?start.elapsed(), "downloaded");
                    let _ = tx.send(Ok(path)).await;
                }
                Err(err) => {
                    let _ = tx.send(Err((url, format!("{:#}", err)))).await;
                }
            }
        }));
    }
    // drop the original sender so `rx.recv()` ends once all downloads complete
    drop(tx);

    while let Some(msg) = rx.recv().await {
        match msg {
            Ok(zip_path) => {
                let extracted_dir = paths.extracted.clone();
                let zip_clone = zip_path.clone();
                let result = tokio::task::spawn_blocking(move || {
                    zips::extract_archive(&zip_clone, &extracted_dir)
                })
                .await?;
                match result {
                    Ok(files) => report.extracted.extend(files),
                    Err(e) => {
                        warn!(zip = %zip_path.display(), error = %format!("{:#}", e), "extract failed");
                        report.failed += 1;
                    }
                }
            }
            Err((url, err)) => {
                error!(url = %url, error = %err, "download failed");
                report.failed += 1;
            }
        }
    }

    for h in dl_handles {
        let _ = h.await;
    }

    report.extracted.sort();
    info!(
        archives = report.archives,
        failed = report.failed,
        files = report.extracted.len(),
        "fetch complete"
    );
    Ok(report)
}

/// Local registry path, downloading it first if the cache is absent or empty.
pub async fn fetch_registry(client: &Client, cfg: &PipelineConfig) -> Result<PathBuf> {
    zips::ensure_registry(client, &cfg.registry_url, &cfg.paths().registry_file()).await
}
