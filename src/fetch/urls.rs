// src/fetch/urls.rs
use anyhow::{anyhow, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::process::utils::extract_period_from_filename;

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// `.zip` links on an index page whose file name carries a quarter token.
pub async fn fetch_archive_urls(client: &Client, index_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(index_url)?;
    let mut attempt = 0;

    // retry loop
    let html = loop {
        attempt += 1;
        match client.get(base.as_str()).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(html) => break html,
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(url = %base, attempt, error = %e, "retrying index body");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            },
            Ok(resp) if attempt >= MAX_RETRIES => {
                return Err(anyhow!("HTTP error from {}: {}", base, resp.status()))
            }
            Ok(resp) => {
                warn!(url = %base, attempt, status = %resp.status(), "retrying index");
                sleep(RETRY_DELAY).await;
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(url = %base, attempt, error = %e, "retrying index");
                sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let links = quarterly_zip_links(&html, &base)?;
    debug!(url = %base, links = links.len(), "index scraped");
    Ok(links)
}

/// Absolute `.zip` hrefs in `html`, resolved against `base`, deduplicated in page order.
pub fn quarterly_zip_links(html: &str, base: &Url) -> Result<Vec<String>> {
    let selector = Selector::parse(r#"a[href$=".zip"], a[href$=".ZIP"]"#)
        .map_err(|e| anyhow!("invalid zip link selector: {:?}", e))?;

    let mut links: Vec<String> = Vec::new();
    for href in Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
    {
        let url = match base.join(href) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let name = url
            .path_segments()
            .and_then(|s| s.last())
            .unwrap_or_default()
            .to_string();
        if extract_period_from_filename(&name).is_none() {
            continue;
        }
        let url = url.to_string();
        if !links.contains(&url) {
            links.push(url);
        }
    }
    Ok(links)
}
