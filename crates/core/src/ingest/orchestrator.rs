use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::domain::stock::StockRecord;
use crate::extract::extract_top_stocks;
use crate::ingest::provider::PageProvider;
use crate::storage::snapshot::SnapshotStore;

/// Scrapes `primary_url` and, when the page yields no records, retries once
/// against `fallback_url`. Both pages coming back empty is a hard error, so
/// a caller never persists an empty list by accident.
pub async fn scrape_top_stocks(
    provider: &dyn PageProvider,
    primary_url: &str,
    fallback_url: &str,
) -> Result<Vec<StockRecord>> {
    let html = provider.fetch_rendered(primary_url).await?;
    let records = extract_top_stocks(&html);
    if !records.is_empty() {
        return Ok(records);
    }

    tracing::warn!(
        url = primary_url,
        fallback = fallback_url,
        "no records extracted; trying fallback page"
    );

    let html = provider.fetch_rendered(fallback_url).await?;
    let records = extract_top_stocks(&html);
    anyhow::ensure!(
        !records.is_empty(),
        "no stock data could be scraped from {primary_url} or {fallback_url}"
    );

    Ok(records)
}

/// One full update cycle: read the configured target URL, scrape, persist.
/// A failure anywhere leaves the previously written snapshot untouched.
pub async fn run_update(
    provider: &dyn PageProvider,
    settings: &Settings,
    store: &SnapshotStore,
) -> Result<usize> {
    let url = read_target_url(&settings.url_file).await?;

    tracing::info!(%url, provider = provider.provider_name(), "starting scrape");

    let records = scrape_top_stocks(provider, &url, &settings.fallback_url).await?;
    store.write(&records).await?;

    tracing::info!(
        count = records.len(),
        path = %store.path().display(),
        "snapshot updated"
    );

    Ok(records.len())
}

/// Reads the single-URL configuration artifact, trimmed of whitespace.
pub async fn read_target_url(path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read target url file {}", path.display()))?;

    let url = raw.trim().to_string();
    anyhow::ensure!(!url.is_empty(), "target url file {} is empty", path.display());

    Ok(url)
}
