use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::extract::Extractor;
use crate::fetcher::{page_urls, Fetch};
use crate::listing::{dedupe, ListingRecord};

/// Listings gathered from one search, already deduplicated.
pub struct ScrapeOutcome {
    pub records: Vec<ListingRecord>,
    pub pages: usize,
    pub found: usize,
}

/// Fetch the search pages one after another, extract their cards and
/// dedupe. A page that cannot be fetched aborts the whole scrape.
pub async fn scrape_listings(
    fetcher: &dyn Fetch,
    extractor: &Extractor,
    base_url: &str,
    pages: u32,
    delay: Duration,
) -> Result<ScrapeOutcome> {
    let urls = page_urls(base_url, pages);
    let mut all = Vec::new();

    for (idx, url) in urls.iter().enumerate() {
        let html = fetcher
            .get_text(url)
            .await
            .with_context(|| format!("Failed to fetch search page {}", idx + 1))?;
        let found = extractor.extract(&html);
        info!("Page {}/{}: {} listings ({})", idx + 1, urls.len(), found.len(), url);
        all.extend(found);

        if idx + 1 < urls.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    let found = all.len();
    let records = dedupe(all);
    info!("{} listings found, {} unique", found, records.len());

    Ok(ScrapeOutcome {
        records,
        pages: urls.len(),
        found,
    })
}
