use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::fetcher::Fetch;
use crate::listing::ListingRecord;

static UNSAFE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]+").unwrap());

const DEFAULT_EXT: &str = ".jpg";

/// Download counters reported after the image stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub attempted: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub failed: usize,
}

enum Outcome {
    Downloaded(PathBuf),
    Cached(PathBuf),
    Failed,
}

/// Download each record's image into `dir`, at most `max_concurrency` at a
/// time, and set `image_local_path` on success. A failed download leaves the
/// record without a local path and never aborts the stage.
pub async fn attach_images(
    records: &mut [ListingRecord],
    dir: &Path,
    max_concurrency: usize,
    max_name_len: usize,
    fetcher: Arc<dyn Fetch>,
) -> Result<ImageStats> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create image directory {}", dir.display()))?;

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, record) in records.iter().enumerate() {
        let Some(url) = record.image_url.clone().filter(|u| !u.trim().is_empty()) else {
            continue;
        };
        let dest = image_path(dir, &record.title, &url, max_name_len);
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return (idx, Outcome::Failed);
            };
            (idx, fetch_one(fetcher.as_ref(), &url, dest, idx).await)
        });
    }

    let mut stats = ImageStats {
        attempted: tasks.len(),
        ..ImageStats::default()
    };

    let pb = ProgressBar::new(stats.attempted as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} images ({per_sec})")?
            .progress_chars("=> "),
    );

    while let Some(joined) = tasks.join_next().await {
        pb.inc(1);
        let (idx, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!("Image task panicked: {}", e);
                stats.failed += 1;
                continue;
            }
        };
        match outcome {
            Outcome::Downloaded(path) => {
                stats.downloaded += 1;
                records[idx].image_local_path = Some(path);
            }
            Outcome::Cached(path) => {
                stats.cached += 1;
                records[idx].image_local_path = Some(path);
            }
            Outcome::Failed => stats.failed += 1,
        }
    }

    pb.finish_and_clear();
    info!(
        "Images: {} attempted, {} downloaded, {} already present, {} failed",
        stats.attempted, stats.downloaded, stats.cached, stats.failed
    );
    Ok(stats)
}

async fn fetch_one(fetcher: &dyn Fetch, url: &str, dest: PathBuf, idx: usize) -> Outcome {
    if is_nonempty_file(&dest).await {
        debug!("Image already present: {}", dest.display());
        return Outcome::Cached(dest);
    }

    let bytes = match fetcher.get_bytes(url).await {
        Ok(b) => b,
        Err(e) => {
            warn!("Image download failed: {}", e);
            return Outcome::Failed;
        }
    };

    // Workers may share a title-derived name, so each stages under its own suffix.
    let staging = dest.with_extension(format!("{}.part", idx));
    let written: std::io::Result<()> = async {
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &dest).await
    }
    .await;

    match written {
        Ok(()) => Outcome::Downloaded(dest),
        Err(e) => {
            warn!("Failed to write {}: {}", dest.display(), e);
            let _ = tokio::fs::remove_file(&staging).await;
            Outcome::Failed
        }
    }
}

async fn is_nonempty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// `<sanitized title><ext>` inside `dir`.
pub fn image_path(dir: &Path, title: &str, image_url: &str, max_name_len: usize) -> PathBuf {
    let name = sanitize_filename(title, max_name_len);
    dir.join(format!("{}{}", name, url_extension(image_url)))
}

/// Runs of unsafe characters become `_`; the result is never empty.
pub fn sanitize_filename(title: &str, max_len: usize) -> String {
    let replaced = UNSAFE_RUN_RE.replace_all(title, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == '_' || c == '-');
    let mut name = if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    };
    // Only ASCII survives the replacement, so byte truncation is safe.
    name.truncate(max_len);
    name
}

/// Extension of the URL path (query ignored), `.jpg` when there is none.
fn url_extension(image_url: &str) -> String {
    let Ok(url) = url::Url::parse(image_url) else {
        return DEFAULT_EXT.to_string();
    };
    let last = url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext)
        }
        _ => DEFAULT_EXT.to_string(),
    }
}
