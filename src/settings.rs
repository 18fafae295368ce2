use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

const ENV_PREFIX: &str = "MIC";

/// Runtime tunables. Defaults match the made-in-china search pages; any field
/// can be overridden through a `MIC_<FIELD>` environment variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin used to absolutize `/path` links found in listing cards.
    pub site_origin: String,
    /// Value written to the `source` attribute of every item.
    pub origin_tag: String,
    pub user_agent: String,
    pub accept_language: String,
    pub page_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_step_ms: u64,
    /// Partition key prefix, concatenated with the listing id.
    pub key_prefix: String,
    pub sort_key: String,
    pub max_filename_len: usize,
    /// BatchWriteItem accepts at most 25 put requests.
    pub batch_size: usize,
    pub unprocessed_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_origin: "https://www.made-in-china.com".to_string(),
            origin_tag: "made-in-china".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            page_timeout_secs: 20,
            image_timeout_secs: 30,
            max_attempts: 5,
            retry_base_ms: 1000,
            retry_step_ms: 800,
            key_prefix: "prod#".to_string(),
            sort_key: "prod".to_string(),
            max_filename_len: 64,
            batch_size: 25,
            unprocessed_retries: 5,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `MIC_*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read MIC_* environment settings")?
            .try_deserialize::<Settings>()
            .context("Invalid MIC_* environment settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.site_origin)
            .with_context(|| format!("site_origin is not a URL: {}", self.site_origin))?;
        anyhow::ensure!(self.max_attempts >= 1, "max_attempts must be at least 1");
        anyhow::ensure!(
            (1..=25).contains(&self.batch_size),
            "batch_size must be between 1 and 25, got {}",
            self.batch_size
        );
        anyhow::ensure!(self.max_filename_len >= 1, "max_filename_len must be at least 1");
        Ok(())
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}
