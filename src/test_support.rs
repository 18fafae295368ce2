//! In-memory collaborators shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AttemptError, FetchError};
use crate::fetcher::Fetch;

/// Serves canned bodies by URL; unknown URLs fail as if every retry was used up.
#[derive(Default)]
pub struct FakeFetcher {
    pub bodies: HashMap<String, Vec<u8>>,
    pub delay: Duration,
    pub requested: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeFetcher {
    pub fn with(bodies: &[(&str, &[u8])]) -> Self {
        Self {
            bodies: bodies.iter().map(|(u, b)| (u.to_string(), b.to_vec())).collect(),
            ..Self::default()
        }
    }

    /// Like `with`, but every request takes `delay` before answering.
    pub fn with_delay(bodies: &[(&str, &[u8])], delay: Duration) -> Self {
        Self {
            delay,
            ..Self::with(bodies)
        }
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.bodies.get(url).cloned().ok_or_else(|| FetchError {
            url: url.to_string(),
            attempts: 5,
            source: AttemptError::Status(reqwest::StatusCode::NOT_FOUND),
        })
    }
}
