pub mod dynamo;
pub mod item;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{StoreUnavailableError, WriteFailure};
use crate::listing::ListingRecord;
use crate::settings::Settings;
use item::{build_item, StoreItem};

/// Key-value table that accepts batched overwrites keyed by `pk`.
#[async_trait]
pub trait ItemStore: Send + Sync {
    fn table(&self) -> &str;

    /// Confirm the table exists and is reachable before anything is written.
    async fn validate(&self) -> Result<(), StoreUnavailableError>;

    /// Put every item, overwriting by key. `Err` reports how many were not written.
    async fn put_batch(&self, items: &[StoreItem]) -> Result<(), WriteFailure>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub written: usize,
    pub failed: usize,
}

/// Validate the table, then write every record in batches of
/// `settings.batch_size`. A failed batch is logged and counted; the
/// remaining batches still go out.
pub async fn upsert(
    store: &dyn ItemStore,
    records: &[ListingRecord],
    extra: &BTreeMap<String, String>,
    settings: &Settings,
    updated_at: i64,
) -> Result<UpsertSummary, StoreUnavailableError> {
    store.validate().await?;

    let items = collapse_by_pk(
        records
            .iter()
            .map(|r| build_item(r, extra, settings, updated_at))
            .collect(),
    );

    let mut summary = UpsertSummary::default();
    for batch in items.chunks(settings.batch_size.max(1)) {
        match store.put_batch(batch).await {
            Ok(()) => summary.written += batch.len(),
            Err(failure) => {
                warn!("{}", failure);
                let failed = failure.count.min(batch.len());
                summary.failed += failed;
                summary.written += batch.len() - failed;
            }
        }
    }

    info!(
        "Upserted {} items into {} ({} failed)",
        summary.written,
        store.table(),
        summary.failed
    );
    Ok(summary)
}

/// A batch may not carry two puts for one key; keep the last, at the first's slot.
fn collapse_by_pk(items: Vec<StoreItem>) -> Vec<StoreItem> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<StoreItem> = Vec::with_capacity(items.len());
    for item in items {
        let Some(pk) = item.pk().map(str::to_string) else {
            out.push(item);
            continue;
        };
        match slots.get(&pk) {
            Some(&i) => out[i] = item,
            None => {
                slots.insert(pk, out.len());
                out.push(item);
            }
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory table keyed by `pk`.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub unavailable: bool,
        pub fail_batch: Option<usize>,
        pub rows: Mutex<BTreeMap<String, StoreItem>>,
        pub batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ItemStore for MemoryStore {
        fn table(&self) -> &str {
            "memory"
        }

        async fn validate(&self) -> Result<(), StoreUnavailableError> {
            if self.unavailable {
                return Err(StoreUnavailableError {
                    table: "memory".into(),
                    reason: "ResourceNotFoundException".into(),
                });
            }
            Ok(())
        }

        async fn put_batch(&self, items: &[StoreItem]) -> Result<(), WriteFailure> {
            let n = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(items.len());
                batches.len() - 1
            };
            if self.fail_batch == Some(n) {
                return Err(WriteFailure {
                    table: "memory".into(),
                    count: items.len(),
                    reason: "ProvisionedThroughputExceededException".into(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            for item in items {
                rows.insert(item.pk().unwrap().to_string(), item.clone());
            }
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<ListingRecord> {
        (0..n)
            .map(|i| {
                ListingRecord::new(
                    format!("Lip {}", i),
                    format!("https://x.test/p/{}.html", i),
                    "made-in-china",
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn unavailable_table_writes_nothing() {
        let store = MemoryStore {
            unavailable: true,
            ..MemoryStore::default()
        };
        let err = upsert(&store, &records(3), &BTreeMap::new(), &Settings::default(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.table, "memory");
        assert!(store.batches.lock().unwrap().is_empty());
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batches_respect_size_cap() {
        let store = MemoryStore::default();
        let summary = upsert(&store, &records(60), &BTreeMap::new(), &Settings::default(), 0)
            .await
            .unwrap();
        assert_eq!(summary, UpsertSummary { written: 60, failed: 0 });
        assert_eq!(*store.batches.lock().unwrap(), vec![25, 25, 10]);
    }

    #[tokio::test]
    async fn rerun_converges() {
        let store = MemoryStore::default();
        let recs = records(7);
        upsert(&store, &recs, &BTreeMap::new(), &Settings::default(), 1).await.unwrap();
        let first = store.rows.lock().unwrap().clone();
        upsert(&store, &recs, &BTreeMap::new(), &Settings::default(), 1).await.unwrap();
        let second = store.rows.lock().unwrap().clone();
        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_rest() {
        let store = MemoryStore {
            fail_batch: Some(0),
            ..MemoryStore::default()
        };
        let summary = upsert(&store, &records(30), &BTreeMap::new(), &Settings::default(), 0)
            .await
            .unwrap();
        assert_eq!(summary, UpsertSummary { written: 5, failed: 25 });
        assert_eq!(store.rows.lock().unwrap().len(), 5);
    }

    #[test]
    fn duplicate_keys_collapse_last_wins() {
        let settings = Settings::default();
        let mut a = records(1).remove(0);
        a.title = "first".into();
        let mut b = a.clone();
        b.title = "second".into();
        let other = records(2).remove(1);
        let items: Vec<_> = [a, other, b]
            .iter()
            .map(|r| build_item(r, &BTreeMap::new(), &settings, 0))
            .collect();
        let out = collapse_by_pk(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("name"), Some(&item::ItemValue::from("second")));
    }
}
