use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeValue, PutRequest, TableDescription, TableStatus, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use super::item::{ItemValue, StoreItem};
use super::ItemStore;
use crate::error::{StoreUnavailableError, WriteFailure};

const UNPROCESSED_BACKOFF_MS: u64 = 500;

/// DynamoDB table written through `BatchWriteItem`.
pub struct DynamoStore {
    client: Client,
    table: String,
    unprocessed_retries: u32,
}

impl DynamoStore {
    /// Credentials and region come from the default AWS chain; `region`
    /// overrides the latter.
    pub async fn connect(table: &str, region: Option<String>, unprocessed_retries: u32) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        info!(
            "DynamoDB target {} in region {}",
            table,
            sdk_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "<unset>".into())
        );
        Self {
            client: Client::new(&sdk_config),
            table: table.to_string(),
            unprocessed_retries,
        }
    }

    fn failure(&self, count: usize, reason: impl Into<String>) -> WriteFailure {
        WriteFailure {
            table: self.table.clone(),
            count,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ItemStore for DynamoStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn validate(&self) -> Result<(), StoreUnavailableError> {
        let out = self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| StoreUnavailableError {
                table: self.table.clone(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        check_table(&self.table, out.table())
    }

    async fn put_batch(&self, items: &[StoreItem]) -> Result<(), WriteFailure> {
        let mut pending = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(to_attribute_map(item)))
                .build()
                .map_err(|e| self.failure(items.len(), e.to_string()))?;
            pending.push(WriteRequest::builder().put_request(put).build());
        }

        let mut resends = 0u32;
        loop {
            let out = self
                .client
                .batch_write_item()
                .request_items(self.table.clone(), pending.clone())
                .send()
                .await
                .map_err(|e| self.failure(pending.len(), DisplayErrorContext(&e).to_string()))?;

            let Some((left, backoff)) = next_resend(
                &self.table,
                out.unprocessed_items(),
                resends,
                self.unprocessed_retries,
            )?
            else {
                return Ok(());
            };
            resends += 1;
            debug!(
                "{} unprocessed items, resending in {:.1}s",
                left.len(),
                backoff.as_secs_f64()
            );
            pending = left;
            tokio::time::sleep(backoff).await;
        }
    }
}

/// `Deleting` or a missing description is fatal; other non-active states only warn.
fn check_table(table: &str, desc: Option<&TableDescription>) -> Result<(), StoreUnavailableError> {
    let Some(desc) = desc else {
        return Err(StoreUnavailableError {
            table: table.to_string(),
            reason: "DescribeTable returned no table description".into(),
        });
    };
    match desc.table_status() {
        Some(TableStatus::Active) => {}
        Some(TableStatus::Deleting) => {
            return Err(StoreUnavailableError {
                table: table.to_string(),
                reason: "table is being deleted".into(),
            })
        }
        other => warn!("Table {} status is {:?}, writing anyway", table, other),
    }
    Ok(())
}

/// Leftovers of one `BatchWriteItem` call and the delay before resending them.
/// `Ok(None)` once everything landed; a `WriteFailure` carrying the leftover
/// count once `max_resends` have been spent.
fn next_resend(
    table: &str,
    unprocessed: Option<&HashMap<String, Vec<WriteRequest>>>,
    resends: u32,
    max_resends: u32,
) -> Result<Option<(Vec<WriteRequest>, Duration)>, WriteFailure> {
    let left = unprocessed
        .and_then(|m| m.get(table))
        .cloned()
        .unwrap_or_default();
    if left.is_empty() {
        return Ok(None);
    }
    if resends >= max_resends {
        return Err(WriteFailure {
            table: table.to_string(),
            count: left.len(),
            reason: format!("still unprocessed after {} resends", max_resends),
        });
    }
    let backoff = Duration::from_millis(UNPROCESSED_BACKOFF_MS * (resends as u64 + 1));
    Ok(Some((left, backoff)))
}

fn to_attribute(value: &ItemValue) -> AttributeValue {
    match value {
        ItemValue::S(s) => AttributeValue::S(s.clone()),
        ItemValue::N(n) => AttributeValue::N(n.to_string()),
        ItemValue::L(list) => {
            AttributeValue::L(list.iter().map(|s| AttributeValue::S(s.clone())).collect())
        }
    }
}

fn to_attribute_map(item: &StoreItem) -> HashMap<String, AttributeValue> {
    item.attrs
        .iter()
        .map(|(k, v)| (k.clone(), to_attribute(v)))
        .collect()
}
