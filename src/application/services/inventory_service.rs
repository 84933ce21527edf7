use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::application::ports::remote_store::{FieldGuard, RemoteErrorKind, WriteStep};
use crate::application::services::context::SyncContext;
use crate::application::services::fallback::write_with_fallback;
use crate::application::services::sync_service::SyncParticipant;
use crate::domain::collections;
use crate::domain::value_objects::{is_local_id, InventoryStatus, OperationKind};
use crate::infrastructure::queue::{DrainOutcome, OperationRecord, PendingQueue};
use crate::shared::error::{AppError, Result};

pub const PENDING_INVENTORY_OPS: &str = "pendingInventoryOps";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryInput {
    pub name: String,
    pub items: Vec<InventoryItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemInput {
    pub article_id: String,
    #[serde(default)]
    pub article_name: Option<String>,
    pub expected_quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountInput {
    pub inventory_id: String,
    pub article_id: String,
    pub counted_quantity: i64,
}

/// Inventory campaigns: creation, per-article counts, completion.
#[derive(Clone)]
pub struct InventoryService {
    ctx: SyncContext,
    queue: PendingQueue,
}

impl InventoryService {
    pub fn new(ctx: SyncContext) -> Self {
        let queue = ctx.queue(PENDING_INVENTORY_OPS);
        Self { ctx, queue }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub async fn create_inventory(&self, input: CreateInventoryInput) -> Result<String> {
        if input.name.trim().is_empty() {
            return Err(AppError::ValidationError("inventory name is required".into()));
        }

        let payload = serde_json::to_value(&input)?;
        let id = write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::CreateInventory,
            payload,
            self.apply_create(&input),
        )
        .await?;

        if is_local_id(&id) {
            let mut fields = self.inventory_fields(&input)?;
            fields["id"] = json!(id);
            self.ctx
                .mirror()
                .insert(collections::INVENTORIES, &id, fields);
        }
        Ok(id)
    }

    /// Records a counted quantity for one article of an in-progress
    /// inventory. Guarded read-modify-write over the items array.
    pub async fn record_count(&self, input: RecordCountInput) -> Result<String> {
        let payload = serde_json::to_value(&input)?;
        write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::RecordInventoryCount,
            payload,
            self.apply_record_count(&input),
        )
        .await
    }

    /// Idempotent `in_progress -> completed`, stamped with the actor.
    pub async fn complete_inventory(&self, inventory_id: &str) -> Result<String> {
        if inventory_id.trim().is_empty() {
            return Err(AppError::ValidationError("inventory id is required".into()));
        }

        let payload = json!({ "inventoryId": inventory_id });
        write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::CompleteInventory,
            payload,
            self.apply_complete(inventory_id),
        )
        .await
    }

    fn inventory_fields(&self, input: &CreateInventoryInput) -> Result<Value> {
        let actor = self.ctx.actor()?;
        let items: Vec<Value> = input
            .items
            .iter()
            .map(|item| {
                json!({
                    "articleId": item.article_id,
                    "articleName": item.article_name,
                    "expectedQuantity": item.expected_quantity,
                    "countedQuantity": Value::Null,
                })
            })
            .collect();

        Ok(json!({
            "name": input.name,
            "status": InventoryStatus::InProgress.as_str(),
            "createdBy": actor.id,
            "createdAt": Utc::now(),
            "items": items,
        }))
    }

    async fn apply_create(&self, input: &CreateInventoryInput) -> Result<String> {
        let fields = self.inventory_fields(input)?;
        let id = self
            .ctx
            .remote()
            .simple_write(collections::INVENTORIES, fields)
            .await?;
        Ok(id)
    }

    async fn apply_record_count(&self, input: &RecordCountInput) -> Result<String> {
        let remote = self.ctx.remote();
        let inventory_id = self.ctx.resolve_id(&input.inventory_id);
        let retries = self.ctx.config().max_transaction_retries.max(1);

        for attempt in 0..retries {
            let doc = remote
                .get(collections::INVENTORIES, &inventory_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("inventory {inventory_id}")))?;

            let status = doc
                .str_field("status")
                .and_then(InventoryStatus::parse)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("inventory {inventory_id} has no status"))
                })?;
            if status != InventoryStatus::InProgress {
                return Err(AppError::InvalidTransition(format!(
                    "inventory {inventory_id} is {status}, counts are frozen"
                )));
            }

            let items = doc
                .field("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut updated = items.clone();
            let slot = updated.iter_mut().find(|item| {
                item.get("articleId").and_then(Value::as_str) == Some(input.article_id.as_str())
            });
            match slot {
                Some(item) => {
                    item["countedQuantity"] = json!(input.counted_quantity);
                }
                None => {
                    return Err(AppError::NotFound(format!(
                        "article {} is not part of inventory {inventory_id}",
                        input.article_id
                    )));
                }
            }

            let step = WriteStep::Update {
                collection: collections::INVENTORIES.to_string(),
                id: inventory_id.clone(),
                fields: json!({ "items": updated }),
                guards: vec![
                    FieldGuard::new("status", json!(InventoryStatus::InProgress.as_str())),
                    FieldGuard::new("items", Value::Array(items)),
                ],
            };

            match remote.transactional_write(vec![step]).await {
                Ok(_) => return Ok(inventory_id),
                Err(err)
                    if err.kind == RemoteErrorKind::FailedPrecondition
                        && attempt + 1 < retries =>
                {
                    let jitter = rand::thread_rng().gen_range(10..50);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "inventory {inventory_id} kept changing while recording the count"
        )))
    }

    async fn apply_complete(&self, inventory_id: &str) -> Result<String> {
        let actor = self.ctx.actor()?;
        let remote = self.ctx.remote();
        let inventory_id = self.ctx.resolve_id(inventory_id);
        let retries = self.ctx.config().max_transaction_retries.max(1);

        for _ in 0..retries {
            let doc = remote
                .get(collections::INVENTORIES, &inventory_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("inventory {inventory_id}")))?;

            let status = doc
                .str_field("status")
                .and_then(InventoryStatus::parse)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("inventory {inventory_id} has no status"))
                })?;
            if status == InventoryStatus::Completed {
                return Ok(inventory_id);
            }

            let step = WriteStep::Update {
                collection: collections::INVENTORIES.to_string(),
                id: inventory_id.clone(),
                fields: json!({
                    "status": InventoryStatus::Completed.as_str(),
                    "completedBy": actor.id,
                    "completedAt": Utc::now(),
                }),
                guards: vec![FieldGuard::new(
                    "status",
                    json!(InventoryStatus::InProgress.as_str()),
                )],
            };

            match remote.transactional_write(vec![step]).await {
                Ok(_) => return Ok(inventory_id),
                Err(err) if err.kind == RemoteErrorKind::FailedPrecondition => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "inventory {inventory_id} kept changing during completion"
        )))
    }

    pub(crate) async fn replay(&self, record: &OperationRecord) -> Result<()> {
        match OperationKind::from(record.operation.as_str()) {
            OperationKind::CreateInventory => {
                let input: CreateInventoryInput = serde_json::from_value(record.payload.clone())?;
                let remote_id = self.apply_create(&input).await?;
                if let Some(local_id) = record.payload.get("localId").and_then(Value::as_str) {
                    self.ctx
                        .record_reconciliation(collections::INVENTORIES, local_id, &remote_id);
                }
                Ok(())
            }
            OperationKind::RecordInventoryCount => {
                let input: RecordCountInput = serde_json::from_value(record.payload.clone())?;
                self.apply_record_count(&input).await?;
                Ok(())
            }
            OperationKind::CompleteInventory => {
                let inventory_id = record
                    .payload
                    .get("inventoryId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::ValidationError("queued completion lacks inventoryId".into())
                    })?;
                self.apply_complete(inventory_id).await?;
                Ok(())
            }
            other => Err(AppError::ValidationError(format!(
                "unexpected operation {other} in {}",
                self.queue.slot()
            ))),
        }
    }
}

#[async_trait]
impl SyncParticipant for InventoryService {
    fn slot(&self) -> &str {
        self.queue.slot()
    }

    async fn pending(&self) -> Result<u32> {
        self.queue.len().await
    }

    async fn sync_pending(&self) -> Result<DrainOutcome> {
        let service = self.clone();
        self.queue
            .drain(move |record| {
                let service = service.clone();
                let record = record.clone();
                async move { service.replay(&record).await }.boxed()
            })
            .await
    }
}
