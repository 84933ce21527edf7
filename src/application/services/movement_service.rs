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
use crate::domain::value_objects::{
    is_local_id, ArticleStatus, MovementStatus, MovementType, OperationKind,
};
use crate::infrastructure::queue::{DrainOutcome, OperationRecord, PendingQueue};
use crate::shared::error::{AppError, Result};

pub const PENDING_MOVEMENT_OPS: &str = "pendingMovementOps";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementInput {
    pub article_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Stock entries/exits and movement validation, remote-first with a durable
/// fallback queue. Stock math always runs against the state read in the same
/// guarded transaction that writes the movement.
#[derive(Clone)]
pub struct MovementService {
    ctx: SyncContext,
    queue: PendingQueue,
}

impl MovementService {
    pub fn new(ctx: SyncContext) -> Self {
        let queue = ctx.queue(PENDING_MOVEMENT_OPS);
        Self { ctx, queue }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub async fn create_stock_entry(&self, input: StockMovementInput) -> Result<String> {
        self.create_movement(MovementType::Entry, OperationKind::CreateStockEntry, input)
            .await
    }

    pub async fn create_stock_exit(&self, input: StockMovementInput) -> Result<String> {
        self.create_movement(MovementType::Exit, OperationKind::CreateStockExit, input)
            .await
    }

    /// Idempotent `pending -> validated` transition, stamped with the actor.
    pub async fn validate_movement(&self, movement_id: &str) -> Result<String> {
        self.transition_movement(
            movement_id,
            MovementStatus::Validated,
            None,
            OperationKind::ValidateMovement,
        )
        .await
    }

    pub async fn reject_movement(&self, movement_id: &str, reason: Option<String>) -> Result<String> {
        self.transition_movement(
            movement_id,
            MovementStatus::Rejected,
            reason,
            OperationKind::RejectMovement,
        )
        .await
    }

    async fn create_movement(
        &self,
        movement_type: MovementType,
        operation: OperationKind,
        input: StockMovementInput,
    ) -> Result<String> {
        if input.article_id.trim().is_empty() {
            return Err(AppError::ValidationError("article id is required".into()));
        }
        if input.quantity <= 0 {
            return Err(AppError::ValidationError(
                "quantity must be positive".into(),
            ));
        }

        let payload = serde_json::to_value(&input)?;
        let id = write_with_fallback(
            &self.ctx,
            &self.queue,
            operation,
            payload,
            self.apply_stock_movement(movement_type, &input),
        )
        .await?;

        if is_local_id(&id) {
            let fields = self.offline_movement_fields(movement_type, &input, &id)?;
            self.ctx.mirror().insert(collections::MOVEMENTS, &id, fields);
        }
        Ok(id)
    }

    /// Remote path: read the article, derive the new stock and status, then
    /// commit movement + article (+ alert) in one guarded transaction.
    /// Retries a handful of times when a concurrent edit trips the guard.
    async fn apply_stock_movement(
        &self,
        movement_type: MovementType,
        input: &StockMovementInput,
    ) -> Result<String> {
        let actor = self.ctx.actor()?;
        let remote = self.ctx.remote();
        let article_id = self.ctx.resolve_id(&input.article_id);
        let retries = self.ctx.config().max_transaction_retries.max(1);

        for attempt in 0..retries {
            let doc = remote
                .get(collections::ARTICLES, &article_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("article {article_id}")))?;

            let current_stock = doc
                .field("currentStock")
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("article {article_id} has no currentStock"))
                })?;
            let min_stock = doc.field("minStock").and_then(Value::as_i64).unwrap_or(0);

            if movement_type == MovementType::Exit && input.quantity > current_stock {
                return Err(AppError::InsufficientStock(format!(
                    "requested {} of article {article_id} but only {current_stock} in stock",
                    input.quantity
                )));
            }

            let new_stock = current_stock + movement_type.stock_delta(input.quantity);
            let status = ArticleStatus::for_level(new_stock, min_stock);
            let now = Utc::now();

            let movement = json!({
                "articleId": article_id,
                "articleName": doc.str_field("name"),
                "type": movement_type.as_str(),
                "quantity": input.quantity,
                "reason": input.reason,
                "userId": actor.id,
                "userName": actor.name,
                "status": MovementStatus::Validated.as_str(),
                "createdAt": now,
                "validatedBy": actor.id,
                "validatedAt": now,
            });

            let mut steps = vec![
                WriteStep::Create {
                    collection: collections::MOVEMENTS.to_string(),
                    fields: movement,
                },
                WriteStep::Update {
                    collection: collections::ARTICLES.to_string(),
                    id: article_id.clone(),
                    fields: json!({
                        "currentStock": new_stock,
                        "status": status.as_str(),
                        "updatedAt": now,
                    }),
                    guards: vec![FieldGuard::new("currentStock", json!(current_stock))],
                },
            ];

            if status.needs_alert() {
                steps.push(WriteStep::Create {
                    collection: collections::STOCK_ALERTS.to_string(),
                    fields: json!({
                        "articleId": article_id,
                        "articleName": doc.str_field("name"),
                        "level": status.as_str(),
                        "currentStock": new_stock,
                        "minStock": min_stock,
                        "createdAt": now,
                    }),
                });
            }

            match remote.transactional_write(steps).await {
                Ok(movement_id) => return Ok(movement_id),
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
            "article {article_id} kept changing during the stock update"
        )))
    }

    async fn transition_movement(
        &self,
        movement_id: &str,
        target: MovementStatus,
        reason: Option<String>,
        operation: OperationKind,
    ) -> Result<String> {
        if movement_id.trim().is_empty() {
            return Err(AppError::ValidationError("movement id is required".into()));
        }

        let payload = json!({ "movementId": movement_id, "reason": reason });
        write_with_fallback(
            &self.ctx,
            &self.queue,
            operation,
            payload,
            self.apply_transition(movement_id, target, reason.clone()),
        )
        .await
    }

    async fn apply_transition(
        &self,
        movement_id: &str,
        target: MovementStatus,
        reason: Option<String>,
    ) -> Result<String> {
        let actor = self.ctx.actor()?;
        let remote = self.ctx.remote();
        let movement_id = self.ctx.resolve_id(movement_id);
        let retries = self.ctx.config().max_transaction_retries.max(1);

        for _ in 0..retries {
            let doc = remote
                .get(collections::MOVEMENTS, &movement_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("movement {movement_id}")))?;

            let status = doc
                .str_field("status")
                .and_then(MovementStatus::parse)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("movement {movement_id} has no status"))
                })?;

            if status == target {
                return Ok(movement_id);
            }
            if status.is_terminal() {
                return Err(AppError::InvalidTransition(format!(
                    "movement {movement_id} is already {status}"
                )));
            }

            let mut fields = json!({
                "status": target.as_str(),
                "validatedBy": actor.id,
                "validatedAt": Utc::now(),
            });
            if let Some(reason) = &reason {
                fields["rejectionReason"] = json!(reason);
            }

            let step = WriteStep::Update {
                collection: collections::MOVEMENTS.to_string(),
                id: movement_id.clone(),
                fields,
                guards: vec![FieldGuard::new(
                    "status",
                    json!(MovementStatus::Pending.as_str()),
                )],
            };

            match remote.transactional_write(vec![step]).await {
                Ok(_) => return Ok(movement_id),
                // Concurrent transition: re-read, the loop settles idempotently.
                Err(err) if err.kind == RemoteErrorKind::FailedPrecondition => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "movement {movement_id} kept changing during the transition"
        )))
    }

    fn offline_movement_fields(
        &self,
        movement_type: MovementType,
        input: &StockMovementInput,
        local_id: &str,
    ) -> Result<Value> {
        let actor = self.ctx.actor()?;
        Ok(json!({
            "id": local_id,
            "articleId": input.article_id,
            "type": movement_type.as_str(),
            "quantity": input.quantity,
            "reason": input.reason,
            "userId": actor.id,
            "userName": actor.name,
            "status": MovementStatus::Pending.as_str(),
            "createdAt": Utc::now(),
        }))
    }

    /// Replay dispatcher: re-invokes the original operation so domain rules
    /// re-derive against current remote state, then reconciles temporary ids.
    pub(crate) async fn replay(&self, record: &OperationRecord) -> Result<()> {
        match OperationKind::from(record.operation.as_str()) {
            kind @ (OperationKind::CreateStockEntry | OperationKind::CreateStockExit) => {
                let input: StockMovementInput = serde_json::from_value(record.payload.clone())?;
                let movement_type = if kind == OperationKind::CreateStockEntry {
                    MovementType::Entry
                } else {
                    MovementType::Exit
                };
                let remote_id = self.apply_stock_movement(movement_type, &input).await?;
                if let Some(local_id) = record.payload.get("localId").and_then(Value::as_str) {
                    self.ctx
                        .record_reconciliation(collections::MOVEMENTS, local_id, &remote_id);
                }
                Ok(())
            }
            kind @ (OperationKind::ValidateMovement | OperationKind::RejectMovement) => {
                let movement_id = record
                    .payload
                    .get("movementId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::ValidationError("queued transition lacks movementId".into())
                    })?;
                let reason = record
                    .payload
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                let target = if kind == OperationKind::ValidateMovement {
                    MovementStatus::Validated
                } else {
                    MovementStatus::Rejected
                };
                self.apply_transition(movement_id, target, reason).await?;
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
impl SyncParticipant for MovementService {
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
