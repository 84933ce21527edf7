use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::application::services::context::SyncContext;
use crate::application::services::fallback::write_with_fallback;
use crate::application::services::sync_service::SyncParticipant;
use crate::domain::collections;
use crate::domain::value_objects::{is_local_id, OperationKind, UserStatus};
use crate::infrastructure::queue::{DrainOutcome, OperationRecord, PendingQueue};
use crate::shared::error::{AppError, Result};

pub const PENDING_USER_OPS: &str = "pendingUserOps";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Account administration: creation, profile updates, deactivation.
#[derive(Clone)]
pub struct UserService {
    ctx: SyncContext,
    queue: PendingQueue,
}

impl UserService {
    pub fn new(ctx: SyncContext) -> Self {
        let queue = ctx.queue(PENDING_USER_OPS);
        Self { ctx, queue }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub async fn create_user(&self, input: UserInput) -> Result<String> {
        Self::validate(&input)?;
        let payload = serde_json::to_value(&input)?;
        let id = write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::CreateUser,
            payload,
            self.apply_create(&input),
        )
        .await?;

        if is_local_id(&id) {
            let mut fields = Self::user_fields(&input);
            fields["id"] = json!(id);
            self.ctx.mirror().insert(collections::USERS, &id, fields);
        }
        Ok(id)
    }

    pub async fn update_user(&self, user_id: &str, input: UserInput) -> Result<String> {
        Self::validate(&input)?;
        if user_id.trim().is_empty() {
            return Err(AppError::ValidationError("user id is required".into()));
        }

        let mut payload = serde_json::to_value(&input)?;
        payload["userId"] = json!(user_id);
        write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::UpdateUser,
            payload,
            self.apply_update(user_id, &input),
        )
        .await
    }

    pub async fn deactivate_user(&self, user_id: &str) -> Result<String> {
        if user_id.trim().is_empty() {
            return Err(AppError::ValidationError("user id is required".into()));
        }
        let actor = self.ctx.actor()?;
        if actor.id == user_id {
            return Err(AppError::ValidationError(
                "users cannot deactivate their own account".into(),
            ));
        }

        let payload = json!({ "userId": user_id });
        write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::DeactivateUser,
            payload,
            self.apply_deactivate(user_id),
        )
        .await
    }

    fn validate(input: &UserInput) -> Result<()> {
        if input.name.trim().is_empty() {
            return Err(AppError::ValidationError("user name is required".into()));
        }
        if !input.email.contains('@') {
            return Err(AppError::ValidationError(format!(
                "invalid email address: {}",
                input.email
            )));
        }
        Ok(())
    }

    fn user_fields(input: &UserInput) -> Value {
        let now = Utc::now();
        json!({
            "name": input.name,
            "email": input.email,
            "role": input.role,
            "status": UserStatus::Active.as_str(),
            "createdAt": now,
            "updatedAt": now,
        })
    }

    async fn apply_create(&self, input: &UserInput) -> Result<String> {
        let id = self
            .ctx
            .remote()
            .simple_write(collections::USERS, Self::user_fields(input))
            .await?;
        Ok(id)
    }

    async fn apply_update(&self, user_id: &str, input: &UserInput) -> Result<String> {
        let user_id = self.ctx.resolve_id(user_id);
        self.ctx
            .remote()
            .simple_update(
                collections::USERS,
                &user_id,
                json!({
                    "name": input.name,
                    "email": input.email,
                    "role": input.role,
                    "updatedAt": Utc::now(),
                }),
            )
            .await?;
        Ok(user_id)
    }

    async fn apply_deactivate(&self, user_id: &str) -> Result<String> {
        let user_id = self.ctx.resolve_id(user_id);
        self.ctx
            .remote()
            .simple_update(
                collections::USERS,
                &user_id,
                json!({
                    "status": UserStatus::Inactive.as_str(),
                    "updatedAt": Utc::now(),
                }),
            )
            .await?;
        Ok(user_id)
    }

    pub(crate) async fn replay(&self, record: &OperationRecord) -> Result<()> {
        match OperationKind::from(record.operation.as_str()) {
            OperationKind::CreateUser => {
                let input: UserInput = serde_json::from_value(record.payload.clone())?;
                let remote_id = self.apply_create(&input).await?;
                if let Some(local_id) = record.payload.get("localId").and_then(Value::as_str) {
                    self.ctx
                        .record_reconciliation(collections::USERS, local_id, &remote_id);
                }
                Ok(())
            }
            OperationKind::UpdateUser => {
                let user_id = record
                    .payload
                    .get("userId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::ValidationError("queued user update lacks userId".into())
                    })?;
                let input: UserInput = serde_json::from_value(record.payload.clone())?;
                self.apply_update(user_id, &input).await?;
                Ok(())
            }
            OperationKind::DeactivateUser => {
                let user_id = record
                    .payload
                    .get("userId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::ValidationError("queued deactivation lacks userId".into())
                    })?;
                self.apply_deactivate(user_id).await?;
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
impl SyncParticipant for UserService {
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
