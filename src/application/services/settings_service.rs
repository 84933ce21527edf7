use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};

use crate::application::services::context::SyncContext;
use crate::application::services::fallback::write_with_fallback;
use crate::application::services::sync_service::SyncParticipant;
use crate::domain::collections;
use crate::domain::entities::SETTINGS_DOC_ID;
use crate::domain::value_objects::OperationKind;
use crate::infrastructure::queue::{DrainOutcome, OperationRecord, PendingQueue};
use crate::shared::error::{AppError, Result};

pub const PENDING_SETTINGS_OPS: &str = "pendingSettingsOps";

/// Application settings live in a single fixed-id document, written as
/// an upsert-merge so partial updates never clobber unrelated keys.
#[derive(Clone)]
pub struct SettingsService {
    ctx: SyncContext,
    queue: PendingQueue,
}

impl SettingsService {
    pub fn new(ctx: SyncContext) -> Self {
        let queue = ctx.queue(PENDING_SETTINGS_OPS);
        Self { ctx, queue }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub async fn update_settings(&self, changes: Value) -> Result<String> {
        if !changes.is_object() || changes.as_object().map(|m| m.is_empty()).unwrap_or(true) {
            return Err(AppError::ValidationError(
                "settings update must be a non-empty object".into(),
            ));
        }

        let id = write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::UpdateSettings,
            changes.clone(),
            self.apply_update(&changes),
        )
        .await?;

        // Settings are merged into the mirror immediately so the UI can
        // reflect the change even while the write sits in the queue.
        let merged = match self.ctx.mirror().get(collections::SETTINGS, SETTINGS_DOC_ID) {
            Some(doc) => {
                let mut current = doc.fields;
                Self::merge(&mut current, &changes);
                current
            }
            None => changes,
        };
        self.ctx
            .mirror()
            .insert(collections::SETTINGS, SETTINGS_DOC_ID, merged);
        Ok(id)
    }

    fn merge(target: &mut Value, changes: &Value) {
        if let (Some(target_map), Some(change_map)) = (target.as_object_mut(), changes.as_object())
        {
            for (key, value) in change_map {
                target_map.insert(key.clone(), value.clone());
            }
        }
    }

    async fn apply_update(&self, changes: &Value) -> Result<String> {
        let actor = self.ctx.actor()?;
        let mut fields = changes.clone();
        fields["updatedBy"] = json!(actor.id);
        fields["updatedAt"] = json!(Utc::now());
        self.ctx
            .remote()
            .simple_set(collections::SETTINGS, SETTINGS_DOC_ID, fields)
            .await?;
        Ok(SETTINGS_DOC_ID.to_string())
    }

    pub(crate) async fn replay(&self, record: &OperationRecord) -> Result<()> {
        match OperationKind::from(record.operation.as_str()) {
            OperationKind::UpdateSettings => {
                let mut changes = record.payload.clone();
                if let Some(map) = changes.as_object_mut() {
                    map.remove("localId");
                }
                self.apply_update(&changes).await?;
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
impl SyncParticipant for SettingsService {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::actor::Actor;
    use crate::application::ports::remote_store::RemoteStore;
    use crate::domain::entities::AppSettings;
    use crate::infrastructure::auth::StaticActorProvider;
    use crate::infrastructure::remote::MemoryRemoteStore;
    use crate::shared::config::SyncConfig;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup() -> (SettingsService, MemoryRemoteStore, SyncContext) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:?cache=shared")
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slot TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = MemoryRemoteStore::new();
        let ctx = SyncContext::new(
            Arc::new(store.clone()),
            pool,
            Arc::new(StaticActorProvider::new(Actor::new("u1", "Admin"))),
            SyncConfig::default(),
        );
        (SettingsService::new(ctx.clone()), store, ctx)
    }

    #[tokio::test]
    async fn test_update_merges_into_fixed_document() {
        let (service, store, _ctx) = setup().await;

        service
            .update_settings(json!({
                "institutionName": "Saint-Jean Pharmacy",
                "notificationsEnabled": true,
                "lowStockAlerts": true,
            }))
            .await
            .unwrap();
        service
            .update_settings(json!({ "defaultMinStock": 5 }))
            .await
            .unwrap();

        let doc = store
            .get(collections::SETTINGS, SETTINGS_DOC_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["lowStockAlerts"], json!(true));

        let settings: AppSettings = doc.decode().unwrap();
        assert_eq!(settings.id, SETTINGS_DOC_ID);
        assert_eq!(settings.institution_name, "Saint-Jean Pharmacy");
        assert_eq!(settings.default_min_stock, Some(5));
        assert_eq!(settings.updated_by, "u1");
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected() {
        let (service, _store, _ctx) = setup().await;
        let err = service.update_settings(json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_offline_update_visible_in_mirror_then_replays() {
        let (service, store, ctx) = setup().await;
        store.set_online(false);

        service
            .update_settings(json!({ "lowStockAlerts": false }))
            .await
            .unwrap();

        let mirrored = ctx
            .mirror()
            .get(collections::SETTINGS, SETTINGS_DOC_ID)
            .unwrap();
        assert_eq!(mirrored.fields["lowStockAlerts"], json!(false));

        store.set_online(true);
        let records = service.queue().peek_all().await.unwrap();
        assert_eq!(records.len(), 1);
        service.replay(&records[0]).await.unwrap();

        let doc = store
            .get(collections::SETTINGS, SETTINGS_DOC_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["lowStockAlerts"], json!(false));
    }
}
