use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::application::ports::remote_store::{Document, QueryFilter};
use crate::application::services::context::SyncContext;
use crate::application::services::fallback::write_with_fallback;
use crate::application::services::sync_service::SyncParticipant;
use crate::domain::collections;
use crate::domain::value_objects::{is_local_id, OperationKind};
use crate::infrastructure::queue::{DrainOutcome, OperationRecord, PendingQueue};
use crate::shared::error::{AppError, Result};

pub const PENDING_SUPPLIER_OPS: &str = "pendingSupplierOps";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierInput {
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Supplier directory writes plus the name lookup used when attaching
/// a supplier to incoming stock.
#[derive(Clone)]
pub struct SupplierService {
    ctx: SyncContext,
    queue: PendingQueue,
}

impl SupplierService {
    pub fn new(ctx: SyncContext) -> Self {
        let queue = ctx.queue(PENDING_SUPPLIER_OPS);
        Self { ctx, queue }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub async fn create_supplier(&self, input: SupplierInput) -> Result<String> {
        Self::validate(&input)?;
        let payload = serde_json::to_value(&input)?;
        let id = write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::CreateSupplier,
            payload,
            self.apply_create(&input),
        )
        .await?;

        if is_local_id(&id) {
            let mut fields = self.supplier_fields(&input);
            fields["id"] = json!(id);
            self.ctx
                .mirror()
                .insert(collections::SUPPLIERS, &id, fields);
        }
        Ok(id)
    }

    pub async fn update_supplier(&self, supplier_id: &str, input: SupplierInput) -> Result<String> {
        Self::validate(&input)?;
        if supplier_id.trim().is_empty() {
            return Err(AppError::ValidationError("supplier id is required".into()));
        }

        let mut payload = serde_json::to_value(&input)?;
        payload["supplierId"] = json!(supplier_id);
        write_with_fallback(
            &self.ctx,
            &self.queue,
            OperationKind::UpdateSupplier,
            payload,
            self.apply_update(supplier_id, &input),
        )
        .await
    }

    /// Used when a stock entry names its supplier free-form: reuse the
    /// existing supplier when one matches, otherwise create a bare record.
    /// Offline, the create degrades to the queue like any other write.
    pub async fn lookup_or_create(&self, name: &str) -> Result<String> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok(existing.id);
        }
        self.create_supplier(SupplierInput {
            name: name.trim().to_string(),
            contact: None,
            email: None,
            phone: None,
        })
        .await
    }

    /// Resolves a free-typed supplier name to a document. Tries the remote
    /// by prefix first, then falls back to the local mirror when the remote
    /// is unreachable.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Document>> {
        let needle = name.trim();
        if needle.is_empty() {
            return Ok(None);
        }

        let remote_result = tokio::time::timeout(
            self.ctx.config().read_timeout(),
            self.ctx
                .remote()
                .query_once(collections::SUPPLIERS, &[QueryFilter::prefix("name", needle)]),
        )
        .await;

        match remote_result {
            Ok(Ok(docs)) => {
                for doc in &docs {
                    self.ctx
                        .mirror()
                        .insert(collections::SUPPLIERS, &doc.id, doc.fields.clone());
                }
                let exact = docs
                    .iter()
                    .find(|doc| doc.str_field("name") == Some(needle));
                Ok(exact.or_else(|| docs.first()).cloned())
            }
            Ok(Err(err)) if !AppError::from(err.clone()).fallback_eligible() => Err(err.into()),
            other => {
                if let Ok(Err(err)) = other {
                    tracing::warn!(error = %err, "supplier lookup degraded to local mirror");
                } else {
                    tracing::warn!("supplier lookup timed out, using local mirror");
                }
                Ok(self.mirror_lookup(needle))
            }
        }
    }

    fn mirror_lookup(&self, needle: &str) -> Option<Document> {
        let mirror = self.ctx.mirror();
        let exact = mirror.find(collections::SUPPLIERS, |fields| {
            fields.get("name").and_then(Value::as_str) == Some(needle)
        });
        if exact.is_some() {
            return exact;
        }
        // Substring pass stays case-sensitive, matching the remote's
        // case-sensitive prefix query.
        mirror.find(collections::SUPPLIERS, |fields| {
            fields
                .get("name")
                .and_then(Value::as_str)
                .map(|name| name.contains(needle))
                .unwrap_or(false)
        })
    }

    fn validate(input: &SupplierInput) -> Result<()> {
        if input.name.trim().is_empty() {
            return Err(AppError::ValidationError("supplier name is required".into()));
        }
        Ok(())
    }

    fn supplier_fields(&self, input: &SupplierInput) -> Value {
        let now = Utc::now();
        json!({
            "name": input.name,
            "contact": input.contact,
            "email": input.email,
            "phone": input.phone,
            "createdAt": now,
            "updatedAt": now,
        })
    }

    async fn apply_create(&self, input: &SupplierInput) -> Result<String> {
        let fields = self.supplier_fields(input);
        let id = self
            .ctx
            .remote()
            .simple_write(collections::SUPPLIERS, fields)
            .await?;
        Ok(id)
    }

    async fn apply_update(&self, supplier_id: &str, input: &SupplierInput) -> Result<String> {
        let supplier_id = self.ctx.resolve_id(supplier_id);
        self.ctx
            .remote()
            .simple_update(
                collections::SUPPLIERS,
                &supplier_id,
                json!({
                    "name": input.name,
                    "contact": input.contact,
                    "email": input.email,
                    "phone": input.phone,
                    "updatedAt": Utc::now(),
                }),
            )
            .await?;
        Ok(supplier_id)
    }

    pub(crate) async fn replay(&self, record: &OperationRecord) -> Result<()> {
        match OperationKind::from(record.operation.as_str()) {
            OperationKind::CreateSupplier => {
                let input: SupplierInput = serde_json::from_value(record.payload.clone())?;
                let remote_id = self.apply_create(&input).await?;
                if let Some(local_id) = record.payload.get("localId").and_then(Value::as_str) {
                    self.ctx
                        .record_reconciliation(collections::SUPPLIERS, local_id, &remote_id);
                }
                Ok(())
            }
            OperationKind::UpdateSupplier => {
                let supplier_id = record
                    .payload
                    .get("supplierId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::ValidationError("queued supplier update lacks supplierId".into())
                    })?;
                let input: SupplierInput = serde_json::from_value(record.payload.clone())?;
                self.apply_update(supplier_id, &input).await?;
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
impl SyncParticipant for SupplierService {
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
    use crate::domain::entities::Supplier;
    use crate::infrastructure::auth::StaticActorProvider;
    use crate::infrastructure::remote::MemoryRemoteStore;
    use crate::shared::config::SyncConfig;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup() -> (SupplierService, MemoryRemoteStore, SyncContext) {
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
        (SupplierService::new(ctx.clone()), store, ctx)
    }

    fn acme() -> SupplierInput {
        SupplierInput {
            name: "Acme Medical".into(),
            contact: Some("J. Doe".into()),
            email: Some("sales@acme.example".into()),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_by_name() {
        let (service, _store, _ctx) = setup().await;

        let id = service.create_supplier(acme()).await.unwrap();
        assert!(!is_local_id(&id));

        let found = service.find_by_name("Acme Medical").await.unwrap().unwrap();
        let supplier: Supplier = found.decode().unwrap();
        assert_eq!(supplier.id, id);
        assert_eq!(supplier.contact.as_deref(), Some("J. Doe"));
    }

    #[tokio::test]
    async fn test_lookup_or_create_reuses_then_creates() {
        let (service, store, _ctx) = setup().await;

        let id = service.create_supplier(acme()).await.unwrap();
        assert_eq!(service.lookup_or_create("Acme Medical").await.unwrap(), id);

        let other = service.lookup_or_create("Apex Supplies").await.unwrap();
        assert_ne!(other, id);
        assert_eq!(store.document_count(collections::SUPPLIERS), 2);
    }

    #[tokio::test]
    async fn test_lookup_or_create_offline_queues_a_create() {
        let (service, store, _ctx) = setup().await;
        store.set_online(false);

        let id = service.lookup_or_create("Acme Medical").await.unwrap();
        assert!(is_local_id(&id));

        let records = service.queue().peek_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "createSupplier");
    }

    #[tokio::test]
    async fn test_find_falls_back_to_mirror_when_offline() {
        let (service, store, _ctx) = setup().await;

        service.create_supplier(acme()).await.unwrap();
        // The successful lookup warms the mirror.
        service.find_by_name("Acme Medical").await.unwrap().unwrap();

        store.set_online(false);
        let found = service.find_by_name("Acme").await.unwrap();
        assert!(found.is_some(), "mirror should answer substring lookups offline");
    }

    #[tokio::test]
    async fn test_mirror_lookup_is_case_sensitive() {
        let (service, store, _ctx) = setup().await;

        let remote_id = service.create_supplier(acme()).await.unwrap();
        service.find_by_name("Acme Medical").await.unwrap().unwrap();

        store.set_online(false);
        // Lowercased name must miss the mirror and queue a fresh create,
        // never silently reuse "Acme Medical".
        let id = service.lookup_or_create("acme").await.unwrap();
        assert_ne!(id, remote_id);
        assert!(is_local_id(&id));

        let records = service.queue().peek_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "createSupplier");
        assert_eq!(records[0].payload["name"], "acme");
    }

    #[tokio::test]
    async fn test_offline_update_queues_and_replays() {
        let (service, store, _ctx) = setup().await;

        let id = service.create_supplier(acme()).await.unwrap();
        store.set_online(false);

        let mut changed = acme();
        changed.phone = Some("+33 1 02 03 04 05".into());
        service.update_supplier(&id, changed).await.unwrap();

        let records = service.queue().peek_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "updateSupplier");

        store.set_online(true);
        service.replay(&records[0]).await.unwrap();

        let doc = store
            .get(collections::SUPPLIERS, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.str_field("phone"), Some("+33 1 02 03 04 05"));
    }
}
