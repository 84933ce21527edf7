use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::application::ports::actor::ActorProvider;
use crate::application::ports::remote_store::RemoteStore;
use crate::application::services::{
    InventoryService, MovementService, SettingsService, SupplierService, SyncContext, SyncReport,
    SyncService, SyncStatus, UserService,
};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::config::AppConfig;
use crate::shared::error::Result;

/// Top-level wiring: the migrated queue database, the shared context, one
/// service per sync slot, and the periodic driver (when auto-sync is on).
pub struct AppState {
    pub movements: MovementService,
    pub inventories: InventoryService,
    pub suppliers: SupplierService,
    pub users: UserService,
    pub settings: SettingsService,
    ctx: SyncContext,
    pool: ConnectionPool,
    sync: Arc<SyncService>,
    driver: Option<JoinHandle<()>>,
}

impl AppState {
    pub async fn new(
        config: AppConfig,
        remote: Arc<dyn RemoteStore>,
        actor: Arc<dyn ActorProvider>,
    ) -> Result<Self> {
        let pool =
            ConnectionPool::new(&config.database.url, config.database.max_connections).await?;
        Self::with_pool(pool, config, remote, actor).await
    }

    /// In-memory queue database, for tests and previews.
    pub async fn in_memory(
        config: AppConfig,
        remote: Arc<dyn RemoteStore>,
        actor: Arc<dyn ActorProvider>,
    ) -> Result<Self> {
        let pool = ConnectionPool::from_memory().await?;
        Self::with_pool(pool, config, remote, actor).await
    }

    async fn with_pool(
        pool: ConnectionPool,
        config: AppConfig,
        remote: Arc<dyn RemoteStore>,
        actor: Arc<dyn ActorProvider>,
    ) -> Result<Self> {
        pool.migrate().await?;

        let ctx = SyncContext::new(remote, pool.get_pool().clone(), actor, config.sync.clone());
        let movements = MovementService::new(ctx.clone());
        let inventories = InventoryService::new(ctx.clone());
        let suppliers = SupplierService::new(ctx.clone());
        let users = UserService::new(ctx.clone());
        let settings = SettingsService::new(ctx.clone());

        let mut sync = SyncService::new(&config.sync);
        sync.register(Arc::new(movements.clone()));
        sync.register(Arc::new(inventories.clone()));
        sync.register(Arc::new(suppliers.clone()));
        sync.register(Arc::new(users.clone()));
        sync.register(Arc::new(settings.clone()));
        let sync = Arc::new(sync);

        let driver = config.sync.auto_sync.then(|| sync.clone().spawn());
        if driver.is_some() {
            tracing::info!(
                interval_secs = config.sync.sync_interval_secs,
                "auto-sync driver started"
            );
        }

        Ok(Self {
            movements,
            inventories,
            suppliers,
            users,
            settings,
            ctx,
            pool,
            sync,
            driver,
        })
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Forces one sync cycle outside the periodic schedule.
    pub async fn sync_now(&self) -> SyncReport {
        self.sync.sync_once().await
    }

    pub fn last_sync_report(&self) -> Option<SyncReport> {
        self.sync.last_report()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Queued-operation counts per slot, for status surfaces.
    pub async fn pending_counts(&self) -> Result<Vec<(String, u32)>> {
        self.sync.pending_counts().await
    }

    pub async fn shutdown(mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.pool.close().await;
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::actor::Actor;
    use crate::application::ports::remote_store::RemoteStore as _;
    use crate::application::services::movement_service::StockMovementInput;
    use crate::domain::collections;
    use crate::infrastructure::auth::StaticActorProvider;
    use crate::infrastructure::remote::MemoryRemoteStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_wiring_serves_offline_writes_and_manual_sync() {
        let store = MemoryRemoteStore::new();
        store.seed(
            collections::ARTICLES,
            "a1",
            json!({ "name": "Gloves", "currentStock": 10, "minStock": 2, "status": "normal" }),
        );

        let mut config = AppConfig::default();
        config.sync.auto_sync = false;
        let state = AppState::in_memory(
            config,
            Arc::new(store.clone()),
            Arc::new(StaticActorProvider::new(Actor::new("u1", "Admin"))),
        )
        .await
        .unwrap();

        store.set_online(false);
        state
            .movements
            .create_stock_entry(StockMovementInput {
                article_id: "a1".into(),
                quantity: 2,
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(state.pending_counts().await.unwrap()[0].1, 1);

        store.set_online(true);
        let report = state.sync_now().await;
        assert!(report.fully_drained());
        assert!(state.last_sync_report().is_some());
        assert!(state.sync_status().last_sync.is_some());

        let article = store
            .get(collections::ARTICLES, "a1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.fields["currentStock"], json!(12));

        state.shutdown().await;
    }
}
