use std::sync::Arc;

use serde_json::json;

use stockroom_sync::application::ports::actor::Actor;
use stockroom_sync::application::services::SyncContext;
use stockroom_sync::domain::collections;
use stockroom_sync::infrastructure::auth::StaticActorProvider;
use stockroom_sync::infrastructure::database::ConnectionPool;
use stockroom_sync::infrastructure::remote::MemoryRemoteStore;
use stockroom_sync::shared::config::SyncConfig;

pub struct TestContext {
    pub store: MemoryRemoteStore,
    pub ctx: SyncContext,
    pub pool: ConnectionPool,
}

/// Fresh in-memory setup: migrated sqlite queue, in-memory remote, and a
/// signed-in admin actor.
pub async fn setup() -> TestContext {
    // sqlx's sqlite connection lives on a plain OS thread tokio cannot see;
    // under `start_paused` the pool's acquire timer would auto-advance and
    // fire before that thread answers. An in-flight `spawn_blocking` task
    // inhibits auto-advance, so the connect and migration run inside one.
    let handle = tokio::runtime::Handle::current();
    let pool = tokio::task::spawn_blocking(move || {
        handle.block_on(async {
            let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
            pool.migrate().await.expect("migrations");
            pool
        })
    })
    .await
    .expect("pool setup task");

    let store = MemoryRemoteStore::new();
    let ctx = SyncContext::new(
        Arc::new(store.clone()),
        pool.get_pool().clone(),
        Arc::new(StaticActorProvider::new(Actor::new("admin-1", "Admin"))),
        SyncConfig::default(),
    );

    TestContext { store, ctx, pool }
}

/// Seeds one article with the given stock levels and returns its id.
pub fn seed_article(store: &MemoryRemoteStore, id: &str, current: i64, min: i64) -> String {
    let status = if current <= 0 {
        "out"
    } else if current <= min {
        "low"
    } else {
        "normal"
    };
    let now = chrono::Utc::now();
    store.seed(
        collections::ARTICLES,
        id,
        json!({
            "name": format!("Article {id}"),
            "currentStock": current,
            "minStock": min,
            "status": status,
            "createdAt": now,
            "updatedAt": now,
        }),
    );
    id.to_string()
}
