mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use stockroom_sync::application::services::movement_service::{
    MovementService, StockMovementInput,
};
use stockroom_sync::application::services::settings_service::SettingsService;
use stockroom_sync::application::services::supplier_service::{SupplierInput, SupplierService};
use stockroom_sync::application::ports::remote_store::RemoteStore;
use stockroom_sync::application::services::{SyncParticipant, SyncService};
use stockroom_sync::domain::collections;
use stockroom_sync::shared::config::SyncConfig;

use common::{seed_article, setup};

fn entry(article_id: &str, quantity: i64) -> StockMovementInput {
    StockMovementInput {
        article_id: article_id.into(),
        quantity,
        reason: None,
    }
}

#[tokio::test]
async fn queued_operations_replay_in_insertion_order() {
    let env = setup().await;
    seed_article(&env.store, "a1", 0, 2);
    let movements = MovementService::new(env.ctx.clone());

    env.store.set_online(false);
    movements.create_stock_entry(entry("a1", 5)).await.unwrap();
    movements.create_stock_exit(entry("a1", 3)).await.unwrap();
    env.store.set_online(true);

    // The exit only succeeds because the entry replays first; reversed
    // order would reject it for insufficient stock.
    let outcome = movements.sync_pending().await.unwrap();
    assert_eq!(outcome.replayed, 2);
    assert_eq!(outcome.remaining, 0);

    let article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.fields["currentStock"], json!(2));
}

#[tokio::test]
async fn identical_payloads_are_distinct_queue_entries() {
    let env = setup().await;
    seed_article(&env.store, "a1", 0, 0);
    let movements = MovementService::new(env.ctx.clone());

    env.store.set_online(false);
    movements.create_stock_entry(entry("a1", 1)).await.unwrap();
    movements.create_stock_entry(entry("a1", 1)).await.unwrap();
    env.store.set_online(true);

    let outcome = movements.sync_pending().await.unwrap();
    assert_eq!(outcome.replayed, 2);

    // Both replays applied: two movements exist and the stock moved twice.
    assert_eq!(env.store.document_count(collections::MOVEMENTS), 2);
    let article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.fields["currentStock"], json!(2));
}

#[tokio::test]
async fn repeated_failed_cycles_never_drop_entries() {
    let env = setup().await;
    seed_article(&env.store, "a1", 0, 0);
    let movements = MovementService::new(env.ctx.clone());

    env.store.set_online(false);
    movements.create_stock_entry(entry("a1", 1)).await.unwrap();

    for _ in 0..3 {
        let outcome = movements.sync_pending().await.unwrap();
        assert_eq!(outcome.replayed, 0);
        assert_eq!(outcome.remaining, 1);
    }

    env.store.set_online(true);
    let outcome = movements.sync_pending().await.unwrap();
    assert_eq!(outcome.replayed, 1);
    assert!(movements.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn slots_are_isolated_per_service() {
    let env = setup().await;
    seed_article(&env.store, "a1", 0, 0);
    let movements = MovementService::new(env.ctx.clone());
    let suppliers = SupplierService::new(env.ctx.clone());
    let settings = SettingsService::new(env.ctx.clone());

    env.store.set_online(false);
    movements.create_stock_entry(entry("a1", 1)).await.unwrap();
    suppliers
        .create_supplier(SupplierInput {
            name: "Acme Medical".into(),
            contact: None,
            email: None,
            phone: None,
        })
        .await
        .unwrap();
    settings
        .update_settings(json!({ "lowStockAlerts": true }))
        .await
        .unwrap();
    env.store.set_online(true);

    let mut sync = SyncService::new(env.ctx.config());
    sync.register(Arc::new(movements.clone()));
    sync.register(Arc::new(suppliers.clone()));
    sync.register(Arc::new(settings.clone()));
    let sync = Arc::new(sync);

    let counts = sync.pending_counts().await.unwrap();
    assert_eq!(
        counts,
        vec![
            ("pendingMovementOps".to_string(), 1),
            ("pendingSupplierOps".to_string(), 1),
            ("pendingSettingsOps".to_string(), 1),
        ]
    );

    let report = sync.sync_once().await;
    assert!(report.fully_drained());
    assert_eq!(env.store.document_count(collections::MOVEMENTS), 1);
    assert_eq!(env.store.document_count(collections::SUPPLIERS), 1);
    assert_eq!(env.store.document_count(collections::SETTINGS), 1);
}

#[tokio::test]
async fn periodic_driver_drains_after_reconnect() {
    let env = setup().await;
    seed_article(&env.store, "a1", 0, 0);
    let movements = MovementService::new(env.ctx.clone());

    env.store.set_online(false);
    movements.create_stock_entry(entry("a1", 1)).await.unwrap();

    let config = SyncConfig {
        sync_interval_secs: 1,
        ..SyncConfig::default()
    };
    let mut sync = SyncService::new(&config);
    sync.register(Arc::new(movements.clone()));
    let sync = Arc::new(sync);
    let handle = sync.clone().spawn();

    // Give the driver a failing cycle, then reconnect and wait for the
    // queue to empty on a later tick.
    tokio::time::sleep(Duration::from_millis(200)).await;
    env.store.set_online(true);

    let mut drained = false;
    for _ in 0..50 {
        if movements.queue().is_empty().await.unwrap() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    handle.abort();
    assert!(drained, "driver should drain the queue after reconnect");
    assert_eq!(env.store.document_count(collections::MOVEMENTS), 1);
}
