mod common;

use std::sync::Arc;

use serde_json::json;

use stockroom_sync::application::services::movement_service::{
    MovementService, StockMovementInput, PENDING_MOVEMENT_OPS,
};
use stockroom_sync::application::ports::remote_store::RemoteStore;
use stockroom_sync::application::services::{SyncParticipant, SyncService};
use stockroom_sync::domain::collections;
use stockroom_sync::domain::entities::{Article, Movement, StockAlert};
use stockroom_sync::domain::value_objects::{
    is_local_id, ArticleStatus, MovementStatus, MovementType,
};
use stockroom_sync::shared::error::AppError;

use common::{seed_article, setup};

#[tokio::test]
async fn online_entry_updates_stock_and_records_validated_movement() {
    let env = setup().await;
    seed_article(&env.store, "a1", 10, 2);

    let movements = MovementService::new(env.ctx.clone());
    let movement_id = movements
        .create_stock_entry(StockMovementInput {
            article_id: "a1".into(),
            quantity: 3,
            reason: Some("restock".into()),
        })
        .await
        .unwrap();

    assert!(!is_local_id(&movement_id));
    let article: Article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!(article.current_stock, 13);
    assert_eq!(article.status, ArticleStatus::Normal);

    let movement: Movement = env
        .store
        .get(collections::MOVEMENTS, &movement_id)
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!(movement.movement_type, MovementType::Entry);
    assert_eq!(movement.status, MovementStatus::Validated);
    assert_eq!(movement.quantity, 3);
    assert_eq!(movement.validated_by.as_deref(), Some("admin-1"));

    // Nothing queued on the happy path.
    assert!(movements.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn exit_to_zero_marks_article_out_and_raises_alert() {
    let env = setup().await;
    seed_article(&env.store, "a1", 4, 2);

    let movements = MovementService::new(env.ctx.clone());
    movements
        .create_stock_exit(StockMovementInput {
            article_id: "a1".into(),
            quantity: 4,
            reason: None,
        })
        .await
        .unwrap();

    let article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.fields["currentStock"], json!(0));
    assert_eq!(article.str_field("status"), Some("out"));

    let alerts = env
        .store
        .query_once(collections::STOCK_ALERTS, &[])
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    let alert: StockAlert = alerts[0].decode().unwrap();
    assert_eq!(alert.article_id, "a1");
    assert_eq!(alert.level, ArticleStatus::Out);
    assert_eq!(alert.current_stock, 0);
}

#[tokio::test]
async fn insufficient_stock_fails_cleanly_online_and_offline() {
    let env = setup().await;
    seed_article(&env.store, "a1", 2, 1);
    let movements = MovementService::new(env.ctx.clone());

    let oversized = StockMovementInput {
        article_id: "a1".into(),
        quantity: 5,
        reason: None,
    };

    let err = movements.create_stock_exit(oversized.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    // A business rejection is final: it must not be parked in the queue
    // even when the remote is unreachable.
    env.store.set_online(false);
    seed_article(&env.store, "a1", 2, 1);
    let err = movements.create_stock_exit(oversized).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));
    assert!(movements.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn offline_entry_queues_then_reconnect_drains_and_reconciles() {
    let env = setup().await;
    seed_article(&env.store, "a1", 10, 2);
    let movements = MovementService::new(env.ctx.clone());
    let mut reconciliations = env.ctx.subscribe_reconciliations();

    env.store.set_online(false);
    let local_id = movements
        .create_stock_entry(StockMovementInput {
            article_id: "a1".into(),
            quantity: 3,
            reason: None,
        })
        .await
        .unwrap();
    assert!(is_local_id(&local_id));

    // The remote saw nothing; the operation is parked in its named slot
    // and a pending movement is visible locally under the temporary id.
    assert_eq!(env.store.document_count(collections::MOVEMENTS), 0);
    let queued = movements.queue().peek_all().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].operation, "createStockEntry");
    let mirrored = env
        .ctx
        .mirror()
        .get(collections::MOVEMENTS, &local_id)
        .unwrap();
    assert_eq!(mirrored.str_field("status"), Some("pending"));

    env.store.set_online(true);
    let mut sync = SyncService::new(env.ctx.config());
    sync.register(Arc::new(movements.clone()));
    let report = Arc::new(sync).sync_once().await;
    assert!(report.fully_drained());

    // Stock applied once, movement validated, temporary id reconciled.
    let article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.fields["currentStock"], json!(13));
    assert!(movements.queue().is_empty().await.unwrap());

    let event = reconciliations.recv().await.unwrap();
    assert_eq!(event.collection, collections::MOVEMENTS);
    assert_eq!(event.local_id, local_id);
    assert!(!is_local_id(&event.remote_id));
    assert_ne!(env.ctx.resolve_id(&local_id), local_id);
    assert!(env
        .ctx
        .mirror()
        .get(collections::MOVEMENTS, &local_id)
        .is_none());
}

#[tokio::test]
async fn queued_exit_replays_against_current_stock_not_stale_snapshot() {
    let env = setup().await;
    seed_article(&env.store, "a1", 5, 1);
    let movements = MovementService::new(env.ctx.clone());

    env.store.set_online(false);
    movements
        .create_stock_exit(StockMovementInput {
            article_id: "a1".into(),
            quantity: 4,
            reason: None,
        })
        .await
        .unwrap();

    // Someone else drained the stock while we were offline.
    env.store.seed(
        collections::ARTICLES,
        "a1",
        json!({ "name": "Article a1", "currentStock": 2, "minStock": 1, "status": "normal" }),
    );
    env.store.set_online(true);

    let outcome = movements.sync_pending().await.unwrap();
    // Replay re-derives against current remote stock, so the exit is now
    // a business error; the record stays queued and no stock is touched.
    assert_eq!(outcome.attempted, 1);
    assert_eq!(outcome.replayed, 0);
    assert_eq!(outcome.remaining, 1);

    let article = env
        .store
        .get(collections::ARTICLES, "a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.fields["currentStock"], json!(2));
}
