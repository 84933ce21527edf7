mod common;

use std::time::Duration;

use serde_json::json;

use stockroom_sync::application::ports::remote_store::Document;
use stockroom_sync::application::services::ReadState;
use stockroom_sync::domain::collections;

use common::{seed_article, setup};

fn cached_articles() -> Vec<Document> {
    vec![Document {
        id: "a1".into(),
        fields: json!({ "name": "Article a1 (cached)", "currentStock": 9 }),
    }]
}

#[tokio::test]
async fn reader_goes_live_and_tracks_remote_changes() {
    let env = setup().await;
    seed_article(&env.store, "a1", 10, 2);

    let mut reader = env.ctx.reader(collections::ARTICLES, vec![], cached_articles());
    let view = reader.settled().await;
    assert_eq!(view.state, ReadState::Live);
    assert_eq!(view.documents[0].fields["currentStock"], json!(10));

    env.store.seed(
        collections::ARTICLES,
        "a1",
        json!({ "name": "Article a1", "currentStock": 7, "minStock": 2, "status": "normal" }),
    );
    assert!(reader.changed().await);
    assert_eq!(reader.current().documents[0].fields["currentStock"], json!(7));
}

#[tokio::test(start_paused = true)]
async fn silent_remote_degrades_to_cached_data_at_the_timeout() {
    let env = setup().await;
    env.store.set_unresponsive(true);

    let mut reader = env.ctx.reader(collections::ARTICLES, vec![], cached_articles());
    assert_eq!(reader.state(), ReadState::Connecting);

    let view = reader.settled().await;
    assert_eq!(view.state, ReadState::OfflineFallback);
    assert_eq!(view.documents[0].fields["name"], json!("Article a1 (cached)"));

    // The degraded view is terminal until the remote actually answers.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(reader.state(), ReadState::OfflineFallback);
}

#[tokio::test]
async fn connection_error_degrades_then_snapshot_recovers_live() {
    let env = setup().await;
    seed_article(&env.store, "a1", 10, 2);

    let mut reader = env.ctx.reader(collections::ARTICLES, vec![], cached_articles());
    reader.settled().await;

    env.store.set_online(false);
    while reader.state() != ReadState::OfflineFallback {
        assert!(reader.changed().await);
    }

    env.store.set_online(true);
    while reader.state() != ReadState::Live {
        assert!(reader.changed().await);
    }
    assert_eq!(reader.current().documents[0].id, "a1");
}

#[tokio::test(start_paused = true)]
async fn retry_connection_dials_again_after_a_degrade() {
    let env = setup().await;
    seed_article(&env.store, "a1", 10, 2);
    env.store.set_unresponsive(true);

    let mut reader = env.ctx.reader(collections::ARTICLES, vec![], cached_articles());
    let view = reader.settled().await;
    assert_eq!(view.state, ReadState::OfflineFallback);

    env.store.set_unresponsive(false);
    reader.retry_connection();
    loop {
        assert!(reader.changed().await);
        if reader.state() == ReadState::Live {
            break;
        }
    }
    assert_eq!(reader.current().documents[0].id, "a1");
}
