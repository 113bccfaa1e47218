//! Golden path: register a game, stream pushed updates through the batch
//! timer, read through the cache, and watch invalidation keep it coherent.

use aggregator_service::test_utils::MockGameAdapter;
use aggregator_service::CacheKey;
use gamebridge_e2e_tests::{start_aggregator, wait_for};
use std::sync::Arc;
use std::time::Duration;
use types::{CoreEvent, StandardizedGameData, SyncEventKind};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test]
async fn pushed_updates_flow_through_the_batch_timer() {
    init_logging();
    let aggregator = start_aggregator().await.unwrap();
    let mut events = aggregator.subscribe();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    aggregator.register_game(adapter.clone()).await.unwrap();
    assert!(adapter.is_subscribed());

    // Push 5 updates faster than the batch interval
    for i in 0..5 {
        assert!(adapter.push_update(&format!("p{i}")));
    }

    // The engine-wide batch timer drains the queue on its own
    let drained = wait_for(
        || {
            aggregator
                .sync_engine()
                .sync_status("g1")
                .map(|s| s.pending_updates == 0 && s.last_sync_time.is_some())
                .unwrap_or(false)
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(drained, "batch timer never drained the queue");

    let status = aggregator.sync_engine().sync_status("g1").unwrap();
    assert!(status.is_connected);
    assert_eq!(status.error_count, 0);

    // All 5 validated updates were republished as player_update events
    let mut updates = 0;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Sync(sync) = event {
            if sync.kind == SyncEventKind::PlayerUpdate {
                assert!(sync.data.is_some());
                updates += 1;
            }
        }
    }
    assert_eq!(updates, 5);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn cache_serves_repeat_reads_until_invalidated() {
    let aggregator = start_aggregator().await.unwrap();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    aggregator.register_game(adapter.clone()).await.unwrap();

    let first = aggregator.get_player_game_data("p1", "g1").await.unwrap();
    let fetches_after_first = adapter.fetch_calls();

    let second = aggregator.get_player_game_data("p1", "g1").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        adapter.fetch_calls(),
        fetches_after_first,
        "second read must be served from cache"
    );

    // A pushed update invalidates the player's cached snapshot
    adapter.push_update("p1");
    let key = CacheKey::new("player_data").game("g1").player("p1").build();
    let invalidated = wait_for(
        || {
            aggregator
                .cache()
                .get::<StandardizedGameData>(&key)
                .is_none()
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(invalidated, "player update never invalidated the cache");

    // The next read goes back to the adapter
    aggregator.get_player_game_data("p1", "g1").await.unwrap();
    assert!(adapter.fetch_calls() > fetches_after_first);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn unregister_stops_sync_and_hides_the_game() {
    let aggregator = start_aggregator().await.unwrap();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    aggregator.register_game(adapter.clone()).await.unwrap();
    assert!(aggregator.sync_engine().sync_status("g1").is_some());

    aggregator.unregister_game("g1").await.unwrap();

    let stopped = wait_for(
        || aggregator.sync_engine().sync_status("g1").is_none(),
        Duration::from_secs(2),
    )
    .await;
    assert!(stopped, "sync kept running after unregister");
    assert!(!aggregator.registry().is_game_supported("g1").await);
    assert!(!adapter.is_subscribed());

    aggregator.shutdown().await;
}
