//! Resilience under partial failure: one bad backend degrades itself and
//! nothing else, breakers fast-fail after sustained trouble, and the
//! monitor sees every error.

use aggregator_service::test_utils::MockGameAdapter;
use aggregator_service::{AdapterError, GameDataAggregator, RetryPolicy};
use gamebridge_e2e_tests::{fast_config, start_aggregator, wait_for};
use std::sync::Arc;
use std::time::Duration;
use types::{CoreEvent, HealthStatus};

#[tokio::test]
async fn one_failing_game_yields_partial_results() {
    let aggregator = start_aggregator().await.unwrap();

    for (id, name) in [("g1", "Voidlands"), ("g2", "Skyforge"), ("g3", "Mistveil")] {
        let adapter = Arc::new(MockGameAdapter::new(id, name));
        if id == "g3" {
            adapter.set_fail_fetch(true);
        }
        aggregator.register_game(adapter).await.unwrap();
    }

    let results = aggregator.sync_player_data("p1").await;
    assert_eq!(results.len(), 2);
    assert!(results.contains_key("g1"));
    assert!(results.contains_key("g2"));
    assert!(!results.contains_key("g3"));

    // The failing game carries the sync error, the healthy ones stay clean
    let statuses = aggregator.sync_engine().all_statuses();
    assert_eq!(statuses["g3"].error_count, 1);
    assert_eq!(statuses["g1"].error_count, 0);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn sustained_failures_open_the_breaker() {
    let mut config = fast_config();
    config.breaker_failure_threshold = 3;
    let aggregator = GameDataAggregator::new(config).unwrap();
    aggregator.initialize().await.unwrap();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    let mut game_config = adapter.default_config();
    // No local retries so each call maps to one breaker failure
    game_config.retry = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };
    aggregator
        .register_game_with_config(adapter.clone(), game_config)
        .await
        .unwrap();

    adapter.set_fail_fetch(true);
    for _ in 0..3 {
        let err = aggregator
            .get_player_game_data("p1", "g1")
            .await
            .unwrap_err();
        assert!(!matches!(err, AdapterError::CircuitBreakerOpen { .. }));
    }

    // Breaker is open now: fast-fail without touching the adapter
    let calls_before = adapter.fetch_calls();
    let err = aggregator
        .get_player_game_data("p1", "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::CircuitBreakerOpen { .. }));
    assert_eq!(adapter.fetch_calls(), calls_before);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn health_loop_reports_transitions_and_recovers() {
    let aggregator = start_aggregator().await.unwrap();
    let mut events = aggregator.subscribe();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    aggregator.register_game(adapter.clone()).await.unwrap();

    adapter.set_healthy(false);
    let mut saw_unhealthy = false;
    let observed = wait_for(
        || {
            while let Ok(event) = events.try_recv() {
                if let CoreEvent::AdapterHealthChanged { game_id, status } = event {
                    if game_id == "g1" && status == HealthStatus::Unhealthy {
                        saw_unhealthy = true;
                    }
                }
            }
            saw_unhealthy
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(observed, "health loop never reported the failure");

    assert_eq!(
        aggregator
            .registry()
            .get_registration("g1")
            .await
            .unwrap()
            .health,
        HealthStatus::Unhealthy
    );

    aggregator.shutdown().await;
}

#[tokio::test]
async fn adapter_errors_reach_the_monitor() {
    let aggregator = start_aggregator().await.unwrap();

    let adapter = Arc::new(MockGameAdapter::new("g1", "Voidlands"));
    let mut game_config = adapter.default_config();
    game_config.retry = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };
    aggregator
        .register_game_with_config(adapter.clone(), game_config)
        .await
        .unwrap();

    adapter.set_fail_fetch(true);
    let _ = aggregator.get_player_game_data("p1", "g1").await;

    let recorded = wait_for(
        || {
            let snapshot = aggregator.monitor().snapshot();
            snapshot.errors_by_category.get("network").copied().unwrap_or(0) > 0
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(recorded, "the monitor never saw the adapter error");

    let snapshot = aggregator.monitor().snapshot();
    assert!(snapshot.error_rate > 0.0);

    aggregator.shutdown().await;
}
