//! Tests for graceful shutdown coordination.

use gg_batch::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);
    assert!(coordinator.is_accepting());
}

#[tokio::test]
async fn test_track_increments_count() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.in_flight_count(), 0);

    let guard = coordinator.track();
    assert!(guard.is_some());
    assert_eq!(coordinator.in_flight_count(), 1);

    drop(guard);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_multiple_guards_track_correctly() {
    let coordinator = ShutdownCoordinator::new();

    let g1 = coordinator.track();
    let g2 = coordinator.track();
    let g3 = coordinator.track();
    assert_eq!(coordinator.in_flight_count(), 3);

    drop(g1);
    assert_eq!(coordinator.in_flight_count(), 2);

    drop(g2);
    drop(g3);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_track_returns_none_when_draining() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let _held = coordinator.track();
    let coord_clone = coordinator.clone();

    let handle = tokio::spawn(async move {
        coord_clone.initiate(Duration::from_millis(100)).await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(coordinator.state(), ShutdownState::Draining);
    assert!(!coordinator.is_accepting());
    assert!(coordinator.track().is_none());

    let _ = handle.await;
}

#[tokio::test]
async fn test_initiate_completes_immediately_when_idle() {
    let coordinator = ShutdownCoordinator::new();

    let result = coordinator.initiate(Duration::from_secs(1)).await;

    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_initiate_waits_for_guards() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.track();
    let coord_clone = coordinator.clone();

    let handle = tokio::spawn(async move {
        coord_clone.initiate(Duration::from_secs(2)).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    drop(guard);

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, ShutdownResult::Complete);
}

#[tokio::test]
async fn test_initiate_times_out_with_remaining_count() {
    let coordinator = ShutdownCoordinator::new();
    let _g1 = coordinator.track();
    let _g2 = coordinator.track();

    let result = coordinator.initiate(Duration::from_millis(50)).await;

    assert_eq!(result, ShutdownResult::Timeout { remaining: 2 });
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_guards_released_from_other_tasks() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guards: Vec<_> = (0..8).filter_map(|_| coordinator.track()).collect();
    assert_eq!(coordinator.in_flight_count(), 8);

    for guard in guards {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });
    }

    let result = coordinator.initiate(Duration::from_secs(1)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(coordinator.in_flight_count(), 0);
}
