//! Tests for graceful shutdown coordination.

mod common;

use std::sync::Arc;
use std::time::Duration;

use refine_core::backend::{EnhanceOptions, EnhancementError};
use refine_core::orchestrator::{RequestError, RequestIdentity, RequestOptions};
use refine_core::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};

use common::{capitalize, config, start};

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test]
async fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);
    assert!(coordinator.is_accepting());
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

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_drains_in_flight_requests() {
    let slow = |text: &str, _: &EnhanceOptions| -> Result<String, EnhancementError> {
        std::thread::sleep(Duration::from_millis(100));
        Ok(text.to_uppercase())
    };
    let f = start(config(2), 0.4, slow);
    let pipeline = Arc::new(f.pipeline);

    let in_flight = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .submit_request(RequestIdentity::new("src", "draining"), RequestOptions::default())
                .await
        })
    };
    while pipeline.orchestrator().admission_load().active == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let result = pipeline.shutdown(Duration::from_secs(5)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert!(in_flight.await.unwrap().unwrap().result.enhanced);

    let err = pipeline
        .submit_request(RequestIdentity::new("src", "late"), RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::ShuttingDown);
}

#[tokio::test]
async fn test_pipeline_shutdown_is_idempotent() {
    let f = start(config(2), 0.4, capitalize);
    assert_eq!(f.pipeline.shutdown(Duration::from_millis(200)).await, ShutdownResult::Complete);
    assert_eq!(f.pipeline.shutdown(Duration::from_millis(200)).await, ShutdownResult::Complete);
    assert!(!f.pipeline.pool().is_accepting());
}
