mod common;

use common::*;
use gentree_core::models::{Candidate, Job};
use gentree_core::orchestration::OrchestrationSystem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

#[tokio::test]
async fn test_loops_make_progress_and_stop_on_shutdown() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[2]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let compute = Arc::new(MockComputeService::new());
    compute.complete("ext-1", "first.png");
    compute.complete("ext-2", "second.png");

    let config = test_config(db.artifact_root());
    let system = Arc::new(OrchestrationSystem::new(db.pool.clone(), compute.clone(), &config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = system.start(shutdown_rx);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let mut conn = db.pool.acquire().await.unwrap();
        let ingested = Job::for_run(&mut conn, run.id)
            .await
            .unwrap()
            .iter()
            .filter(|job| job.candidate_id.is_some())
            .count();
        drop(conn);
        if ingested == 2 {
            break;
        }
        assert!(Instant::now() < deadline, "loops did not ingest both base candidates in time");
        sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), handles.join())
        .await
        .expect("loops should stop after shutdown");

    // A third base job may go out while one is still in flight and one is ingested.
    // It never completes, and once both base slots are filled nothing more is submitted.
    let submitted = compute.submitted_payloads().len();
    assert!((2..=3).contains(&submitted), "unexpected submission count {submitted}");
    let mut conn = db.pool.acquire().await.unwrap();
    let active = Candidate::count_active_for_step(&mut conn, run.id, fixture.base().id)
        .await
        .unwrap();
    assert_eq!(active, 2);
}
