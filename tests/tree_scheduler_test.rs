mod common;

use common::*;
use gentree_core::config::SchedulerConfig;
use gentree_core::models::{Candidate, SchedulerState};
use gentree_core::orchestration::{SchedulingMode, TreeScheduler};
use gentree_core::review::ReviewService;
use std::collections::HashSet;

fn scheduler(db: &TestDb, seed: u64) -> TreeScheduler {
    TreeScheduler::with_seed(db.pool.clone(), SchedulerConfig::default(), seed)
}

#[tokio::test]
async fn test_no_runs_means_no_work() {
    let db = TestDb::new().await;
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::NoWork);
    assert!(unit.run_id.is_none());
}

#[tokio::test]
async fn test_empty_base_step_gets_base_generation() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;

    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::BaseGeneration);
    assert_eq!(unit.run_id, Some(run.id));
    assert_eq!(unit.step_id, Some(fixture.base().id));
    assert_eq!(unit.parent_id, None);
}

#[tokio::test]
async fn test_in_flight_jobs_saturate_base_step() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;

    create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    for _ in 0..2 {
        create_pending_job(&db.pool, run.id, fixture.base().id, None).await;
    }
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::BaseGeneration, "1 active < 3 and 2 in flight < 3");

    create_pending_job(&db.pool, run.id, fixture.base().id, None).await;
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_ne!(unit.mode, SchedulingMode::BaseGeneration, "3 in flight fills the cap");
}

#[tokio::test]
async fn test_base_guard_counts_active_and_in_flight_separately() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;

    for _ in 0..2 {
        create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    }
    create_pending_job(&db.pool, run.id, fixture.base().id, None).await;

    // 2 active + 1 in flight reaches the cap as a sum, yet each count is below it
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::BaseGeneration);
    assert_eq!(unit.step_id, Some(fixture.base().id));
    assert_eq!(unit.parent_id, None);

    create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::WaitingForApproval, "3 active fills the base step");
}

#[tokio::test]
async fn test_full_unapproved_base_waits_for_approval() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[2, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    for _ in 0..2 {
        create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    }

    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::WaitingForApproval);
    assert_eq!(unit.run_id, Some(run.id));
    assert_eq!(unit.step_id, Some(fixture.base().id));
    assert!(!unit.is_submittable());
}

#[tokio::test]
async fn test_unapproved_step_never_provides_parents() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[2, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    for _ in 0..2 {
        create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    }
    approve_step(&db.pool, run.id, fixture.base().id, 2).await;
    ReviewService::new(db.pool.clone())
        .revoke(run.id, fixture.base().id)
        .await
        .unwrap();

    for seed in 0..20 {
        let unit = scheduler(&db, seed).select_next_unit().await.unwrap();
        assert_ne!(unit.mode, SchedulingMode::ChildGeneration);
    }
}

#[tokio::test]
async fn test_top_k_limits_eligible_parents() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let base = fixture.base().id;
    let low = create_candidate_with_score(&db.pool, run.id, base, None, 900).await;
    let mid = create_candidate_with_score(&db.pool, run.id, base, None, 950).await;
    let high = create_candidate_with_score(&db.pool, run.id, base, None, 1000).await;
    // The excluded candidate has the most capacity left
    create_candidate(&db.pool, run.id, fixture.step(2).id, Some(mid.id)).await;
    create_candidate(&db.pool, run.id, fixture.step(2).id, Some(high.id)).await;
    approve_step(&db.pool, run.id, base, 2).await;

    let mut chosen = HashSet::new();
    for seed in 0..40 {
        let unit = scheduler(&db, seed).select_next_unit().await.unwrap();
        assert_eq!(unit.mode, SchedulingMode::ChildGeneration);
        assert_eq!(unit.step_id, Some(fixture.step(2).id));
        chosen.insert(unit.parent_id.unwrap());
    }
    assert!(!chosen.contains(&low.id));
    assert!(chosen.is_subset(&HashSet::from([mid.id, high.id])));
}

#[tokio::test]
async fn test_breadth_first_prefers_least_loaded_parent() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[2, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let base = fixture.base().id;
    let favorite = create_candidate_with_score(&db.pool, run.id, base, None, 1400).await;
    let underdog = create_candidate_with_score(&db.pool, run.id, base, None, 900).await;
    approve_step(&db.pool, run.id, base, 2).await;

    create_pending_job(&db.pool, run.id, fixture.step(2).id, Some(favorite.id)).await;

    for seed in 0..20 {
        let unit = scheduler(&db, seed).select_next_unit().await.unwrap();
        assert_eq!(unit.parent_id, Some(underdog.id), "seed {seed}");
    }
}

#[tokio::test]
async fn test_parent_over_failure_ceiling_is_skipped() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[1, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let parent = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    approve_step(&db.pool, run.id, fixture.base().id, 1).await;

    let review = ReviewService::new(db.pool.clone());
    for _ in 0..3 {
        review.record_parent_failure(parent.id).await.unwrap();
    }
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.parent_id, Some(parent.id), "3 failures is still at the ceiling");

    review.record_parent_failure(parent.id).await.unwrap();
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::NoWork);
}

#[tokio::test]
async fn test_global_branching_factor_caps_step_limit() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[5, 5]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    create_candidate(&db.pool, run.id, fixture.base().id, None).await;

    let config = SchedulerConfig {
        max_branching_factor: 1,
        ..SchedulerConfig::default()
    };
    let scheduler = TreeScheduler::with_seed(db.pool.clone(), config, 3);
    let unit = scheduler.select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::WaitingForApproval);
}

#[tokio::test]
async fn test_fairness_rotates_across_runs() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3]).await;
    let first = create_run(&db.pool, fixture.pipeline.id, "First").await;
    let second = create_run(&db.pool, fixture.pipeline.id, "Second").await;
    let scheduler = scheduler(&db, 1);

    let order: Vec<_> = {
        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(scheduler.select_next_unit().await.unwrap().run_id.unwrap());
        }
        order
    };
    assert_eq!(order, vec![first.id, second.id, first.id, second.id]);

    let mut conn = db.pool.acquire().await.unwrap();
    assert_eq!(
        SchedulerState::last_serviced_run_id(&mut conn).await.unwrap(),
        Some(second.id)
    );
}

#[tokio::test]
async fn test_real_work_in_later_run_beats_waiting() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[1, 2]).await;
    let waiting = create_run(&db.pool, fixture.pipeline.id, "Waiting").await;
    let busy = create_run(&db.pool, fixture.pipeline.id, "Busy").await;
    create_candidate(&db.pool, waiting.id, fixture.base().id, None).await;

    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::BaseGeneration);
    assert_eq!(unit.run_id, Some(busy.id));

    create_candidate(&db.pool, busy.id, fixture.base().id, None).await;
    let unit = scheduler(&db, 1).select_next_unit().await.unwrap();
    assert_eq!(unit.mode, SchedulingMode::WaitingForApproval);

    let mut conn = db.pool.acquire().await.unwrap();
    let active = Candidate::count_active_for_step(&mut conn, busy.id, fixture.base().id)
        .await
        .unwrap();
    assert_eq!(active, 1);
}
