mod common;

use common::*;
use gentree_core::models::Candidate;
use gentree_core::orchestration::{JobLifecycleManager, LifecycleConfig};
use gentree_core::review::ReviewService;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum TreeOp {
    /// Ingest a completed job whose parent is the n-th active candidate (mod len)
    Ingest(usize),
    /// Reject the n-th active non-root candidate (mod len)
    Reject(usize),
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => any::<usize>().prop_map(TreeOp::Ingest),
        1 => any::<usize>().prop_map(TreeOp::Reject),
    ]
}

async fn run_ops(ops: Vec<TreeOp>) -> Vec<(i64, i64, i64)> {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[2, 4, 4]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Property Run").await;
    let lifecycle = JobLifecycleManager::new(
        db.pool.clone(),
        Arc::new(MockComputeService::new()),
        LifecycleConfig {
            max_retries: 1,
            artifact_root: db.artifact_root(),
        },
    );
    let review = ReviewService::new(db.pool.clone());

    for n in 0..2 {
        let job = create_completed_job(&db.pool, run.id, fixture.base().id, None, &format!("root{n}.png")).await;
        lifecycle.ingest(job.id).await.expect("ingest root");
    }

    for (i, op) in ops.into_iter().enumerate() {
        let mut conn = db.pool.acquire().await.unwrap();
        let active: Vec<Candidate> = Candidate::for_run(&mut conn, run.id)
            .await
            .unwrap()
            .into_iter()
            .filter(Candidate::is_active)
            .collect();
        drop(conn);

        match op {
            TreeOp::Ingest(n) => {
                let expandable: Vec<&Candidate> = active
                    .iter()
                    .filter(|c| c.step_id != fixture.step(3).id)
                    .collect();
                if expandable.is_empty() {
                    continue;
                }
                let parent = expandable[n % expandable.len()];
                let position = fixture.steps.iter().position(|s| s.id == parent.step_id).unwrap();
                let target = &fixture.steps[position + 1];
                let job = create_completed_job(&db.pool, run.id, target.id, Some(parent.id), &format!("c{i}.png")).await;
                lifecycle.ingest(job.id).await.expect("ingest child");
            }
            TreeOp::Reject(n) => {
                let rejectable: Vec<&Candidate> = active.iter().filter(|c| c.parent_id.is_some()).collect();
                if rejectable.is_empty() {
                    continue;
                }
                review.reject(rejectable[n % rejectable.len()].id).await.expect("reject");
            }
        }
    }

    let mut conn = db.pool.acquire().await.unwrap();
    let mut counts = Vec::new();
    for candidate in Candidate::for_run(&mut conn, run.id).await.unwrap() {
        let live = Candidate::count_active_children(&mut conn, candidate.id).await.unwrap();
        counts.push((candidate.id, candidate.child_count, live));
    }
    counts
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// child_count always equals the live number of active children
    #[test]
    fn child_count_matches_active_children(ops in prop::collection::vec(tree_op_strategy(), 1..25)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let counts = runtime.block_on(run_ops(ops));
        for (id, cached, live) in counts {
            prop_assert_eq!(cached, live, "candidate {} drifted", id);
            prop_assert!(cached >= 0);
        }
    }
}
