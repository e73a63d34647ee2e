mod common;

use common::*;
use gentree_core::models::Vote;
use gentree_core::review::ReviewService;
use gentree_core::tournament::TournamentEngine;
use std::collections::HashSet;

#[tokio::test]
async fn test_even_match_moves_sixteen_points() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let a = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let b = create_candidate(&db.pool, run.id, fixture.base().id, None).await;

    let outcome = TournamentEngine::new(db.pool.clone())
        .record_vote(a.id, b.id)
        .await
        .unwrap();
    assert_eq!(outcome.winner_score, 1016);
    assert_eq!(outcome.loser_score, 984);

    let winner = reload_candidate(&db.pool, a.id).await;
    let loser = reload_candidate(&db.pool, b.id).await;
    assert_eq!((winner.elo_score, winner.vote_count), (1016, 1));
    assert_eq!((loser.elo_score, loser.vote_count), (984, 1));

    let mut conn = db.pool.acquire().await.unwrap();
    assert!(Vote::exists_between(&mut conn, b.id, a.id).await.unwrap());
}

#[tokio::test]
async fn test_underdog_gains_more_than_favorite() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[4]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let base = fixture.base().id;
    let underdog = create_candidate_with_score(&db.pool, run.id, base, None, 800).await;
    let favorite = create_candidate_with_score(&db.pool, run.id, base, None, 1200).await;
    let engine = TournamentEngine::new(db.pool.clone());

    let upset = engine.record_vote(underdog.id, favorite.id).await.unwrap();
    assert!(upset.winner_delta > 16);

    let strong = create_candidate_with_score(&db.pool, run.id, base, None, 1200).await;
    let weak = create_candidate_with_score(&db.pool, run.id, base, None, 800).await;
    let expected = engine.record_vote(strong.id, weak.id).await.unwrap();
    assert!(expected.winner_delta < 16);
}

#[tokio::test]
async fn test_invalid_votes_change_nothing() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let a = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let b = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let other_step = create_candidate(&db.pool, run.id, fixture.step(2).id, Some(a.id)).await;
    let engine = TournamentEngine::new(db.pool.clone());

    assert!(engine.record_vote(a.id, a.id).await.unwrap_err().is_validation());
    assert!(engine.record_vote(a.id, other_step.id).await.unwrap_err().is_validation());

    engine.record_vote(a.id, b.id).await.unwrap();
    let duplicate = engine.record_vote(a.id, b.id).await.unwrap_err();
    assert!(duplicate.is_consistency(), "got {duplicate}");

    // The failed duplicate rolled back its score and count changes
    let a = reload_candidate(&db.pool, a.id).await;
    assert_eq!((a.elo_score, a.vote_count), (1016, 1));

    ReviewService::new(db.pool.clone()).reject(b.id).await.unwrap();
    let c = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    assert!(engine.record_vote(c.id, b.id).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_reverse_vote_is_recorded_as_rematch() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let a = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let b = create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    let engine = TournamentEngine::new(db.pool.clone());

    engine.record_vote(a.id, b.id).await.unwrap();
    // Uniqueness is on the ordered (winner, loser) pair
    let rematch = engine.record_vote(b.id, a.id).await.unwrap();
    assert_eq!(rematch.winner_id, b.id);

    let a = reload_candidate(&db.pool, a.id).await;
    let b = reload_candidate(&db.pool, b.id).await;
    assert_eq!(a.vote_count, 2);
    assert_eq!(b.vote_count, 2);
    assert!(engine.next_unvoted_pair(run.id, fixture.base().id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pairs_are_never_repeated() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[5]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    for _ in 0..5 {
        create_candidate(&db.pool, run.id, fixture.base().id, None).await;
    }
    let engine = TournamentEngine::with_seed(db.pool.clone(), 11);

    let mut seen = HashSet::new();
    while let Some(pair) = engine.next_unvoted_pair(run.id, fixture.base().id).await.unwrap() {
        assert!(pair.a.vote_count <= pair.b.vote_count);
        let key = (pair.a.id.min(pair.b.id), pair.a.id.max(pair.b.id));
        assert!(seen.insert(key), "pair {key:?} offered twice");
        engine.record_vote(pair.b.id, pair.a.id).await.unwrap();
    }
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn test_least_compared_candidates_surface_first() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[4]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let base = fixture.base().id;
    let a = create_candidate(&db.pool, run.id, base, None).await;
    let b = create_candidate(&db.pool, run.id, base, None).await;
    let engine = TournamentEngine::with_seed(db.pool.clone(), 5);
    engine.record_vote(a.id, b.id).await.unwrap();

    let c = create_candidate(&db.pool, run.id, base, None).await;
    let d = create_candidate(&db.pool, run.id, base, None).await;
    let pair = engine.next_unvoted_pair(run.id, base).await.unwrap().unwrap();
    let ids = HashSet::from([pair.a.id, pair.b.id]);
    assert_eq!(ids, HashSet::from([c.id, d.id]));
}

#[tokio::test]
async fn test_triage_right_prefers_most_advanced_step() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3, 3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    let base = fixture.base().id;
    let refine = fixture.step(2).id;
    let parent = create_candidate(&db.pool, run.id, base, None).await;
    create_candidate(&db.pool, run.id, base, None).await;
    create_candidate(&db.pool, run.id, base, None).await;
    let r1 = create_candidate(&db.pool, run.id, refine, Some(parent.id)).await;
    let r2 = create_candidate(&db.pool, run.id, refine, Some(parent.id)).await;
    let engine = TournamentEngine::with_seed(db.pool.clone(), 2);

    let pair = engine.next_pair_for_run(run.id).await.unwrap().unwrap();
    assert_eq!(pair.a.step_id, refine);
    assert_eq!(HashSet::from([pair.a.id, pair.b.id]), HashSet::from([r1.id, r2.id]));

    engine.record_vote(r1.id, r2.id).await.unwrap();
    let pair = engine.next_pair_for_run(run.id).await.unwrap().unwrap();
    assert_eq!(pair.a.step_id, base);
    assert_eq!(pair.b.step_id, base);
}

#[tokio::test]
async fn test_single_candidate_has_no_pair() {
    let db = TestDb::new().await;
    let fixture = create_pipeline(&db.pool, "portrait", &[3]).await;
    let run = create_run(&db.pool, fixture.pipeline.id, "Winter Fox").await;
    create_candidate(&db.pool, run.id, fixture.base().id, None).await;

    let engine = TournamentEngine::new(db.pool.clone());
    assert!(engine.next_pair_for_run(run.id).await.unwrap().is_none());
}
