//! End-to-end batch analysis against the stub evaluator.

mod common;

use std::sync::{Arc, Mutex};

use analysis_worker::stub::StubFactory;
use analysis_worker::{AnalysisError, BatchState, Depth, GameRequest, PositionStatus, RawScore, Score};
use chess_core::{Reconstructor, Side, STANDARD_START_FEN};
use common::{depth, moves, orchestrator, OPEN_GAME, OPEN_GAME_PGN};

#[tokio::test]
async fn test_open_game_end_to_end() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 4);

    let run = orch
        .analyze_game(GameRequest::new(moves(&OPEN_GAME), depth(8)))
        .await
        .unwrap();

    assert_eq!(run.total_positions, 5);
    assert_eq!(run.distinct_positions, 5);
    assert_eq!(run.analysis.positions.len(), 5);
    assert_eq!(run.analysis.moves.len(), 4);
    assert_eq!(run.analysis.unanalyzed(), 0);
    assert!(run.workers_used >= 1 && run.workers_used <= 4);
    assert_eq!(factory.calls(), 5);

    for record in run.analysis.positions.values() {
        assert_eq!(record.status, PositionStatus::Analyzed);
        assert_eq!(record.depth, Some(8));
        assert!(record.evaluation.is_some());
    }

    let sans: Vec<&str> = run.analysis.moves.iter().map(|m| m.san.as_str()).collect();
    assert_eq!(sans, OPEN_GAME);
    assert_eq!(run.analysis.moves[0].uci, "e2e4");
    assert_eq!(run.analysis.moves[1].side, Side::Black);

    assert_eq!(run.assignments.len(), 5);
    assert!(run.assignments.values().all(|w| *w < run.workers_used));
    assert_eq!(run.positions_per_worker().values().sum::<usize>(), 5);
}

#[tokio::test]
async fn test_move_played_evaluation_is_next_position() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 2);
    let positions = Reconstructor::standard().expand(&OPEN_GAME).unwrap();

    let run = orch
        .analyze_game(GameRequest::new(moves(&OPEN_GAME), depth(8)))
        .await
        .unwrap();

    let start = run.analysis.position(STANDARD_START_FEN).unwrap();
    assert_eq!(start.plies, vec![0]);
    assert_eq!(start.move_played.as_deref(), Some("e4"));
    assert_eq!(start.move_played_uci.as_deref(), Some("e2e4"));

    // Stub scores are side-to-move; after 1.e4 Black moves
    let after_e4 = &positions[1];
    let expected = Score::from_side_to_move(StubFactory::default_score(&after_e4.fen), Side::Black);
    assert_eq!(start.move_played_evaluation, Some(expected));
    assert_eq!(run.analysis.moves[0].move_played_evaluation, Some(expected));
    assert_eq!(run.analysis.moves[0].best_move_evaluation, start.evaluation);

    // The final position has no move played from it
    let last = run.analysis.position(&positions[4].fen).unwrap();
    assert_eq!(last.move_played, None);
    assert_eq!(last.cp_loss, None);
}

#[tokio::test]
async fn test_repeated_position_is_evaluated_once() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 3);
    let shuffle = ["Nf3", "Nf6", "Ng1", "Ng8", "Nc3"];

    let run = orch
        .analyze_game(GameRequest::new(moves(&shuffle), depth(6)))
        .await
        .unwrap();

    assert_eq!(run.total_positions, 6);
    assert_eq!(run.distinct_positions, 5);
    assert_eq!(run.analysis.positions.len(), 5);
    assert_eq!(factory.calls(), 5);

    let start = run.analysis.position(STANDARD_START_FEN).unwrap();
    assert_eq!(start.plies, vec![0, 4]);
    // First occurrence wins
    assert_eq!(start.move_played.as_deref(), Some("Nf3"));
    assert_eq!(run.analysis.moves.len(), 5);
    assert_eq!(run.analysis.moves[4].san, "Nc3");
}

#[tokio::test]
async fn test_moves_into_same_position_share_evaluation() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 2);
    let shuffle = ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3"];

    let run = orch
        .analyze_game(GameRequest::new(moves(&shuffle), depth(6)))
        .await
        .unwrap();

    assert_eq!(run.total_positions, 6);
    assert_eq!(run.distinct_positions, 4);
    assert_eq!(factory.calls(), 4);

    let (first, repeat) = (&run.analysis.moves[0], &run.analysis.moves[4]);
    assert_eq!(first.fen_after, repeat.fen_after);
    assert!(first.move_played_evaluation.is_some());
    assert_eq!(first.move_played_evaluation, repeat.move_played_evaluation);
    assert_eq!(first.best_move_evaluation, repeat.best_move_evaluation);

    let after_nf3 = &run.analysis.positions[&first.fen_after];
    assert_eq!(after_nf3.plies, vec![1, 5]);
}

#[tokio::test]
async fn test_out_of_range_engine_score_is_a_job_failure() {
    let positions = Reconstructor::standard().expand(&OPEN_GAME).unwrap();
    let factory = StubFactory::new().with_score(&positions[1].fen, RawScore::Mate(i32::MIN));
    let orch = orchestrator(&factory, 1);

    let run = orch
        .analyze_game(GameRequest::new(moves(&OPEN_GAME), depth(8)))
        .await
        .unwrap();

    assert_eq!(run.analysis.unanalyzed(), 1);
    let bad = run.analysis.position(&positions[1].fen).unwrap();
    assert!(bad.error.as_deref().unwrap().contains("out of range"));
    // The single worker keeps going after the bad reply
    assert_eq!(factory.calls(), 5);
}

#[tokio::test]
async fn test_analysis_is_repeatable() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 4);

    let first = orch.analyze_pgn(OPEN_GAME_PGN, depth(10), None).await.unwrap();
    let second = orch.analyze_pgn(OPEN_GAME_PGN, depth(10), Some(1)).await.unwrap();

    assert_eq!(first.analysis, second.analysis);
    assert_eq!(second.workers_used, 1);
    assert_eq!(factory.calls(), 10);
}

#[tokio::test]
async fn test_failed_position_is_reported_not_fatal() {
    let positions = Reconstructor::standard().expand(&OPEN_GAME).unwrap();
    let factory = StubFactory::new().failing(&positions[2].fen);
    let orch = orchestrator(&factory, 2);

    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);
    let run = orch
        .analyze_game_observed(GameRequest::new(moves(&OPEN_GAME), depth(8)), move |state| {
            seen.lock().unwrap().push(state)
        })
        .await
        .unwrap();

    assert_eq!(run.analysis.unanalyzed(), 1);
    let failed = run.analysis.position(&positions[2].fen).unwrap();
    assert_eq!(failed.status, PositionStatus::Unanalyzed);
    assert!(failed.error.as_deref().unwrap().contains("stub failure"));
    assert_eq!(failed.evaluation, None);

    let analyzed = run
        .analysis
        .positions
        .values()
        .filter(|r| r.is_analyzed())
        .count();
    assert_eq!(analyzed, 4);

    // Moves touching the failed position carry no loss
    assert_eq!(run.analysis.moves[1].cp_loss, None);
    assert_eq!(run.analysis.moves[2].cp_loss, None);
    assert!(run.analysis.moves[0].cp_loss.is_some());

    let states = states.lock().unwrap().clone();
    assert_eq!(states.last(), Some(&BatchState::Done));
    assert!(!states.contains(&BatchState::Failed));
}

#[tokio::test]
async fn test_abort_on_failure_fails_the_batch() {
    let positions = Reconstructor::standard().expand(&OPEN_GAME).unwrap();
    let factory = StubFactory::new().failing(&positions[3].fen);
    let orch = orchestrator(&factory, 1);

    let request = GameRequest::new(moves(&OPEN_GAME), depth(8)).with_abort_on_failure(true);
    let err = orch.analyze_game(request).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Evaluator { .. }));
}

#[tokio::test]
async fn test_illegal_move_rejected_before_dispatch() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 4);

    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);
    let err = orch
        .analyze_game_observed(
            GameRequest::new(moves(&["e4", "e5", "Nf9"]), depth(8)),
            move |state| seen.lock().unwrap().push(state),
        )
        .await
        .unwrap_err();

    match err {
        AnalysisError::IllegalMove { ply, san } => {
            assert_eq!(ply, 2);
            assert_eq!(san, "Nf9");
        }
        other => panic!("expected illegal move, got {other:?}"),
    }
    assert_eq!(factory.opens(), 0);
    assert_eq!(factory.calls(), 0);
    assert_eq!(states.lock().unwrap().last(), Some(&BatchState::Failed));
}

#[tokio::test]
async fn test_depth_bounds() {
    assert!(matches!(Depth::new(0), Err(AnalysisError::Validation(_))));
    assert!(matches!(Depth::new(26), Err(AnalysisError::Validation(_))));
    assert_eq!(Depth::new(1).unwrap().get(), 1);
    assert_eq!(Depth::new(25).unwrap().get(), 25);

    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 2);
    let run = orch
        .analyze_game(GameRequest::new(moves(&["d4"]), depth(25)))
        .await
        .unwrap();
    assert_eq!(run.report().depth, 25);
}

#[tokio::test]
async fn test_custom_start_position() {
    // White to move, mate in one with Qd8#
    let fen = "6k1/5ppp/8/8/8/8/5PPP/3Q2K1 w - - 0 1";
    let factory = StubFactory::new().with_score(fen, RawScore::Mate(1));
    let orch = orchestrator(&factory, 2);

    let run = orch
        .analyze_game(GameRequest::new(moves(&["Qd8#"]), depth(4)).with_start_fen(Some(fen.to_string())))
        .await
        .unwrap();

    assert_eq!(run.total_positions, 2);
    let start = run.analysis.position(fen).unwrap();
    assert_eq!(
        start.evaluation,
        Some(Score::Mate {
            winner: Side::White,
            moves: 1
        })
    );
    assert_eq!(start.mate_distance, Some(1));
    assert_eq!(run.analysis.moves[0].san, "Qd8#");
}

#[tokio::test]
async fn test_unopenable_evaluator_exhausts_scheduler() {
    let factory = StubFactory::new().unopenable();
    let orch = orchestrator(&factory, 3);

    let err = orch
        .analyze_game(GameRequest::new(moves(&OPEN_GAME), depth(8)))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::SchedulerExhaustion(_)));
    assert_eq!(factory.opens(), 3);
}

#[tokio::test]
async fn test_report_shape() {
    let factory = StubFactory::new();
    let orch = orchestrator(&factory, 2);
    let run = orch.analyze_pgn(OPEN_GAME_PGN, depth(10), None).await.unwrap();
    let report = serde_json::to_value(run.report()).unwrap();

    assert_eq!(report["success"], true);
    assert_eq!(report["total_positions"], 5);
    assert_eq!(report["depth"], 10);
    assert_eq!(report["unanalyzed"], 0);
    assert_eq!(report["results"].as_object().unwrap().len(), 5);
    assert_eq!(report["moves"].as_array().unwrap().len(), 4);
    assert_eq!(report["summary"]["white"]["moves"], 2);
    assert_eq!(report["summary"]["black"]["moves"], 2);
    assert!(report["analysis_time"].is_number());
    assert!(report["positions_per_second"].is_number());
}
