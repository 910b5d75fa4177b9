#[path = "../common/mod.rs"]
mod common;

use common::init_test_env;
use itertools::Itertools;
use kart_rating::{
    database::{
        db_structs::{HistoryEntry, HistoryFilter, Match},
        memory::{MemoryHistory, MemoryMatchLog},
        HistorySink
    },
    error::{MalformedReason, ProcessorError},
    model::{
        rating_model::{PlackettLuceModel, RatingModel},
        structures::run_mode::RunMode
    },
    pipeline::{run, RunRequest, RunSummary},
    utils::{
        cancellation::CancelFlag,
        test_utils::{
            generate_entry, generate_match, generate_match_log, never_cancelled, CancellingModel,
            OrderSensitiveModel
        }
    }
};
use std::collections::HashMap;

const PLAYERS: [&str; 4] = ["A", "B", "C", "D"];

fn request(mode: RunMode) -> RunRequest {
    RunRequest {
        mode,
        ..RunRequest::default()
    }
}

fn scenario_log() -> MemoryMatchLog {
    MemoryMatchLog::new(vec![
        generate_match(1, 1, &PLAYERS, &[1, 2, 3, 4]),
        generate_match(2, 2, &PLAYERS, &[4, 3, 2, 1]),
    ])
}

fn entry<'a>(rows: &'a [HistoryEntry], match_id: i32, player: &str) -> &'a HistoryEntry {
    rows.iter()
        .find(|e| e.match_id == match_id && e.player == player)
        .unwrap_or_else(|| panic!("Expected an entry for {} in match {}", player, match_id))
}

#[tokio::test]
async fn test_two_match_scenario() {
    init_test_env();
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();

    let summary = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            matches_processed: 2,
            rows_written: 8
        }
    );

    let rows = sink.rows().await;
    assert_eq!(rows.len(), 8);

    // M2 must be rated from the M1 posteriors, not from the model default
    let after_m1: Vec<_> = PLAYERS.iter().map(|p| entry(&rows, 1, p).distribution()).collect();
    let expected_m2 = model.update(&after_m1, &[4, 3, 2, 1]);
    let from_default = model.update(&[model.default_distribution(); 4], &[4, 3, 2, 1]);

    assert_eq!(entry(&rows, 2, "A").distribution(), expected_m2[0]);
    assert_ne!(entry(&rows, 2, "A").distribution(), from_default[0]);

    assert!(entry(&rows, 2, "B").sigma <= entry(&rows, 1, "B").sigma);
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let model = PlackettLuceModel::default();
    let log = MemoryMatchLog::new(generate_match_log(7, 150, 12, 4));
    let first = MemoryHistory::new();
    let second = MemoryHistory::new();

    run(&log, &first, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();
    run(&log, &second, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    let first_json = serde_json::to_string(&first.rows().await).unwrap();
    let second_json = serde_json::to_string(&second.rows().await).unwrap();

    assert_eq!(first_json, second_json);
}

#[tokio::test]
async fn test_match_order_changes_outcome() {
    let model = OrderSensitiveModel;
    let forward = MemoryMatchLog::new(vec![
        generate_match(1, 1, &PLAYERS, &[1, 2, 3, 4]),
        generate_match(2, 2, &PLAYERS, &[4, 3, 2, 1]),
    ]);
    let reversed = MemoryMatchLog::new(vec![
        generate_match(1, 2, &PLAYERS, &[1, 2, 3, 4]),
        generate_match(2, 1, &PLAYERS, &[4, 3, 2, 1]),
    ]);
    let forward_sink = MemoryHistory::new();
    let reversed_sink = MemoryHistory::new();

    run(&forward, &forward_sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();
    run(&reversed, &reversed_sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    let forward_rows = forward_sink.rows().await;
    let reversed_rows = reversed_sink.rows().await;

    assert_ne!(
        entry(&forward_rows, 1, "A").distribution(),
        entry(&reversed_rows, 1, "A").distribution()
    );
}

#[tokio::test]
async fn test_each_match_has_one_row_per_participant() {
    let model = PlackettLuceModel::default();
    let matches = generate_match_log(11, 200, 10, 4);
    let log = MemoryMatchLog::new(matches.clone());
    let sink = MemoryHistory::new();

    let summary = run(&log, &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    let rows = sink.rows().await;
    let per_match = rows.iter().counts_by(|e| e.match_id);

    assert_eq!(summary.matches_processed, 200);
    assert_eq!(per_match.len(), 200);
    assert!(per_match.values().all(|count| *count == 4));
}

#[tokio::test]
async fn test_player_history_is_monotone_in_time() {
    let model = PlackettLuceModel::default();
    let log = MemoryMatchLog::new(generate_match_log(3, 250, 8, 4));
    let sink = MemoryHistory::new();

    run(&log, &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    let rows = sink.rows().await;
    let by_player: HashMap<&str, Vec<&HistoryEntry>> = rows.iter().map(|e| (e.player.as_str(), e)).into_group_map();

    for (player, entries) in by_player {
        assert!(
            entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "History for {} is out of order",
            player
        );
        assert!(
            entries.windows(2).all(|w| w[1].sigma <= w[0].sigma),
            "Sigma grew for {}",
            player
        );
    }
}

#[tokio::test]
async fn test_only_configured_player_count_is_rated() {
    let model = PlackettLuceModel::default();
    let log = MemoryMatchLog::new(vec![
        generate_match(1, 1, &PLAYERS, &[1, 2, 3, 4]),
        generate_match(2, 2, &PLAYERS[..3], &[1, 2, 3]),
        generate_match(3, 3, &PLAYERS[..2], &[2, 1]),
    ]);
    let sink = MemoryHistory::new();

    let summary = run(&log, &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(summary.matches_processed, 1);
    assert!(sink.rows().await.iter().all(|e| e.match_id == 1));
}

#[tokio::test]
async fn test_replace_twice_leaves_one_copy() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();

    run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();
    let first = sink.rows().await;

    run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(sink.rows().await, first);
    assert_eq!(first.len(), 8);
}

/// The sink does not deduplicate. Appending the same rows twice stores them twice;
/// scoping an append run to new matches is the caller's job.
#[tokio::test]
async fn test_append_same_rows_twice_duplicates() {
    let model = PlackettLuceModel::default();
    let staging = MemoryHistory::new();
    run(&scenario_log(), &staging, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();
    let new_rows = staging.rows().await;

    let sink = MemoryHistory::new();
    sink.persist(RunMode::Append, &new_rows).await.unwrap();
    sink.persist(RunMode::Append, &new_rows).await.unwrap();

    assert_eq!(sink.len().await, 16);
    assert_eq!(sink.rows().await.iter().filter(|e| e.match_id == 1).count(), 8);
}

#[tokio::test]
async fn test_append_continues_from_persisted_history() {
    let model = PlackettLuceModel::default();
    let matches = generate_match_log(21, 60, 9, 4);
    let (early, _): (Vec<Match>, Vec<Match>) = matches.iter().cloned().partition(|m| m.id <= 30);

    let incremental = MemoryHistory::new();
    run(
        &MemoryMatchLog::new(early),
        &incremental,
        &model,
        request(RunMode::Replace),
        &never_cancelled()
    )
    .await
    .unwrap();

    let summary = run(
        &MemoryMatchLog::new(matches.clone()),
        &incremental,
        &model,
        request(RunMode::Append),
        &never_cancelled()
    )
    .await
    .unwrap();

    let full = MemoryHistory::new();
    run(
        &MemoryMatchLog::new(matches),
        &full,
        &model,
        request(RunMode::Replace),
        &never_cancelled()
    )
    .await
    .unwrap();

    assert_eq!(summary.matches_processed, 30);
    assert_eq!(summary.rows_written, 120);
    assert_eq!(incremental.rows().await, full.rows().await);
}

#[tokio::test]
async fn test_append_without_new_matches_writes_nothing() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();

    run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled())
        .await
        .unwrap();
    let summary = run(&scenario_log(), &sink, &model, request(RunMode::Append), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            matches_processed: 0,
            rows_written: 0
        }
    );
    assert_eq!(sink.len().await, 8);
}

#[tokio::test]
async fn test_failure_on_last_row_retains_nothing() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new().failing_at(7);

    let result = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled()).await;

    assert!(matches!(result, Err(ProcessorError::PersistenceFailure { .. })));
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_failed_replace_keeps_previous_history() {
    let model = PlackettLuceModel::default();
    let previous = generate_match_log(5, 3, 4, 4);
    let seeded = MemoryHistory::new();
    run(
        &MemoryMatchLog::new(previous),
        &seeded,
        &model,
        request(RunMode::Replace),
        &never_cancelled()
    )
    .await
    .unwrap();
    let before = seeded.rows().await;

    let sink = MemoryHistory::with_rows(before.clone()).failing_at(7);
    let result = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &never_cancelled()).await;

    assert!(result.is_err());
    assert_eq!(sink.rows().await, before);
}

#[tokio::test]
async fn test_malformed_match_writes_nothing() {
    let model = PlackettLuceModel::default();
    // Four players but only three distinct finish ranks
    let log = MemoryMatchLog::new(vec![
        generate_match(1, 1, &PLAYERS, &[1, 2, 3, 4]),
        generate_match(2, 2, &PLAYERS, &[1, 2, 3, 3]),
    ]);
    let sink = MemoryHistory::new();

    let result = run(&log, &sink, &model, request(RunMode::Replace), &never_cancelled()).await;

    match result {
        Err(ProcessorError::MalformedMatch { match_id, reason, .. }) => {
            assert_eq!(match_id, 2);
            assert_eq!(reason, MalformedReason::RankNotPermutation(vec![1, 2, 3, 3]));
        }
        other => panic!("Expected malformed match, got {:?}", other)
    }
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_unavailable_source_writes_nothing() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();

    let result = run(
        &MemoryMatchLog::unavailable(),
        &sink,
        &model,
        request(RunMode::Replace),
        &never_cancelled()
    )
    .await;

    assert!(matches!(result, Err(ProcessorError::SourceUnavailable { .. })));
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &cancel).await;

    assert!(matches!(result, Err(ProcessorError::Cancelled { .. })));
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_cancel_mid_replay_keeps_previous_history() {
    let previous = vec![generate_entry(1, "A", 1, 26.0, 7.0)];
    let sink = MemoryHistory::with_rows(previous.clone());
    let cancel = CancelFlag::new();
    let model = CancellingModel::new(cancel.clone(), 1);

    let result = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &cancel).await;

    assert!(matches!(result, Err(ProcessorError::Cancelled { matches_processed: 1 })));
    assert_eq!(sink.rows().await, previous);
}

#[tokio::test]
async fn test_cancel_after_last_match_skips_persist() {
    let previous = vec![generate_entry(1, "A", 1, 26.0, 7.0)];
    let sink = MemoryHistory::with_rows(previous.clone());
    let cancel = CancelFlag::new();
    // Raised while rating the final match, after the engine's last per-match check
    let model = CancellingModel::new(cancel.clone(), 2);

    let result = run(&scenario_log(), &sink, &model, request(RunMode::Replace), &cancel).await;

    assert!(matches!(result, Err(ProcessorError::Cancelled { matches_processed: 2 })));
    assert_eq!(sink.rows().await, previous);
}

#[tokio::test]
async fn test_single_player_count_rejected() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();
    let log = MemoryMatchLog::new(vec![generate_match(1, 1, &PLAYERS[..1], &[1])]);
    let request = RunRequest {
        mode: RunMode::Replace,
        player_count: 1
    };

    let result = run(&log, &sink, &model, request, &never_cancelled()).await;

    assert!(matches!(result, Err(ProcessorError::InvalidPlayerCount { player_count: 1, .. })));
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_history_query_returns_player_series() {
    let model = PlackettLuceModel::default();
    let sink = MemoryHistory::new();
    run(
        &MemoryMatchLog::new(generate_match_log(13, 80, 6, 4)),
        &sink,
        &model,
        request(RunMode::Replace),
        &never_cancelled()
    )
    .await
    .unwrap();

    let filter = HistoryFilter {
        player: Some("player0".to_string()),
        season: None
    };
    let series = sink.query(&filter).await.unwrap();

    assert!(!series.is_empty());
    assert!(series.iter().all(|e| e.player == "player0"));
    assert!(series.windows(2).all(|w| w[0].cursor() < w[1].cursor()));
}
