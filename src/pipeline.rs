use crate::{
    database::{db_structs::MatchFilter, HistorySink, MatchSource},
    error::ProcessorError,
    model::{
        constants::DEFAULT_PLAYER_COUNT, rating_model::RatingModel, rating_store::RatingStore, replay::ReplayEngine,
        structures::run_mode::RunMode
    },
    utils::cancellation::CancelFlag
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub player_count: usize
}

impl Default for RunRequest {
    fn default() -> Self {
        RunRequest {
            mode: RunMode::Replace,
            player_count: DEFAULT_PLAYER_COUNT
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub matches_processed: usize,
    pub rows_written: usize
}

/// Runs the full rating pipeline: read the match log, replay it, persist the history.
///
/// Replace runs start from an empty store and read the whole log. Append runs read only
/// matches after the newest persisted row and seed the store with each player's latest
/// persisted distribution, so the replay continues exactly where the history left off.
pub async fn run<S, H, M>(
    source: &S,
    sink: &H,
    model: &M,
    request: RunRequest,
    cancel: &CancelFlag
) -> Result<RunSummary, ProcessorError>
where
    S: MatchSource,
    H: HistorySink,
    M: RatingModel
{
    info!("Starting {} run for {}-player matches", request.mode, request.player_count);

    let (store, after) = match request.mode {
        RunMode::Replace => (RatingStore::new(), None),
        RunMode::Append => {
            let snapshots = sink.latest_snapshots().await?;
            let watermark = sink.watermark().await?;
            info!(
                "Seeded {} players from history, resuming after {:?}",
                snapshots.len(),
                watermark
            );
            (RatingStore::seeded(&snapshots), watermark)
        }
    };

    let filter = MatchFilter {
        player_count: request.player_count,
        after
    };

    let mut engine = ReplayEngine::new(model, store, request.player_count);
    let outcome = engine.run(source, filter, cancel).await?;

    // Last chance to stop before the transaction opens
    if cancel.is_cancelled() {
        return Err(ProcessorError::Cancelled {
            matches_processed: outcome.matches_processed
        });
    }

    let rows_written = sink.persist(request.mode, &outcome.entries).await?;
    info!(
        "Run complete: {} matches processed, {} rows written",
        outcome.matches_processed, rows_written
    );

    Ok(RunSummary {
        matches_processed: outcome.matches_processed,
        rows_written
    })
}
