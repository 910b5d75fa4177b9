use crate::{
    database::{
        db_structs::{HistoryEntry, Match, MatchFilter},
        MatchSource
    },
    error::{MalformedReason, ProcessorError},
    model::{
        constants::MIN_PLAYER_COUNT,
        rating_model::RatingModel,
        rating_store::RatingStore,
        structures::{engine_state::EngineState, skill_distribution::SkillDistribution}
    },
    utils::{cancellation::CancelFlag, progress_utils::progress_bar}
};
use itertools::Itertools;
use tracing::{debug, error, info};

/// The result of a completed replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub entries: Vec<HistoryEntry>,
    pub matches_processed: usize
}

/// Replays a chronological match log through a [`RatingModel`], one match at a time.
///
/// The engine owns its [`RatingStore`] for the lifetime of one run. Matches are applied
/// strictly in the order given; each match's update depends on the state left by every
/// earlier match, so nothing here is parallel.
pub struct ReplayEngine<'m, M: RatingModel> {
    model: &'m M,
    store: RatingStore,
    player_count: usize,
    state: EngineState
}

impl<'m, M: RatingModel> ReplayEngine<'m, M> {
    pub fn new(model: &'m M, store: RatingStore, player_count: usize) -> ReplayEngine<'m, M> {
        ReplayEngine {
            model,
            store,
            player_count,
            state: EngineState::Idle
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn store(&self) -> &RatingStore {
        &self.store
    }

    /// Reads the complete match log from `source` and replays it.
    pub async fn run<S: MatchSource>(
        &mut self,
        source: &S,
        filter: MatchFilter,
        cancel: &CancelFlag
    ) -> Result<ReplayOutcome, ProcessorError> {
        self.start()?;

        let matches = match source.get_matches(filter).await {
            Ok(matches) => matches,
            Err(e) => return Err(self.fail(e))
        };

        self.replay_running(&matches, cancel)
    }

    /// Replays an already ordered sequence of matches.
    pub fn replay(&mut self, matches: &[Match], cancel: &CancelFlag) -> Result<ReplayOutcome, ProcessorError> {
        self.start()?;
        self.replay_running(matches, cancel)
    }

    fn start(&mut self) -> Result<(), ProcessorError> {
        if self.state != EngineState::Idle {
            return Err(ProcessorError::EngineNotIdle(self.state));
        }

        if self.player_count < MIN_PLAYER_COUNT {
            return Err(ProcessorError::InvalidPlayerCount {
                player_count: self.player_count,
                minimum: MIN_PLAYER_COUNT
            });
        }

        self.state = EngineState::Running;
        Ok(())
    }

    fn fail(&mut self, e: ProcessorError) -> ProcessorError {
        error!("Replay failed: {}", e);
        self.state = EngineState::Failed;
        e
    }

    fn replay_running(&mut self, matches: &[Match], cancel: &CancelFlag) -> Result<ReplayOutcome, ProcessorError> {
        info!("Replaying {} matches", matches.len());

        let bar = progress_bar(matches.len() as u64, "Replaying match history".to_string());
        let mut entries = Vec::with_capacity(matches.len() * self.player_count);

        for (processed, m) in matches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.fail(ProcessorError::Cancelled {
                    matches_processed: processed
                }));
            }

            if let Err(e) = self.process_match(m, &mut entries) {
                return Err(self.fail(e));
            }

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = &bar {
            bar.finish();
        }

        self.state = EngineState::Completed;
        info!(
            "Replay complete: {} matches, {} history entries, {} players",
            matches.len(),
            entries.len(),
            self.store.len()
        );

        Ok(ReplayOutcome {
            entries,
            matches_processed: matches.len()
        })
    }

    /// Rates a single match:
    /// 1. Resolve each participant's current distribution
    /// 2. Run the model on the distributions and finish ranks
    /// 3. Store the updated distributions
    /// 4. Emit one history entry per participant
    fn process_match(&mut self, match_: &Match, entries: &mut Vec<HistoryEntry>) -> Result<(), ProcessorError> {
        let ranks = validate_match(match_, self.player_count)?;

        let model = self.model;
        let current: Vec<SkillDistribution> = match_
            .participants
            .iter()
            .map(|p| self.store.get_or_init(&p.player, || model.default_distribution()))
            .collect();

        let updated = self.model.update(&current, &ranks);
        if updated.len() != current.len() {
            return Err(ProcessorError::ModelContract {
                match_id: match_.id,
                expected: current.len(),
                actual: updated.len()
            });
        }

        for (participant, distribution) in match_.participants.iter().zip(updated) {
            self.store.set(&participant.player, distribution);
            entries.push(HistoryEntry::new(match_, participant, distribution));
        }

        debug!("Rated match {} ({})", match_.id, match_.timestamp);
        Ok(())
    }
}

/// Checks a match's shape and returns its finish ranks in participant order.
///
/// A valid match has exactly `player_count` participants, no repeated player, and
/// finish ranks forming a permutation of `1..=player_count`.
pub fn validate_match(match_: &Match, player_count: usize) -> Result<Vec<usize>, ProcessorError> {
    let malformed = |reason| ProcessorError::MalformedMatch {
        match_id: match_.id,
        timestamp: match_.timestamp,
        reason
    };

    if match_.participants.len() != player_count {
        return Err(malformed(MalformedReason::WrongParticipantCount {
            expected: player_count,
            actual: match_.participants.len()
        }));
    }

    if let Some(player) = match_.participants.iter().map(|p| &p.player).duplicates().next() {
        return Err(malformed(MalformedReason::DuplicatePlayer(player.clone())));
    }

    let ranks: Vec<i32> = match_.participants.iter().map(|p| p.finish_rank).collect();
    let is_permutation = ranks.iter().sorted().copied().eq(1..=player_count as i32);
    if !is_permutation {
        return Err(malformed(MalformedReason::RankNotPermutation(ranks)));
    }

    Ok(ranks.into_iter().map(|r| r as usize).collect())
}
