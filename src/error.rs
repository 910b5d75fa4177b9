use crate::model::structures::engine_state::EngineState;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Match log unavailable: {context}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: BoxError
    },

    #[error("Malformed match {match_id} at {timestamp}: {reason}")]
    MalformedMatch {
        match_id: i32,
        timestamp: DateTime<FixedOffset>,
        reason: MalformedReason
    },

    #[error("Failed to persist rating history: {context}")]
    PersistenceFailure {
        context: String,
        #[source]
        source: BoxError
    },

    #[error("Rating model returned {actual} results for match {match_id}, expected {expected}")]
    ModelContract {
        match_id: i32,
        expected: usize,
        actual: usize
    },

    #[error("Run cancelled after {matches_processed} matches")]
    Cancelled { matches_processed: usize },

    #[error("Replay engine cannot start from state {0}")]
    EngineNotIdle(EngineState),

    #[error("Matches need at least {minimum} participants to be rated, got {player_count}")]
    InvalidPlayerCount { player_count: usize, minimum: usize }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("expected {expected} participants, found {actual}")]
    WrongParticipantCount { expected: usize, actual: usize },

    #[error("player '{0}' appears more than once")]
    DuplicatePlayer(String),

    #[error("finish ranks {0:?} are not a permutation of 1..=N")]
    RankNotPermutation(Vec<i32>)
}

/// Renders an error followed by every `source()` below it, joined with `": "`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }

    rendered
}

impl ProcessorError {
    pub fn source_unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ProcessorError::SourceUnavailable {
            context: context.into(),
            source: source.into()
        }
    }

    pub fn persistence(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ProcessorError::PersistenceFailure {
            context: context.into(),
            source: source.into()
        }
    }
}
