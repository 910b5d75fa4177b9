use crate::{
    database::db_structs::{HistoryEntry, HistoryFilter, Match, MatchCursor, MatchFilter, PlayerSnapshot},
    error::ProcessorError,
    model::structures::run_mode::RunMode
};
use std::future::Future;

pub mod db;
pub mod db_structs;
pub mod memory;

/// The source-of-truth log of finished matches.
pub trait MatchSource {
    /// Every match accepted by `filter`, ascending by `(timestamp, id)`.
    /// Either the complete sequence or `SourceUnavailable`, never a truncated result.
    fn get_matches(&self, filter: MatchFilter) -> impl Future<Output = Result<Vec<Match>, ProcessorError>> + Send;
}

/// Durable storage for rating history.
pub trait HistorySink {
    /// Writes `entries` in a single transaction and returns the number of rows written.
    /// In [`RunMode::Replace`] all existing rows are discarded in the same transaction.
    fn persist(
        &self,
        mode: RunMode,
        entries: &[HistoryEntry]
    ) -> impl Future<Output = Result<usize, ProcessorError>> + Send;

    /// Position of the newest persisted row.
    fn watermark(&self) -> impl Future<Output = Result<Option<MatchCursor>, ProcessorError>> + Send;

    /// Each player's most recent persisted distribution.
    fn latest_snapshots(&self) -> impl Future<Output = Result<Vec<PlayerSnapshot>, ProcessorError>> + Send;

    /// Persisted rows accepted by `filter`, ordered by `(timestamp, match_id)`.
    fn query(&self, filter: &HistoryFilter) -> impl Future<Output = Result<Vec<HistoryEntry>, ProcessorError>> + Send;
}
