use crate::{
    database::{
        db_structs::{HistoryEntry, HistoryFilter, Match, MatchCursor, MatchFilter, PlayerSnapshot},
        HistorySink, MatchSource
    },
    error::ProcessorError,
    model::structures::run_mode::RunMode
};
use indexmap::IndexMap;
use itertools::Itertools;
use std::io;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A match log held in memory. Matches may be supplied in any order.
#[derive(Debug, Clone, Default)]
pub struct MemoryMatchLog {
    matches: Vec<Match>,
    unavailable: bool
}

impl MemoryMatchLog {
    pub fn new(matches: Vec<Match>) -> MemoryMatchLog {
        MemoryMatchLog {
            matches,
            unavailable: false
        }
    }

    /// A log whose every read fails with `SourceUnavailable`.
    pub fn unavailable() -> MemoryMatchLog {
        MemoryMatchLog {
            matches: Vec::new(),
            unavailable: true
        }
    }
}

impl MatchSource for MemoryMatchLog {
    async fn get_matches(&self, filter: MatchFilter) -> Result<Vec<Match>, ProcessorError> {
        if self.unavailable {
            return Err(ProcessorError::source_unavailable(
                "in-memory match log",
                io::Error::other("match log marked unavailable")
            ));
        }

        Ok(self
            .matches
            .iter()
            .filter(|m| filter.accepts(m))
            .sorted_by_key(|m| m.cursor())
            .cloned()
            .collect())
    }
}

/// History storage held in memory with the same all-or-nothing semantics as the
/// database sink. A failure can be injected at a given row index of a batch.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    rows: Mutex<Vec<HistoryEntry>>,
    fail_at_row: Option<usize>
}

impl MemoryHistory {
    pub fn new() -> MemoryHistory {
        MemoryHistory::default()
    }

    pub fn with_rows(rows: Vec<HistoryEntry>) -> MemoryHistory {
        MemoryHistory {
            rows: Mutex::new(rows),
            fail_at_row: None
        }
    }

    /// Every batch fails when it reaches row `index` (zero-based).
    pub fn failing_at(mut self, index: usize) -> MemoryHistory {
        self.fail_at_row = Some(index);
        self
    }

    pub async fn rows(&self) -> Vec<HistoryEntry> {
        self.rows.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

impl HistorySink for MemoryHistory {
    async fn persist(&self, mode: RunMode, entries: &[HistoryEntry]) -> Result<usize, ProcessorError> {
        let mut rows = self.rows.lock().await;

        let mut staged = match mode {
            RunMode::Replace => Vec::with_capacity(entries.len()),
            RunMode::Append => rows.clone()
        };

        for (i, entry) in entries.iter().enumerate() {
            if self.fail_at_row == Some(i) {
                warn!("Injected failure at row {}, rolling back batch of {}", i, entries.len());
                return Err(ProcessorError::persistence(
                    format!("write of row {} for match {}", i, entry.match_id),
                    io::Error::other("injected failure")
                ));
            }

            staged.push(entry.clone());
        }

        *rows = staged;
        debug!("Committed {} rows ({} mode)", entries.len(), mode);

        Ok(entries.len())
    }

    async fn watermark(&self) -> Result<Option<MatchCursor>, ProcessorError> {
        Ok(self.rows.lock().await.iter().map(|e| e.cursor()).max())
    }

    async fn latest_snapshots(&self) -> Result<Vec<PlayerSnapshot>, ProcessorError> {
        let rows = self.rows.lock().await;
        let mut latest: IndexMap<&str, &HistoryEntry> = IndexMap::new();

        for entry in rows.iter().sorted_by_key(|e| e.cursor()) {
            latest.insert(entry.player.as_str(), entry);
        }

        Ok(latest
            .into_iter()
            .map(|(player, entry)| PlayerSnapshot {
                player: player.to_owned(),
                distribution: entry.distribution()
            })
            .collect())
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, ProcessorError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|e| filter.accepts(e))
            .sorted_by_key(|e| e.cursor())
            .cloned()
            .collect())
    }
}
