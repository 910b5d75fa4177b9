use super::{
    db_structs::{HistoryEntry, HistoryFilter, Match, MatchCursor, MatchFilter, Participant, PlayerSnapshot},
    HistorySink, MatchSource
};
use crate::{
    error::ProcessorError,
    model::structures::{run_mode::RunMode, skill_distribution::SkillDistribution},
    utils::progress_utils::progress_bar
};
use chrono::{DateTime, FixedOffset};
use futures::pin_mut;
use itertools::Itertools;
use postgres_types::{ToSql, Type};
use rayon::prelude::*;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio_postgres::{binary_copy::BinaryCopyInWriter, Client, Error, IsolationLevel, NoTls, Row};
use tracing::{error, info, warn};

const SCHEMA: &str = include_str!("schema.sql");

// Matches with exactly $1 participants, strictly after ($2, $3) when a cursor is given
const MATCH_SCOPE: &str = "
    (SELECT COUNT(*) FROM match_participants c WHERE c.match_id = m.id) = $1
    AND ($2::timestamptz IS NULL OR (m.timestamp, m.id) > ($2::timestamptz, $3::int4))";

const HISTORY_COLUMNS: &str = "timestamp, match_id, session_id, season, map, player, character_name, \
    finish_rank, mu, sigma, ordinal";

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Mutex<Client>>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(Mutex::new(client))
        })
    }

    /// Creates the match log and history tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client.lock().await.batch_execute(SCHEMA).await?;

        info!("Schema applied");
        Ok(())
    }

    fn match_from_row(row: &Row) -> Match {
        Match {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            session_id: row.get("session_id"),
            season: row.get("season"),
            map: row.get("map"),
            participants: Vec::new()
        }
    }

    fn participant_from_row(row: &Row) -> (i32, Participant) {
        (
            row.get("match_id"),
            Participant {
                player: row.get("player"),
                character: row.get("character_name"),
                finish_rank: row.get("finish_rank")
            }
        )
    }

    fn entry_from_row(row: &Row) -> HistoryEntry {
        HistoryEntry {
            timestamp: row.get("timestamp"),
            match_id: row.get("match_id"),
            session_id: row.get("session_id"),
            season: row.get("season"),
            map: row.get("map"),
            player: row.get("player"),
            character: row.get("character_name"),
            finish_rank: row.get("finish_rank"),
            mu: row.get("mu"),
            sigma: row.get("sigma"),
            ordinal: row.get("ordinal")
        }
    }
}

impl MatchSource for DbClient {
    /// Match headers and participants are fetched concurrently inside one repeatable-read
    /// transaction, so both queries see the same snapshot of the log.
    async fn get_matches(&self, filter: MatchFilter) -> Result<Vec<Match>, ProcessorError> {
        let unavailable = |context: &str| {
            let context = context.to_owned();
            move |e: Error| ProcessorError::source_unavailable(context, e)
        };

        info!("Fetching matches...");
        let mut client = self.client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(unavailable("opening read transaction"))?;

        let player_count = filter.player_count as i64;
        let after_timestamp: Option<DateTime<FixedOffset>> = filter.after.map(|c| c.timestamp);
        let after_id: Option<i32> = filter.after.map(|c| c.match_id);
        let params: &[&(dyn ToSql + Sync)] = &[&player_count, &after_timestamp, &after_id];

        let headers_sql = format!(
            "SELECT m.id, m.timestamp, m.session_id, m.season, m.map FROM matches m WHERE {}",
            MATCH_SCOPE
        );
        let participants_sql = format!(
            "SELECT mp.match_id, mp.player, mp.character_name, mp.finish_rank \
            FROM match_participants mp JOIN matches m ON m.id = mp.match_id \
            WHERE {} ORDER BY mp.match_id, mp.id",
            MATCH_SCOPE
        );

        let (header_rows, participant_rows) =
            futures::try_join!(tx.query(&headers_sql, params), tx.query(&participants_sql, params))
                .map_err(unavailable("fetching match log"))?;

        tx.commit().await.map_err(unavailable("closing read transaction"))?;
        drop(client);

        info!(
            "Fetched {} matches with {} participants, linking...",
            header_rows.len(),
            participant_rows.len()
        );

        let mut participants: HashMap<i32, Vec<Participant>> = participant_rows
            .iter()
            .map(Self::participant_from_row)
            .into_group_map();

        let mut matches: Vec<Match> = header_rows
            .iter()
            .map(|row| {
                let mut m = Self::match_from_row(row);
                m.participants = participants.remove(&m.id).unwrap_or_default();
                m
            })
            .collect();

        // Canonical replay order
        matches.par_sort_unstable_by_key(|m| m.cursor());

        info!("Match fetching complete");
        Ok(matches)
    }
}

impl HistorySink for DbClient {
    /// Writes all entries with a binary `COPY` inside one transaction. Any failure drops the
    /// transaction, which rolls back the truncate (for replace runs) along with every row.
    async fn persist(&self, mode: RunMode, entries: &[HistoryEntry]) -> Result<usize, ProcessorError> {
        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| ProcessorError::persistence("opening transaction", e))?;

        if mode == RunMode::Replace {
            tx.execute("TRUNCATE TABLE rating_history RESTART IDENTITY", &[])
                .await
                .map_err(|e| ProcessorError::persistence("truncating rating_history", e))?;

            info!("Truncated the rating_history table!");
        }

        let mut written = 0;
        if !entries.is_empty() {
            let copy_sql = format!("COPY rating_history ({}) FROM STDIN BINARY", HISTORY_COLUMNS);
            let sink = tx
                .copy_in(copy_sql.as_str())
                .await
                .map_err(|e| ProcessorError::persistence("starting history copy", e))?;

            let writer = BinaryCopyInWriter::new(
                sink,
                &[
                    Type::TIMESTAMPTZ,
                    Type::INT4,
                    Type::INT4,
                    Type::INT4,
                    Type::TEXT,
                    Type::TEXT,
                    Type::TEXT,
                    Type::INT4,
                    Type::FLOAT8,
                    Type::FLOAT8,
                    Type::FLOAT8
                ]
            );
            pin_mut!(writer);

            let p_bar = progress_bar(entries.len() as u64, "Saving rating history to db".to_string());
            for (i, entry) in entries.iter().enumerate() {
                writer
                    .as_mut()
                    .write(&[
                        &entry.timestamp,
                        &entry.match_id,
                        &entry.session_id,
                        &entry.season,
                        &entry.map,
                        &entry.player,
                        &entry.character,
                        &entry.finish_rank,
                        &entry.mu,
                        &entry.sigma,
                        &entry.ordinal
                    ])
                    .await
                    .map_err(|e| {
                        ProcessorError::persistence(format!("writing row {} for match {}", i, entry.match_id), e)
                    })?;

                if let Some(bar) = &p_bar {
                    bar.inc(1);
                }
            }

            written = writer
                .as_mut()
                .finish()
                .await
                .map_err(|e| ProcessorError::persistence("finishing history copy", e))? as usize;

            if let Some(bar) = &p_bar {
                bar.finish();
            }
        }

        tx.commit().await.map_err(|e| {
            warn!("Commit failed, no history rows were retained");
            ProcessorError::persistence("committing rating history", e)
        })?;

        info!("Rating history saved ({} mode, {} rows)", mode, written);
        Ok(written)
    }

    async fn watermark(&self) -> Result<Option<MatchCursor>, ProcessorError> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                "SELECT timestamp, match_id FROM rating_history ORDER BY timestamp DESC, match_id DESC LIMIT 1",
                &[]
            )
            .await
            .map_err(|e| ProcessorError::persistence("reading history watermark", e))?;

        Ok(row.map(|r| MatchCursor {
            timestamp: r.get("timestamp"),
            match_id: r.get("match_id")
        }))
    }

    async fn latest_snapshots(&self) -> Result<Vec<PlayerSnapshot>, ProcessorError> {
        info!("Fetching latest player snapshots...");
        let rows = self
            .client
            .lock()
            .await
            .query(
                "SELECT DISTINCT ON (player) player, mu, sigma, ordinal FROM rating_history \
                ORDER BY player, timestamp DESC, match_id DESC",
                &[]
            )
            .await
            .map_err(|e| ProcessorError::persistence("reading latest snapshots", e))?;

        Ok(rows
            .iter()
            .map(|row| PlayerSnapshot {
                player: row.get("player"),
                distribution: SkillDistribution {
                    mu: row.get("mu"),
                    sigma: row.get("sigma"),
                    ordinal: row.get("ordinal")
                }
            })
            .collect())
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, ProcessorError> {
        let query = format!(
            "SELECT {} FROM rating_history \
            WHERE ($1::text IS NULL OR player = $1) AND ($2::int4 IS NULL OR season = $2) \
            ORDER BY timestamp, match_id, id",
            HISTORY_COLUMNS
        );

        let rows = self
            .client
            .lock()
            .await
            .query(query.as_str(), &[&filter.player, &filter.season])
            .await
            .map_err(|e| ProcessorError::persistence("querying rating history", e))?;

        Ok(rows.iter().map(Self::entry_from_row).collect())
    }
}
