use crate::model::{constants::DEFAULT_PLAYER_COUNT, structures::skill_distribution::SkillDistribution};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub player: String,
    pub character: String,
    /// 1 is first place
    pub finish_rank: i32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i32,
    pub timestamp: DateTime<FixedOffset>,
    pub session_id: i32,
    pub season: i32,
    pub map: String,
    pub participants: Vec<Participant>
}

impl Match {
    pub fn cursor(&self) -> MatchCursor {
        MatchCursor {
            timestamp: self.timestamp,
            match_id: self.id
        }
    }
}

/// One rating snapshot for a player, taken immediately after a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub match_id: i32,
    pub session_id: i32,
    pub season: i32,
    pub map: String,
    pub player: String,
    pub character: String,
    pub finish_rank: i32,
    pub mu: f64,
    pub sigma: f64,
    pub ordinal: f64
}

impl HistoryEntry {
    pub fn new(match_: &Match, participant: &Participant, distribution: SkillDistribution) -> HistoryEntry {
        HistoryEntry {
            timestamp: match_.timestamp,
            match_id: match_.id,
            session_id: match_.session_id,
            season: match_.season,
            map: match_.map.clone(),
            player: participant.player.clone(),
            character: participant.character.clone(),
            finish_rank: participant.finish_rank,
            mu: distribution.mu,
            sigma: distribution.sigma,
            ordinal: distribution.ordinal
        }
    }

    pub fn distribution(&self) -> SkillDistribution {
        SkillDistribution {
            mu: self.mu,
            sigma: self.sigma,
            ordinal: self.ordinal
        }
    }

    pub fn cursor(&self) -> MatchCursor {
        MatchCursor {
            timestamp: self.timestamp,
            match_id: self.match_id
        }
    }
}

/// The canonical replay position of a match: `(timestamp, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchCursor {
    pub timestamp: DateTime<FixedOffset>,
    pub match_id: i32
}

/// A player's most recently persisted distribution, used to seed append runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub player: String,
    pub distribution: SkillDistribution
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFilter {
    pub player_count: usize,
    /// Only matches strictly after this position are returned
    pub after: Option<MatchCursor>
}

impl Default for MatchFilter {
    fn default() -> Self {
        MatchFilter {
            player_count: DEFAULT_PLAYER_COUNT,
            after: None
        }
    }
}

impl MatchFilter {
    pub fn accepts(&self, match_: &Match) -> bool {
        match_.participants.len() == self.player_count && self.after.map_or(true, |after| match_.cursor() > after)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub player: Option<String>,
    pub season: Option<i32>
}

impl HistoryFilter {
    pub fn accepts(&self, entry: &HistoryEntry) -> bool {
        self.player.as_ref().map_or(true, |p| *p == entry.player) && self.season.map_or(true, |s| s == entry.season)
    }
}
