use indexmap::IndexMap;

use crate::{
    database::db_structs::PlayerSnapshot,
    model::structures::skill_distribution::SkillDistribution
};

/// Run-scoped mapping from player name to current skill distribution.
///
/// Only ever touched by one in-flight match at a time, so it carries no synchronization.
/// Insertion order is preserved so iteration is deterministic.
#[derive(Debug, Default, Clone)]
pub struct RatingStore {
    ratings: IndexMap<String, SkillDistribution>
}

impl RatingStore {
    pub fn new() -> RatingStore {
        RatingStore {
            ratings: IndexMap::new()
        }
    }

    /// Builds a store pre-populated with persisted snapshots, for append runs.
    pub fn seeded(snapshots: &[PlayerSnapshot]) -> RatingStore {
        let mut store = RatingStore::new();
        store.seed(snapshots);
        store
    }

    pub fn seed(&mut self, snapshots: &[PlayerSnapshot]) {
        for snapshot in snapshots {
            self.set(&snapshot.player, snapshot.distribution);
        }
    }

    /// Returns the player's current distribution, storing `default` on first appearance.
    pub fn get_or_init(&mut self, player: &str, default: impl FnOnce() -> SkillDistribution) -> SkillDistribution {
        if let Some(distribution) = self.ratings.get(player) {
            return *distribution;
        }

        let distribution = default();
        self.ratings.insert(player.to_owned(), distribution);
        distribution
    }

    pub fn set(&mut self, player: &str, distribution: SkillDistribution) {
        match self.ratings.get_mut(player) {
            Some(current) => *current = distribution,
            None => {
                self.ratings.insert(player.to_owned(), distribution);
            }
        }
    }

    pub fn get(&self, player: &str) -> Option<&SkillDistribution> {
        self.ratings.get(player)
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}
