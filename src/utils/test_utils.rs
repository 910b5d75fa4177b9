use crate::{
    database::db_structs::{HistoryEntry, Match, Participant},
    model::{
        constants::{MU, SIGMA, SIGMA_FLOOR},
        rating_model::RatingModel,
        structures::skill_distribution::SkillDistribution
    },
    utils::cancellation::CancelFlag
};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng, SeedableRng
};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

const CHARACTERS: [&str; 8] = ["Mario", "Luigi", "Peach", "Yoshi", "Toad", "Bowser", "Wario", "Daisy"];
const MAPS: [&str; 6] = [
    "Mario Circuit",
    "Rainbow Road",
    "Koopa Beach",
    "Ghost Valley",
    "Choco Island",
    "Bowser Castle"
];

/// `hours` hours after 2024-01-01T00:00:00Z.
pub fn timestamp(hours: i64) -> DateTime<FixedOffset> {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().fixed_offset();
    epoch + Duration::hours(hours)
}

pub fn generate_match(id: i32, hours: i64, players: &[&str], ranks: &[i32]) -> Match {
    let participants = players
        .iter()
        .zip(ranks)
        .enumerate()
        .map(|(i, (player, rank))| Participant {
            player: player.to_string(),
            character: CHARACTERS[i % CHARACTERS.len()].to_string(),
            finish_rank: *rank
        })
        .collect();

    Match {
        id,
        timestamp: timestamp(hours),
        session_id: 1,
        season: 1,
        map: MAPS[id as usize % MAPS.len()].to_string(),
        participants
    }
}

pub fn generate_entry(match_id: i32, player: &str, hours: i64, mu: f64, sigma: f64) -> HistoryEntry {
    let distribution = SkillDistribution::new(mu, sigma);

    HistoryEntry {
        timestamp: timestamp(hours),
        match_id,
        session_id: 1,
        season: 1,
        map: MAPS[match_id as usize % MAPS.len()].to_string(),
        player: player.to_string(),
        character: CHARACTERS[0].to_string(),
        finish_rank: 1,
        mu: distribution.mu,
        sigma: distribution.sigma,
        ordinal: distribution.ordinal
    }
}

/// Generates `n_matches` valid matches drawn from a pool of `n_players`, each with
/// `player_count` participants. Seeded for reproducible results.
pub fn generate_match_log(seed: u64, n_matches: i32, n_players: usize, player_count: usize) -> Vec<Match> {
    if n_players < player_count {
        panic!("Player pool must be at least as large as the match size");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pool: Vec<String> = (0..n_players).map(|i| format!("player{}", i)).collect();
    let mut hours = 0;

    (1..=n_matches)
        .map(|id| {
            // Occasionally two matches finish at the same timestamp
            if rng.random_range(0..10) > 0 {
                hours += 1;
            }

            let players: Vec<&str> = pool
                .choose_multiple(&mut rng, player_count)
                .map(|p| p.as_str())
                .collect();
            let mut ranks: Vec<i32> = (1..=player_count as i32).collect();
            ranks.shuffle(&mut rng);

            let mut m = generate_match(id, hours, &players, &ranks);
            m.session_id = (hours / 4) as i32 + 1;
            m.season = (hours / 50) as i32 + 1;
            m
        })
        .collect()
}

/// A simple deterministic model whose step size depends on each player's current sigma,
/// so the order in which matches are applied changes the outcome.
pub struct OrderSensitiveModel;

impl RatingModel for OrderSensitiveModel {
    fn default_distribution(&self) -> SkillDistribution {
        SkillDistribution::new(MU, SIGMA)
    }

    fn update(&self, distributions: &[SkillDistribution], ranks: &[usize]) -> Vec<SkillDistribution> {
        let midpoint = (ranks.len() as f64 + 1.0) / 2.0;

        distributions
            .iter()
            .zip(ranks)
            .map(|(d, rank)| {
                let mu = d.mu + (midpoint - *rank as f64) * d.sigma / SIGMA;
                let sigma = (d.sigma * 0.9).max(SIGMA_FLOOR);
                SkillDistribution::new(mu, sigma)
            })
            .collect()
    }
}

/// A model that violates its contract by dropping the last result.
pub struct TruncatingModel;

impl RatingModel for TruncatingModel {
    fn default_distribution(&self) -> SkillDistribution {
        SkillDistribution::new(MU, SIGMA)
    }

    fn update(&self, distributions: &[SkillDistribution], _ranks: &[usize]) -> Vec<SkillDistribution> {
        distributions[..distributions.len().saturating_sub(1)].to_vec()
    }
}

/// Delegates to [`OrderSensitiveModel`] and raises `flag` once it has rated `after` matches,
/// standing in for an interrupt that arrives mid-run.
pub struct CancellingModel {
    flag: CancelFlag,
    after: usize,
    rated: AtomicUsize
}

impl CancellingModel {
    pub fn new(flag: CancelFlag, after: usize) -> CancellingModel {
        CancellingModel {
            flag,
            after,
            rated: AtomicUsize::new(0)
        }
    }
}

impl RatingModel for CancellingModel {
    fn default_distribution(&self) -> SkillDistribution {
        OrderSensitiveModel.default_distribution()
    }

    fn update(&self, distributions: &[SkillDistribution], ranks: &[usize]) -> Vec<SkillDistribution> {
        if self.rated.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.flag.cancel();
        }

        OrderSensitiveModel.update(distributions, ranks)
    }
}

pub fn never_cancelled() -> CancelFlag {
    CancelFlag::new()
}
