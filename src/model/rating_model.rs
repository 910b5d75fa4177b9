use crate::model::{
    constants::{BETA, KAPPA, MU, SIGMA, SIGMA_FLOOR},
    structures::skill_distribution::SkillDistribution
};
use openskill::{
    model::{model::Model, plackett_luce::PlackettLuce},
    rating::{default_gamma, Rating}
};

/// A rank-based skill model.
///
/// Implementations must be deterministic, must never lower a player's ordinal when only
/// that player's rank improves, and must keep `sigma` at or above a fixed floor, never
/// increasing it otherwise.
/// The replay engine and history sink depend on nothing else.
pub trait RatingModel {
    /// The distribution assigned to a player on first appearance.
    fn default_distribution(&self) -> SkillDistribution;

    /// Rates one free-for-all match. `ranks[i]` is the finish position (1 = best) of the
    /// player holding `distributions[i]`. Results are returned in input order.
    fn update(&self, distributions: &[SkillDistribution], ranks: &[usize]) -> Vec<SkillDistribution>;
}

/// Plackett-Luce model backed by openskill. Every participant is rated as a one-player team.
pub struct PlackettLuceModel {
    model: PlackettLuce,
    default_mu: f64,
    default_sigma: f64,
    sigma_floor: f64
}

impl Default for PlackettLuceModel {
    fn default() -> Self {
        PlackettLuceModel::new(MU, SIGMA, BETA, KAPPA, SIGMA_FLOOR)
    }
}

impl PlackettLuceModel {
    pub fn new(mu: f64, sigma: f64, beta: f64, kappa: f64, sigma_floor: f64) -> PlackettLuceModel {
        PlackettLuceModel {
            model: PlackettLuce::new(beta, kappa, default_gamma),
            default_mu: mu,
            default_sigma: sigma,
            sigma_floor
        }
    }
}

impl RatingModel for PlackettLuceModel {
    fn default_distribution(&self) -> SkillDistribution {
        SkillDistribution::new(self.default_mu, self.default_sigma)
    }

    fn update(&self, distributions: &[SkillDistribution], ranks: &[usize]) -> Vec<SkillDistribution> {
        let teams: Vec<Vec<Rating>> = distributions.iter().map(|d| vec![Rating::from(d)]).collect();
        let results: Vec<Rating> = self.model.rate(teams, ranks.to_vec()).into_iter().flatten().collect();

        results
            .iter()
            .zip(distributions)
            .map(|(rating, prior)| {
                // Sigma never grows from evidence; the floor wins over a prior already below it
                let sigma = rating.sigma.min(prior.sigma).max(self.sigma_floor);
                SkillDistribution::new(rating.mu, sigma)
            })
            .collect()
    }
}
