use crate::model::constants::ORDINAL_Z;
use openskill::rating::Rating;
use serde::{Deserialize, Serialize};

/// A player's belief state: mean skill, uncertainty, and the conservative
/// scalar used for ranking and plotting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillDistribution {
    pub mu: f64,
    pub sigma: f64,
    pub ordinal: f64
}

impl SkillDistribution {
    /// Creates a distribution with the default ordinal, `mu - 3 * sigma`.
    pub fn new(mu: f64, sigma: f64) -> SkillDistribution {
        SkillDistribution {
            mu,
            sigma,
            ordinal: mu - ORDINAL_Z * sigma
        }
    }
}

impl From<&SkillDistribution> for Rating {
    fn from(value: &SkillDistribution) -> Self {
        Rating {
            mu: value.mu,
            sigma: value.sigma
        }
    }
}
