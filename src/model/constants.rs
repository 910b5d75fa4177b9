// Model constants
pub const MU: f64 = 25.0;
pub const SIGMA: f64 = MU / 3.0;
pub const BETA: f64 = SIGMA / 2.0;
pub const KAPPA: f64 = 0.0001;
pub const SIGMA_FLOOR: f64 = SIGMA / 100.0;
pub const ORDINAL_Z: f64 = 3.0;
// Only matches with exactly this many participants are rated
pub const DEFAULT_PLAYER_COUNT: usize = 4;
pub const MIN_PLAYER_COUNT: usize = 2;
