pub mod engine_state;
pub mod run_mode;
pub mod skill_distribution;
