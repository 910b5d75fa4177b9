use strum_macros::Display;

/// Lifecycle of a [`crate::model::replay::ReplayEngine`].
///
/// `Idle -> Running -> {Completed, Failed}`. Terminal states are never left; a new run
/// needs a new engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed
}
