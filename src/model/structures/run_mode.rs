use clap::ValueEnum;
use serde_repr::{Deserialize_repr, Serialize_repr};
use strum_macros::{Display, EnumIter};

/// How a run's output is written to the history table.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, ValueEnum)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum RunMode {
    /// Discard all persisted history and write the freshly computed set
    Replace = 0,
    /// Add new rows without touching existing ones
    Append = 1
}
