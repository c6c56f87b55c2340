use serde::Serialize;

use crate::engine::models::RunSummary;

// Each transition is pushed to the caller's channel as it happens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Probing,
    /// Stopped before harvesting; nothing was changed on disk.
    GatedStop {
        reason: String,
    },
    Harvesting {
        from: u32,
        to: u32,
    },
    Downloading {
        files: usize,
    },
    Installing,
    Done(RunSummary),
}

impl UpdateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateState::GatedStop { .. } | UpdateState::Done(_))
    }
}
