//! Lineage events: timestamped edges from executions to artifacts.

use serde::{Deserialize, Serialize};

/// The role an artifact played in an execution.
///
/// `Unknown` is accepted on read for forward compatibility but rejected on
/// write. The code is the stored discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Unknown,
    DeclaredOutput,
    DeclaredInput,
    Input,
    Output,
    InternalInput,
    InternalOutput,
}

impl EventType {
    /// Stored discriminator code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::DeclaredOutput => 1,
            Self::DeclaredInput => 2,
            Self::Input => 3,
            Self::Output => 4,
            Self::InternalInput => 5,
            Self::InternalOutput => 6,
        }
    }

    /// Parse a stored discriminator code. Unrecognized codes read as
    /// `Unknown` rather than failing the row.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::DeclaredOutput,
            2 => Self::DeclaredInput,
            3 => Self::Input,
            4 => Self::Output,
            5 => Self::InternalInput,
            6 => Self::InternalOutput,
            _ => Self::Unknown,
        }
    }
}

/// One step in an event path: a list index or a named key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    Index(i64),
    Key(String),
}

/// A lineage event. The `(artifact_id, execution_id, event_type)` triple is
/// written at most once; re-insertion is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub artifact_id: i64,
    pub execution_id: i64,
    pub event_type: EventType,
    /// Unset timestamps are filled with the server clock at write time.
    pub milliseconds_since_epoch: Option<i64>,
    pub path: Vec<PathStep>,
}

impl Event {
    /// A new event with no timestamp and an empty path.
    #[must_use]
    pub fn new(artifact_id: i64, execution_id: i64, event_type: EventType) -> Self {
        Self {
            artifact_id,
            execution_id,
            event_type,
            milliseconds_since_epoch: None,
            path: Vec::new(),
        }
    }

    /// Attach a path, builder style.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathStep>) -> Self {
        self.path = path;
        self
    }
}
