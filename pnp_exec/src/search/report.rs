//! # Search report
//!
//! Record of a search run, saved into the session directory once the run ends.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::arm::PositionKey;
use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub target_object: String,

    /// Checkpoint keys in the order they were to be visited
    pub order: Vec<PositionKey>,

    /// One entry per checkpoint visited, in visiting order
    pub attempts: Vec<CheckpointAttempt>,

    /// Number of requests made to the oracle
    pub oracle_calls: usize,

    /// Last position the arm was successfully commanded to
    pub final_position: Option<PositionKey>,

    pub outcome: SearchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointAttempt {
    pub checkpoint: PositionKey,

    /// Number of moves issued to reach the checkpoint
    pub move_attempts: u32,

    pub result: AttemptResult,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The object was picked and the arm returned to the active position
    Succeeded,

    /// Every checkpoint was visited without picking the object
    Exhausted,

    /// The operator stopped the search
    Cancelled,
}

/// What happened at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptResult {
    /// Still in progress when the report was taken
    Pending,

    /// The checkpoint could not be reached
    Unreachable { error: String },

    /// No frame could be captured
    CaptureFailed { error: String },

    /// The oracle could not be asked
    OracleFailed { error: String },

    /// The oracle said the object is not here
    NotFound { raw_text: String },

    /// The oracle said the object is here and the pick was executed
    Picked {
        raw_text: String,
        pick: PositionKey,

        /// Set if the pick move failed
        #[serde(skip_serializing_if = "Option::is_none")]
        pick_error: Option<String>,
    },

    /// The operator stopped the search at this checkpoint
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SearchReport {
    pub fn new(target_object: &str, order: Vec<PositionKey>) -> Self {
        Self {
            target_object: target_object.to_string(),
            order,
            attempts: Vec::new(),
            oracle_calls: 0,
            final_position: None,
            outcome: SearchOutcome::Exhausted,
        }
    }

    /// Checkpoint keys in the order they were visited.
    pub fn visited(&self) -> Vec<PositionKey> {
        self.attempts.iter().map(|a| a.checkpoint).collect()
    }

    /// The attempt for the given checkpoint.
    pub fn attempt_mut(&mut self, checkpoint: PositionKey) -> Option<&mut CheckpointAttempt> {
        self.attempts
            .iter_mut()
            .rev()
            .find(|a| a.checkpoint == checkpoint)
    }
}
