//! # Search state
//!
//! Run-time state of the search controller. Owned by the controller thread and never shared.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;

use comms_if::eqpt::arm::PositionKey;
use serde::Serialize;

use crate::oracle::Answer;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SearchState {
    /// Checkpoints already selected. Only ever grows during a run.
    pub visited: HashSet<PositionKey>,

    pub phase: Phase,

    pub target_object: String,

    /// Checkpoint currently being worked on
    pub active_checkpoint: Option<PositionKey>,

    pub stage: Stage,
}

/// Result of the single oracle call made at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub found: bool,
    pub raw_text: String,
    pub checkpoint: PositionKey,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Coarse activity of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Moving,
    Capturing,
    AwaitingDecision,
    Acting,
    Done,
    Failed,
}

/// State of the search state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Ready to select the next checkpoint
    Active,

    /// Moving to a checkpoint. `attempt` counts from zero.
    MovingToCheckpoint { checkpoint: PositionKey, attempt: u32 },

    /// At a checkpoint, capturing and asking the oracle
    AwaitingVisionResult { checkpoint: PositionKey },

    /// The object was found, moving to the pick position
    ExecutingPick {
        checkpoint: PositionKey,
        decision: Decision,
    },

    /// Pick finished, returning to the active position
    ReturningHome { checkpoint: PositionKey },

    /// Every checkpoint was visited without finding the object
    Exhausted,

    /// The object was picked at `checkpoint`
    Succeeded {
        checkpoint: PositionKey,
        pick: PositionKey,
    },

    /// The operator stopped the search
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SearchState {
    pub fn new(target_object: &str) -> Self {
        Self {
            visited: HashSet::new(),
            phase: Phase::Moving,
            target_object: target_object.to_string(),
            active_checkpoint: None,
            stage: Stage::Active,
        }
    }
}

impl Decision {
    pub fn new(answer: Answer, checkpoint: PositionKey) -> Self {
        Self {
            found: answer.found,
            raw_text: answer.raw_text,
            checkpoint,
        }
    }
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::Exhausted | Stage::Succeeded { .. } | Stage::Cancelled
        )
    }

    /// Whether an operator cancel may interrupt this stage. Once a pick is committed it runs to
    /// completion.
    pub fn is_interruptible(&self) -> bool {
        matches!(
            self,
            Stage::Active
                | Stage::MovingToCheckpoint { .. }
                | Stage::AwaitingVisionResult { .. }
        )
    }

    /// The phase the controller is in while in this stage.
    pub fn phase(&self) -> Phase {
        match self {
            Stage::Active | Stage::MovingToCheckpoint { .. } => Phase::Moving,
            Stage::AwaitingVisionResult { .. } => Phase::Capturing,
            Stage::ExecutingPick { .. } | Stage::ReturningHome { .. } => Phase::Acting,
            Stage::Succeeded { .. } | Stage::Exhausted => Phase::Done,
            Stage::Cancelled => Phase::Failed,
        }
    }
}
